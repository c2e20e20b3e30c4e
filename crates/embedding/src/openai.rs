use std::time::Duration;

use async_trait::async_trait;
use docsmith_core::config::EmbeddingConfig;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::provider::{EmbeddingError, EmbeddingMode, EmbeddingProvider, Embeddings, check_count};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// OpenAI-compatible `/embeddings` endpoint (OpenAI, OpenRouter, Azure gateways, vLLM)
#[derive(Debug, Clone)]
pub struct OpenAiProvider {
  client: reqwest::Client,
  base_url: String,
  model: String,
  dimensions: usize,
}

impl OpenAiProvider {
  pub fn new(config: &EmbeddingConfig) -> Result<Self, EmbeddingError> {
    let client = reqwest::Client::builder()
      .timeout(Duration::from_secs(config.request_timeout_secs))
      .build()?;
    let base_url = config
      .base_url
      .clone()
      .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
      .trim_end_matches('/')
      .to_string();

    info!(model = %config.model, dimensions = config.dimensions, base_url, "OpenAI embedding provider initialized");

    Ok(Self {
      client,
      base_url,
      model: config.model.clone(),
      dimensions: config.dimensions,
    })
  }

  fn embeddings_url(&self) -> String {
    format!("{}/embeddings", self.base_url)
  }
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
  model: &'a str,
  input: &'a [&'a str],
  #[serde(skip_serializing_if = "Option::is_none")]
  dimensions: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
  data: Vec<EmbeddingData>,
  #[serde(default)]
  usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Usage {
  total_tokens: u64,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
  #[serde(default)]
  index: usize,
  embedding: Vec<f32>,
}

/// Vectors in input order; the API may return them out of order
fn into_embeddings(response: EmbeddingResponse) -> Embeddings {
  let mut data = response.data;
  data.sort_by_key(|d| d.index);
  Embeddings {
    vectors: data.into_iter().map(|d| d.embedding).collect(),
    tokens: response.usage.map(|u| u.total_tokens),
  }
}

#[async_trait]
impl EmbeddingProvider for OpenAiProvider {
  fn name(&self) -> &str {
    "openai"
  }

  fn model_id(&self) -> &str {
    &self.model
  }

  fn dimensions(&self) -> usize {
    self.dimensions
  }

  async fn embed(
    &self,
    texts: &[&str],
    _mode: EmbeddingMode,
    credential: &str,
  ) -> Result<Embeddings, EmbeddingError> {
    if texts.is_empty() {
      return Ok(Embeddings::default());
    }

    // Only the text-embedding-3 family accepts a dimensions override
    let dimensions = self.model.contains("text-embedding-3").then_some(self.dimensions);
    let request = EmbeddingRequest {
      model: &self.model,
      input: texts,
      dimensions,
    };

    debug!(batch_size = texts.len(), model = %self.model, "Embedding batch with OpenAI");

    let response = self
      .client
      .post(self.embeddings_url())
      .bearer_auth(credential)
      .json(&request)
      .send()
      .await?;

    let status = response.status();
    if !status.is_success() {
      let body = response.text().await.unwrap_or_default();
      warn!(status = status.as_u16(), body, "OpenAI embedding request failed");
      return Err(EmbeddingError::Http {
        provider: "openai",
        status: status.as_u16(),
        message: body,
      });
    }

    let embeddings = into_embeddings(response.json().await?);
    check_count("openai", embeddings.vectors.len(), texts.len())?;
    Ok(embeddings)
  }
}

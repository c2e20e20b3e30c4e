use std::time::Duration;

use async_trait::async_trait;
use docsmith_core::config::EmbeddingConfig;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::provider::{EmbeddingError, EmbeddingMode, EmbeddingProvider, Embeddings, check_count};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Google Gemini `batchEmbedContents`
#[derive(Debug, Clone)]
pub struct GeminiProvider {
  client: reqwest::Client,
  base_url: String,
  model: String,
  dimensions: usize,
}

impl GeminiProvider {
  pub fn new(config: &EmbeddingConfig) -> Result<Self, EmbeddingError> {
    let client = reqwest::Client::builder()
      .timeout(Duration::from_secs(config.request_timeout_secs))
      .build()?;
    let base_url = config
      .base_url
      .as_deref()
      .unwrap_or(DEFAULT_BASE_URL)
      .trim_end_matches('/')
      .to_string();
    let model = config.model.trim_start_matches("models/").to_string();

    info!(model, dimensions = config.dimensions, "Gemini embedding provider initialized");

    Ok(Self {
      client,
      base_url,
      model,
      dimensions: config.dimensions,
    })
  }

  fn batch_url(&self) -> String {
    format!("{}/models/{}:batchEmbedContents", self.base_url, self.model)
  }

  fn build_request<'a>(&'a self, texts: &[&'a str], mode: EmbeddingMode) -> BatchRequest<'a> {
    let task_type = match mode {
      EmbeddingMode::Document => "RETRIEVAL_DOCUMENT",
      EmbeddingMode::Query => "RETRIEVAL_QUERY",
    };
    let model = format!("models/{}", self.model);
    BatchRequest {
      requests: texts
        .iter()
        .map(|&text| EmbedRequest {
          model: model.clone(),
          content: Content {
            parts: vec![Part { text }],
          },
          task_type,
          output_dimensionality: self.dimensions,
        })
        .collect(),
    }
  }
}

#[derive(Debug, Serialize)]
struct BatchRequest<'a> {
  requests: Vec<EmbedRequest<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EmbedRequest<'a> {
  model: String,
  content: Content<'a>,
  task_type: &'static str,
  output_dimensionality: usize,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
  parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
struct Part<'a> {
  text: &'a str,
}

#[derive(Debug, Deserialize)]
struct BatchResponse {
  #[serde(default)]
  embeddings: Vec<ContentEmbedding>,
}

#[derive(Debug, Deserialize)]
struct ContentEmbedding {
  values: Vec<f32>,
}

#[async_trait]
impl EmbeddingProvider for GeminiProvider {
  fn name(&self) -> &str {
    "gemini"
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
    mode: EmbeddingMode,
    credential: &str,
  ) -> Result<Embeddings, EmbeddingError> {
    if texts.is_empty() {
      return Ok(Embeddings::default());
    }

    debug!(batch_size = texts.len(), model = %self.model, ?mode, "Embedding batch with Gemini");

    let response = self
      .client
      .post(self.batch_url())
      .header("x-goog-api-key", credential)
      .json(&self.build_request(texts, mode))
      .send()
      .await?;

    let status = response.status();
    if !status.is_success() {
      let body = response.text().await.unwrap_or_default();
      warn!(status = status.as_u16(), body, "Gemini embedding request failed");
      return Err(EmbeddingError::Http {
        provider: "gemini",
        status: status.as_u16(),
        message: body,
      });
    }

    let result: BatchResponse = response.json().await?;
    check_count("gemini", result.embeddings.len(), texts.len())?;
    // batchEmbedContents reports no usage
    Ok(Embeddings::new(result.embeddings.into_iter().map(|e| e.values).collect()))
  }
}

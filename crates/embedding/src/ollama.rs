use std::time::Duration;

use async_trait::async_trait;
use docsmith_core::config::EmbeddingConfig;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::provider::{EmbeddingError, EmbeddingMode, EmbeddingProvider, Embeddings, check_count};

const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

#[derive(Debug, Clone)]
pub struct OllamaProvider {
  client: reqwest::Client,
  base_url: String,
  model: String,
  dimensions: usize,
}

impl OllamaProvider {
  pub fn new(config: &EmbeddingConfig) -> Result<Self, EmbeddingError> {
    let client = reqwest::Client::builder()
      .timeout(Duration::from_secs(config.request_timeout_secs))
      .build()?;
    let base_url = config
      .base_url
      .as_deref()
      .unwrap_or(DEFAULT_OLLAMA_URL)
      .trim_end_matches('/')
      .to_string();

    info!(model = %config.model, base_url, "Ollama embedding provider initialized");

    Ok(Self {
      client,
      base_url,
      model: config.model.clone(),
      dimensions: config.dimensions,
    })
  }

  /// Batch embedding endpoint
  fn embed_url(&self) -> String {
    format!("{}/api/embed", self.base_url)
  }

  /// Check if Ollama is reachable
  pub async fn is_available(&self) -> bool {
    match self
      .client
      .get(&self.base_url)
      .timeout(Duration::from_secs(5))
      .send()
      .await
    {
      Ok(response) => response.status().is_success(),
      Err(_) => false,
    }
  }
}

/// Request for batch embedding (/api/embed endpoint)
#[derive(Debug, Serialize)]
struct BatchEmbeddingRequest<'a> {
  model: &'a str,
  input: &'a [&'a str],
}

/// Response from batch embedding (/api/embed endpoint)
#[derive(Debug, Deserialize)]
struct BatchEmbeddingResponse {
  embeddings: Vec<Vec<f32>>,
  /// Tokens evaluated for the whole batch
  #[serde(default)]
  prompt_eval_count: Option<u64>,
}

#[async_trait]
impl EmbeddingProvider for OllamaProvider {
  fn name(&self) -> &str {
    "ollama"
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

    let request = BatchEmbeddingRequest {
      model: &self.model,
      input: texts,
    };

    debug!(batch_size = texts.len(), "Embedding batch with Ollama");

    let mut builder = self.client.post(self.embed_url()).json(&request);
    // Local instances take no key; proxied ones may
    if !credential.is_empty() {
      builder = builder.bearer_auth(credential);
    }
    let response = builder.send().await?;

    let status = response.status();
    if !status.is_success() {
      let body = response.text().await.unwrap_or_default();
      warn!(status = status.as_u16(), body, "Ollama batch embedding failed");
      return Err(EmbeddingError::Http {
        provider: "ollama",
        status: status.as_u16(),
        message: body,
      });
    }

    let result: BatchEmbeddingResponse = response.json().await?;
    check_count("ollama", result.embeddings.len(), texts.len())?;

    if let Some(first) = result.embeddings.first()
      && first.len() != self.dimensions
    {
      warn!(
        got = first.len(),
        expected = self.dimensions,
        "Unexpected embedding dimensions"
      );
    }

    Ok(Embeddings {
      vectors: result.embeddings,
      tokens: result.prompt_eval_count,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn config() -> EmbeddingConfig {
    EmbeddingConfig {
      provider: docsmith_core::EmbeddingProviderKind::Ollama,
      model: "nomic-embed-text".to_string(),
      dimensions: 768,
      ..Default::default()
    }
  }

  #[test]
  fn test_provider_defaults() {
    let provider = OllamaProvider::new(&config()).unwrap();
    assert_eq!(provider.name(), "ollama");
    assert_eq!(provider.model_id(), "nomic-embed-text");
    assert_eq!(provider.embed_url(), "http://localhost:11434/api/embed");
  }

  #[test]
  fn test_custom_url() {
    let provider = OllamaProvider::new(&EmbeddingConfig {
      base_url: Some("http://gpu-box:8080/".to_string()),
      ..config()
    })
    .unwrap();
    assert_eq!(provider.embed_url(), "http://gpu-box:8080/api/embed");
  }

  #[tokio::test]
  async fn test_unreachable_server_is_transient() {
    let provider = OllamaProvider::new(&EmbeddingConfig {
      base_url: Some("http://127.0.0.1:9".to_string()),
      ..config()
    })
    .unwrap();

    let err = provider.embed(&["test"], EmbeddingMode::Document, "").await.unwrap_err();
    assert!(err.failure_kind().is_retryable());
  }
}

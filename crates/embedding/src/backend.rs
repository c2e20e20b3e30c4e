use async_trait::async_trait;
use docsmith_core::{EmbeddingProviderKind, config::EmbeddingConfig};

use crate::{
  GeminiProvider, OllamaProvider, OpenAiProvider,
  provider::{EmbeddingError, EmbeddingMode, EmbeddingProvider, Embeddings},
};

/// Closed set of embedding providers, selected from config.
///
/// Adding a provider means adding a variant here and nowhere else.
#[derive(Debug, Clone)]
pub enum EmbeddingBackend {
  OpenAi(OpenAiProvider),
  Gemini(GeminiProvider),
  Ollama(OllamaProvider),
}

impl EmbeddingBackend {
  pub fn from_config(config: &EmbeddingConfig) -> Result<Self, EmbeddingError> {
    Ok(match config.provider {
      EmbeddingProviderKind::OpenAi => Self::OpenAi(OpenAiProvider::new(config)?),
      EmbeddingProviderKind::Gemini => Self::Gemini(GeminiProvider::new(config)?),
      EmbeddingProviderKind::Ollama => Self::Ollama(OllamaProvider::new(config)?),
    })
  }

  fn inner(&self) -> &dyn EmbeddingProvider {
    match self {
      Self::OpenAi(p) => p,
      Self::Gemini(p) => p,
      Self::Ollama(p) => p,
    }
  }
}

#[async_trait]
impl EmbeddingProvider for EmbeddingBackend {
  fn name(&self) -> &str {
    self.inner().name()
  }

  fn model_id(&self) -> &str {
    self.inner().model_id()
  }

  fn dimensions(&self) -> usize {
    self.inner().dimensions()
  }

  async fn embed(
    &self,
    texts: &[&str],
    mode: EmbeddingMode,
    credential: &str,
  ) -> Result<Embeddings, EmbeddingError> {
    self.inner().embed(texts, mode, credential).await
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_from_config_selects_variant() {
    for (kind, name) in [
      (EmbeddingProviderKind::OpenAi, "openai"),
      (EmbeddingProviderKind::Gemini, "gemini"),
      (EmbeddingProviderKind::Ollama, "ollama"),
    ] {
      let config = EmbeddingConfig {
        provider: kind,
        ..Default::default()
      };
      let backend = EmbeddingBackend::from_config(&config).unwrap();
      assert_eq!(backend.name(), name);
      assert_eq!(backend.model_id(), config.model);
    }
  }
}

use async_trait::async_trait;
use docsmith_core::{ChatProviderKind, config::GenerationConfig};

use crate::{
  AnthropicProvider, ChatRequest, OpenAiChatProvider,
  provider::{ChatProvider, ChatStream, Result},
};

/// Closed set of chat providers, selected from config
#[derive(Debug, Clone)]
pub enum ChatBackend {
  OpenAi(OpenAiChatProvider),
  Anthropic(AnthropicProvider),
}

impl ChatBackend {
  pub fn from_config(config: &GenerationConfig) -> Result<Self> {
    Ok(match config.provider {
      ChatProviderKind::OpenAi => Self::OpenAi(OpenAiChatProvider::new(config)?),
      ChatProviderKind::Anthropic => Self::Anthropic(AnthropicProvider::new(config)?),
    })
  }

  fn inner(&self) -> &dyn ChatProvider {
    match self {
      Self::OpenAi(p) => p,
      Self::Anthropic(p) => p,
    }
  }
}

#[async_trait]
impl ChatProvider for ChatBackend {
  fn name(&self) -> &str {
    self.inner().name()
  }

  fn model_id(&self) -> &str {
    self.inner().model_id()
  }

  async fn stream_chat(&self, request: &ChatRequest, credential: &str) -> Result<ChatStream> {
    self.inner().stream_chat(request, credential).await
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_from_config_selects_variant() {
    let anthropic = GenerationConfig {
      provider: ChatProviderKind::Anthropic,
      model: "claude-3-5-haiku-latest".to_string(),
      ..Default::default()
    };
    let backend = ChatBackend::from_config(&anthropic).unwrap();
    assert_eq!(backend.name(), "anthropic");
    assert_eq!(backend.model_id(), "claude-3-5-haiku-latest");

    let openai = ChatBackend::from_config(&GenerationConfig::default()).unwrap();
    assert!(matches!(openai, ChatBackend::OpenAi(_)));
  }
}

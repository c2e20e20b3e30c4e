use docsmith_core::{FailureKind, PoolError, classify};
use serde::{Deserialize, Serialize};

mod anthropic;
mod backend;
mod openai;
pub mod outline;
mod pooled;
pub mod prompts;
mod provider;
mod sse;

pub use anthropic::AnthropicProvider;
pub use backend::ChatBackend;
pub use openai::OpenAiChatProvider;
pub use outline::{Outline, OutlineSection, plan_outline};
pub use pooled::{GenerationRetry, PooledGenerator};
pub use provider::{ChatProvider, ChatStream, Result};

/// Who authored a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
  User,
  Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
  pub role: Role,
  pub content: String,
}

impl ChatMessage {
  pub fn user(content: impl Into<String>) -> Self {
    Self {
      role: Role::User,
      content: content.into(),
    }
  }

  pub fn assistant(content: impl Into<String>) -> Self {
    Self {
      role: Role::Assistant,
      content: content.into(),
    }
  }
}

/// Request for a streamed completion
#[derive(Debug, Clone)]
pub struct ChatRequest {
  /// System prompt
  pub system: String,
  pub messages: Vec<ChatMessage>,
  pub max_tokens: u32,
  pub temperature: f32,
}

impl ChatRequest {
  /// Estimated prompt tokens plus the output allowance
  pub fn estimated_tokens(&self) -> u64 {
    let prompt: u64 = docsmith_core::estimate_tokens(&self.system)
      + self
        .messages
        .iter()
        .map(|m| docsmith_core::estimate_tokens(&m.content))
        .sum::<u64>();
    prompt + u64::from(self.max_tokens)
  }
}

/// One item of a completion stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatChunk {
  /// A text fragment
  Text(String),
  /// Token accounting reported by the provider
  Usage { input_tokens: u64, output_tokens: u64 },
}

/// Token usage for a completed request
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenUsage {
  pub input_tokens: u64,
  pub output_tokens: u64,
}

impl TokenUsage {
  pub fn total(&self) -> u64 {
    self.input_tokens + self.output_tokens
  }
}

/// Errors that can occur during generation
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
  #[error("{provider} returned {status}: {message}")]
  Http {
    provider: &'static str,
    status: u16,
    message: String,
  },
  #[error("Request failed: {0}")]
  Request(#[from] reqwest::Error),
  #[error("Malformed stream event: {0}")]
  StreamParse(String),
  #[error("Provider reported an error: {0}")]
  Provider(String),
  #[error("Stream ended without any content")]
  EmptyResponse,
  #[error("Model output did not match the expected structure: {0}")]
  MalformedStructure(String),
  #[error("Output receiver closed")]
  SinkClosed,
  #[error(transparent)]
  Pool(#[from] PoolError),
}

impl LlmError {
  /// How the pooled layer should react to this error
  pub fn failure_kind(&self) -> FailureKind {
    match self {
      Self::Http { status, message, .. } => classify(Some(*status), message),
      Self::Request(e) if e.is_timeout() || e.is_connect() => FailureKind::TransientNetwork,
      Self::Request(e) => match classify(e.status().map(|s| s.as_u16()), &e.to_string()) {
        // A body that stops decoding mid-stream is a stream glitch
        FailureKind::Fatal if e.is_body() || e.is_decode() => FailureKind::StreamParseGlitch,
        kind => kind,
      },
      Self::StreamParse(_) | Self::EmptyResponse => FailureKind::StreamParseGlitch,
      Self::Provider(message) => classify(None, message),
      Self::MalformedStructure(_) | Self::SinkClosed | Self::Pool(_) => FailureKind::Fatal,
    }
  }
}

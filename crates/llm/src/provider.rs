//! Streaming chat provider trait
//!
//! A provider turns one [`ChatRequest`] plus one credential into a stream of
//! [`ChatChunk`]s. It performs a single HTTP request and never retries;
//! credential rotation and retry live in [`crate::PooledGenerator`].

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::{ChatChunk, ChatRequest, LlmError};

/// Result type for LLM operations
pub type Result<T> = std::result::Result<T, LlmError>;

/// Stream of completion chunks. Errors inside the stream end it.
pub type ChatStream = BoxStream<'static, Result<ChatChunk>>;

#[async_trait]
pub trait ChatProvider: Send + Sync {
  /// The name of this provider (for logging/identification)
  fn name(&self) -> &str;

  fn model_id(&self) -> &str;

  /// Send the request and return the response body as a chunk stream.
  ///
  /// Errors that happen before any byte of the body arrives (status codes,
  /// connection failures) are returned here; later ones arrive in the stream.
  async fn stream_chat(&self, request: &ChatRequest, credential: &str) -> Result<ChatStream>;
}

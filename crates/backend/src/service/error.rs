//! Error type for service operations.

use docsmith_core::PoolError;
use embedding::EmbeddingError;
use index::{IndexError, StoreError};
use llm::LlmError;

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
  /// Generation was requested for a repository that has not been indexed
  #[error("Repository {0} is not indexed")]
  NotIndexed(String),
  #[error("Invalid repository source: {0}")]
  InvalidSource(String),
  #[error("Job not found: {0}")]
  JobNotFound(String),
  #[error("Cancelled")]
  Cancelled,
  #[error("Credential error: {0}")]
  Pool(#[from] PoolError),
  #[error("Indexing error: {0}")]
  Index(#[from] IndexError),
  #[error("Store error: {0}")]
  Store(#[from] StoreError),
  #[error("Embedding error: {0}")]
  Embedding(#[from] EmbeddingError),
  #[error("Error using the LLM service: {0}")]
  Llm(#[from] LlmError),
}

impl ServiceError {
  pub fn is_cancelled(&self) -> bool {
    matches!(self, Self::Cancelled | Self::Index(IndexError::Cancelled))
  }
}

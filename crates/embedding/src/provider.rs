use async_trait::async_trait;
use docsmith_core::{FailureKind, PoolError, classify};

/// Embedding mode determines how text is presented to the model.
///
/// Some providers embed retrieval queries differently from stored documents
/// (Gemini task types). Providers without that distinction ignore the mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EmbeddingMode {
  /// Embedding a chunk for storage/indexing
  #[default]
  Document,
  /// Embedding a query for retrieval/search
  Query,
}

/// Vectors for one request, with the token count the provider billed
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Embeddings {
  /// One vector per input, in input order
  pub vectors: Vec<Vec<f32>>,
  /// `None` when the provider does not report usage
  pub tokens: Option<u64>,
}

impl Embeddings {
  pub fn new(vectors: Vec<Vec<f32>>) -> Self {
    Self { vectors, tokens: None }
  }

  pub fn with_tokens(mut self, tokens: u64) -> Self {
    self.tokens = Some(tokens);
    self
  }
}

/// A remote (or local) embedding endpoint.
///
/// Implementations perform exactly one request per call and never retry:
/// retry and credential rotation belong to [`crate::PooledEmbedder`].
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
  fn name(&self) -> &str;
  fn model_id(&self) -> &str;
  fn dimensions(&self) -> usize;

  /// Embed `texts` with the given credential, returning one vector per text
  async fn embed(&self, texts: &[&str], mode: EmbeddingMode, credential: &str) -> Result<Embeddings, EmbeddingError>;
}

#[derive(Debug, thiserror::Error)]
pub enum EmbeddingError {
  #[error("{provider} returned {status}: {message}")]
  Http {
    provider: &'static str,
    status: u16,
    message: String,
  },
  #[error("Request failed: {0}")]
  Request(#[from] reqwest::Error),
  #[error("Network error: {0}")]
  Network(String),
  #[error("Invalid response: {0}")]
  InvalidResponse(String),
  #[error("No api key configured for {0}")]
  NoApiKey(&'static str),
  #[error(transparent)]
  Pool(#[from] PoolError),
}

impl EmbeddingError {
  /// How the pooled layer should react to this error
  pub fn failure_kind(&self) -> FailureKind {
    match self {
      Self::Http { status, message, .. } => classify(Some(*status), message),
      Self::Request(e) if e.is_timeout() || e.is_connect() => FailureKind::TransientNetwork,
      Self::Request(e) => classify(e.status().map(|s| s.as_u16()), &e.to_string()),
      Self::Network(_) => FailureKind::TransientNetwork,
      Self::InvalidResponse(_) | Self::NoApiKey(_) | Self::Pool(_) => FailureKind::Fatal,
    }
  }
}

/// Check the provider returned exactly one vector per input
pub(crate) fn check_count(provider: &str, got: usize, expected: usize) -> Result<(), EmbeddingError> {
  if got != expected {
    return Err(EmbeddingError::InvalidResponse(format!(
      "{} returned {} embeddings for {} inputs",
      provider, got, expected
    )));
  }
  Ok(())
}

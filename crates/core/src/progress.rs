//! Progress events emitted by the indexing state machine.
//!
//! The indexer is the only producer. Job registries and stream consumers
//! only observe these values.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Final metadata of a successful indexing run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexMetadata {
  pub owner: String,
  pub repo: String,
  pub branch: String,
  pub file_count: usize,
  pub chunk_count: usize,
  /// Embedding provider name (e.g. "openai", "gemini")
  pub provider: String,
  pub model: String,
  pub indexed_at: DateTime<Utc>,
}

/// A progress update, tagged by phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum IndexProgress {
  /// Fetching the repository
  Clone { source: String },
  /// Files selected for indexing
  Extract { files: usize },
  /// Files split into chunks
  Chunk { files: usize, chunks: usize },
  /// Embedded chunks so far (one event per completed batch)
  Embed { current: usize, total: usize },
  /// Persisting chunks to the vector store
  Store { chunks: usize },
  Complete { metadata: IndexMetadata },
  Cancelled,
  Error { message: String },
}

impl IndexProgress {
  /// Name of the phase, matching the serialized `phase` tag
  pub fn phase(&self) -> &'static str {
    match self {
      Self::Clone { .. } => "clone",
      Self::Extract { .. } => "extract",
      Self::Chunk { .. } => "chunk",
      Self::Embed { .. } => "embed",
      Self::Store { .. } => "store",
      Self::Complete { .. } => "complete",
      Self::Cancelled => "cancelled",
      Self::Error { .. } => "error",
    }
  }

  /// Returns true for `complete`, `cancelled` and `error`
  pub fn is_terminal(&self) -> bool {
    matches!(self, Self::Complete { .. } | Self::Cancelled | Self::Error { .. })
  }

  /// Completion percentage, where it can be derived
  pub fn percent(&self) -> Option<u8> {
    match self {
      Self::Embed { current, total } if *total > 0 => {
        Some(((*current as f64 / *total as f64) * 100.0).min(100.0) as u8)
      }
      Self::Embed { .. } | Self::Store { .. } | Self::Complete { .. } => Some(100),
      _ => None,
    }
  }
}

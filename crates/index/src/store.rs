//! Vector storage for embedded chunks.
//!
//! Chunks are stored per repository. Storing a repository again replaces
//! its previous chunks as a whole.

use async_trait::async_trait;
use dashmap::DashMap;
use docsmith_core::{Chunk, IndexMetadata, RepoRef};
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum StoreError {
  #[error("chunk {0} has no embedding")]
  MissingVector(String),

  #[error("dimension mismatch: store holds {expected}, got {actual}")]
  DimensionMismatch { expected: usize, actual: usize },

  #[error("repository {0} is not indexed")]
  NotIndexed(String),
}

/// A search hit with its cosine similarity to the query
#[derive(Debug, Clone, Serialize)]
pub struct ScoredChunk {
  pub chunk: Chunk,
  pub score: f32,
}

#[async_trait]
pub trait VectorStore: Send + Sync {
  /// Replace every chunk stored for the repository
  async fn store(&self, metadata: &IndexMetadata, chunks: Vec<Chunk>) -> Result<(), StoreError>;

  /// Most similar chunks first, at most `limit`
  async fn search(&self, repo: &RepoRef, query: &[f32], limit: usize) -> Result<Vec<ScoredChunk>, StoreError>;

  async fn is_indexed(&self, repo: &RepoRef) -> Result<bool, StoreError>;

  async fn chunk_count(&self, repo: &RepoRef) -> Result<usize, StoreError>;

  /// Metadata recorded by the last successful store
  async fn metadata(&self, repo: &RepoRef) -> Result<Option<IndexMetadata>, StoreError>;
}

struct StoredRepository {
  metadata: IndexMetadata,
  chunks: Vec<Chunk>,
}

/// In-process store with brute-force cosine search
#[derive(Default)]
pub struct MemoryVectorStore {
  repos: DashMap<RepoRef, StoredRepository>,
}

impl MemoryVectorStore {
  pub fn new() -> Self {
    Self::default()
  }
}

#[async_trait]
impl VectorStore for MemoryVectorStore {
  async fn store(&self, metadata: &IndexMetadata, chunks: Vec<Chunk>) -> Result<(), StoreError> {
    let mut dimensions = None;
    for chunk in &chunks {
      let Some(vector) = &chunk.vector else {
        return Err(StoreError::MissingVector(chunk.id.clone()));
      };
      match dimensions {
        None => dimensions = Some(vector.len()),
        Some(expected) if expected != vector.len() => {
          return Err(StoreError::DimensionMismatch {
            expected,
            actual: vector.len(),
          });
        }
        _ => {}
      }
    }

    let repo = RepoRef::new(&metadata.owner, &metadata.repo);
    debug!(repo = %repo, chunks = chunks.len(), ?dimensions, "Storing chunks");
    self.repos.insert(
      repo,
      StoredRepository {
        metadata: metadata.clone(),
        chunks,
      },
    );
    Ok(())
  }

  async fn search(&self, repo: &RepoRef, query: &[f32], limit: usize) -> Result<Vec<ScoredChunk>, StoreError> {
    let stored = self
      .repos
      .get(repo)
      .ok_or_else(|| StoreError::NotIndexed(repo.to_string()))?;

    let mut hits = Vec::with_capacity(stored.chunks.len());
    for chunk in &stored.chunks {
      let Some(vector) = &chunk.vector else { continue };
      if vector.len() != query.len() {
        return Err(StoreError::DimensionMismatch {
          expected: vector.len(),
          actual: query.len(),
        });
      }
      hits.push(ScoredChunk {
        chunk: chunk.clone(),
        score: cosine_similarity(query, vector),
      });
    }

    hits.sort_by(|a, b| b.score.total_cmp(&a.score));
    hits.truncate(limit);
    Ok(hits)
  }

  async fn is_indexed(&self, repo: &RepoRef) -> Result<bool, StoreError> {
    Ok(self.repos.contains_key(repo))
  }

  async fn chunk_count(&self, repo: &RepoRef) -> Result<usize, StoreError> {
    Ok(self.repos.get(repo).map(|r| r.chunks.len()).unwrap_or(0))
  }

  async fn metadata(&self, repo: &RepoRef) -> Result<Option<IndexMetadata>, StoreError> {
    Ok(self.repos.get(repo).map(|r| r.metadata.clone()))
  }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
  let mut dot = 0.0f32;
  let mut norm_a = 0.0f32;
  let mut norm_b = 0.0f32;
  for (x, y) in a.iter().zip(b) {
    dot += x * y;
    norm_a += x * x;
    norm_b += y * y;
  }
  if norm_a == 0.0 || norm_b == 0.0 {
    return 0.0;
  }
  dot / (norm_a.sqrt() * norm_b.sqrt())
}

#[cfg(test)]
mod tests {
  use chrono::Utc;
  use docsmith_core::SourceFile;

  use super::*;

  fn metadata(chunk_count: usize) -> IndexMetadata {
    IndexMetadata {
      owner: "acme".into(),
      repo: "widgets".into(),
      branch: "main".into(),
      file_count: 1,
      chunk_count,
      provider: "test".into(),
      model: "test".into(),
      indexed_at: Utc::now(),
    }
  }

  fn chunk(index: usize, vector: Vec<f32>) -> Chunk {
    let mut chunk = Chunk::new(&SourceFile::new("src/lib.rs", ""), index, format!("chunk {}", index));
    chunk.vector = Some(vector);
    chunk
  }

  #[tokio::test]
  async fn test_search_orders_by_similarity() {
    let store = MemoryVectorStore::new();
    let chunks = vec![
      chunk(0, vec![0.0, 1.0]),
      chunk(1, vec![1.0, 0.0]),
      chunk(2, vec![0.7, 0.7]),
    ];
    store.store(&metadata(3), chunks).await.unwrap();

    let repo = RepoRef::new("acme", "widgets");
    let hits = store.search(&repo, &[1.0, 0.1], 2).await.unwrap();
    let order: Vec<_> = hits.iter().map(|h| h.chunk.chunk_index).collect();
    assert_eq!(order, vec![1, 2]);
    assert!(hits[0].score > hits[1].score);
  }

  #[tokio::test]
  async fn test_store_replaces_previous_chunks() {
    let store = MemoryVectorStore::new();
    let repo = RepoRef::new("acme", "widgets");
    assert!(!store.is_indexed(&repo).await.unwrap());

    store
      .store(&metadata(2), vec![chunk(0, vec![1.0]), chunk(1, vec![1.0])])
      .await
      .unwrap();
    store.store(&metadata(1), vec![chunk(0, vec![1.0])]).await.unwrap();

    assert!(store.is_indexed(&repo).await.unwrap());
    assert_eq!(store.chunk_count(&repo).await.unwrap(), 1);
    assert_eq!(store.metadata(&repo).await.unwrap().map(|m| m.chunk_count), Some(1));
  }

  #[tokio::test]
  async fn test_rejects_unembedded_and_mixed_dimensions() {
    let store = MemoryVectorStore::new();

    let mut bare = chunk(0, vec![]);
    bare.vector = None;
    assert!(matches!(
      store.store(&metadata(1), vec![bare]).await,
      Err(StoreError::MissingVector(id)) if id == "src/lib.rs#0"
    ));

    let mixed = vec![chunk(0, vec![1.0, 0.0]), chunk(1, vec![1.0])];
    assert!(matches!(
      store.store(&metadata(2), mixed).await,
      Err(StoreError::DimensionMismatch { expected: 2, actual: 1 })
    ));
  }

  #[tokio::test]
  async fn test_search_unknown_repo() {
    let store = MemoryVectorStore::new();
    let err = store.search(&RepoRef::new("a", "b"), &[1.0], 5).await.unwrap_err();
    assert!(matches!(err, StoreError::NotIndexed(_)));
  }

  #[test]
  fn test_cosine_zero_vector() {
    assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    assert!((cosine_similarity(&[2.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
  }
}

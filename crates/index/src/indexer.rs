//! Indexing state machine.
//!
//! A run moves through `clone → extract → chunk → embed → store → complete`
//! and reports each step as an [`IndexProgress`] on one channel, so events
//! are strictly ordered. Cancellation is polled on entry to every phase and
//! between embedding batches; a request already in flight is never
//! interrupted.

use std::sync::Arc;

use chrono::Utc;
use docsmith_core::{Chunk, IndexMetadata, IndexProgress, RepoRef, SourceFile, config::IndexConfig};
use embedding::{EmbeddingError, PooledEmbedder};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::{Chunker, ChunkerConfig, RepositorySource, SourceError, StoreError, VectorStore};

#[derive(Error, Debug)]
pub enum IndexError {
  #[error("indexing cancelled")]
  Cancelled,

  #[error("cannot parse repository reference: {0}")]
  InvalidSource(String),

  #[error("no indexable files in {0}")]
  NoFiles(String),

  #[error("source error: {0}")]
  Source(#[from] SourceError),

  #[error("embedding error: {0}")]
  Embedding(#[from] EmbeddingError),

  #[error("store error: {0}")]
  Store(#[from] StoreError),
}

#[derive(Debug, Clone)]
pub struct IndexRequest {
  /// Repository reference understood by the configured source
  pub source: String,
  /// Re-index even when the store already holds the repository
  pub force: bool,
}

impl IndexRequest {
  pub fn new(source: impl Into<String>) -> Self {
    Self {
      source: source.into(),
      force: false,
    }
  }

  pub fn force(mut self, force: bool) -> Self {
    self.force = force;
    self
  }
}

pub struct Indexer {
  source: Arc<dyn RepositorySource>,
  store: Arc<dyn VectorStore>,
  embedder: Arc<PooledEmbedder>,
  chunker: Chunker,
  config: IndexConfig,
}

impl Indexer {
  pub fn new(
    source: Arc<dyn RepositorySource>,
    store: Arc<dyn VectorStore>,
    embedder: Arc<PooledEmbedder>,
    config: IndexConfig,
  ) -> Self {
    Self {
      source,
      store,
      embedder,
      chunker: Chunker::new(ChunkerConfig::from(&config)),
      config,
    }
  }

  /// Run the state machine to a terminal state.
  ///
  /// Exactly one terminal event (`Complete`, `Cancelled` or `Error`) is sent
  /// before returning.
  pub async fn run(
    &self,
    request: &IndexRequest,
    progress: mpsc::Sender<IndexProgress>,
    cancel: CancellationToken,
  ) -> Result<IndexMetadata, IndexError> {
    let run = Run {
      progress,
      cancel,
      source: request.source.clone(),
    };

    match self.run_phases(request, &run).await {
      Ok(metadata) => {
        run
          .emit(IndexProgress::Complete {
            metadata: metadata.clone(),
          })
          .await;
        Ok(metadata)
      }
      Err(IndexError::Cancelled) => {
        info!(source = %request.source, "Indexing cancelled");
        run.emit(IndexProgress::Cancelled).await;
        Err(IndexError::Cancelled)
      }
      Err(e) => {
        warn!(source = %request.source, err = %e, "Indexing failed");
        run.emit(IndexProgress::Error { message: e.to_string() }).await;
        Err(e)
      }
    }
  }

  async fn run_phases(&self, request: &IndexRequest, run: &Run) -> Result<IndexMetadata, IndexError> {
    let repo = RepoRef::parse(&request.source).ok_or_else(|| IndexError::InvalidSource(request.source.clone()))?;
    run.checkpoint()?;

    if !request.force
      && self.store.is_indexed(&repo).await?
      && let Some(metadata) = self.store.metadata(&repo).await?
    {
      info!(repo = %repo, chunks = metadata.chunk_count, "Repository already indexed, skipping");
      return Ok(metadata);
    }

    // clone
    run
      .emit(IndexProgress::Clone {
        source: request.source.clone(),
      })
      .await;
    let fetched = self.source.fetch_files(&request.source).await?;

    // extract
    run.checkpoint()?;
    let files = self.extract(fetched.files);
    run.emit(IndexProgress::Extract { files: files.len() }).await;
    if files.is_empty() {
      return Err(IndexError::NoFiles(repo.to_string()));
    }

    // chunk
    run.checkpoint()?;
    let mut chunks = self.chunker.chunk_all(&files);
    run
      .emit(IndexProgress::Chunk {
        files: files.len(),
        chunks: chunks.len(),
      })
      .await;

    // embed
    run.checkpoint()?;
    self.embed(&mut chunks, run).await?;

    // store
    run.checkpoint()?;
    run.emit(IndexProgress::Store { chunks: chunks.len() }).await;
    let metadata = IndexMetadata {
      owner: repo.owner.clone(),
      repo: repo.repo.clone(),
      branch: fetched.branch,
      file_count: files.len(),
      chunk_count: chunks.len(),
      provider: self.embedder.provider_name().to_string(),
      model: self.embedder.model_id().to_string(),
      indexed_at: Utc::now(),
    };
    self.store.store(&metadata, chunks).await?;

    info!(
      repo = %repo,
      files = metadata.file_count,
      chunks = metadata.chunk_count,
      "Repository indexed"
    );
    Ok(metadata)
  }

  /// Drop empty files and files over the size limit
  fn extract(&self, files: Vec<SourceFile>) -> Vec<SourceFile> {
    let total = files.len();
    let kept: Vec<_> = files
      .into_iter()
      .filter(|f| !f.content.trim().is_empty() && f.content.len() <= self.config.max_file_bytes)
      .collect();
    debug!(total, kept = kept.len(), "Extracted files");
    kept
  }

  async fn embed(&self, chunks: &mut [Chunk], run: &Run) -> Result<(), IndexError> {
    let total = chunks.len();
    let batch_size = self.config.embed_batch_size.max(1);
    let mut current = 0;

    for (batch_index, batch) in chunks.chunks_mut(batch_size).enumerate() {
      run.checkpoint()?;

      let texts = batch.iter().map(Chunk::embedding_text).collect();
      let vectors = self.embedder.embed_many(texts).await?;
      for (chunk, vector) in batch.iter_mut().zip(vectors) {
        chunk.vector = Some(vector);
      }

      current += batch.len();
      trace!(batch = batch_index, current, total, "Embedded batch");
      run.emit(IndexProgress::Embed { current, total }).await;
    }
    Ok(())
  }
}

/// Per-run progress channel and cancellation token
struct Run {
  progress: mpsc::Sender<IndexProgress>,
  cancel: CancellationToken,
  source: String,
}

impl Run {
  fn checkpoint(&self) -> Result<(), IndexError> {
    if self.cancel.is_cancelled() {
      return Err(IndexError::Cancelled);
    }
    Ok(())
  }

  async fn emit(&self, event: IndexProgress) {
    if self.progress.send(event).await.is_err() {
      trace!(source = %self.source, "Progress receiver dropped");
    }
  }
}

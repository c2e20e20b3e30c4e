use std::sync::Arc;

use docsmith_core::RepoRef;
use embedding::PooledEmbedder;
use tracing::debug;

use crate::{IndexError, ScoredChunk, VectorStore};

/// Query-time side of the index: embeds a question and searches the store
#[derive(Clone)]
pub struct Retriever {
  embedder: Arc<PooledEmbedder>,
  store: Arc<dyn VectorStore>,
}

impl Retriever {
  pub fn new(embedder: Arc<PooledEmbedder>, store: Arc<dyn VectorStore>) -> Self {
    Self { embedder, store }
  }

  pub async fn search(&self, repo: &RepoRef, query: &str, limit: usize) -> Result<Vec<ScoredChunk>, IndexError> {
    let vector = self.embedder.embed_query(query).await?;
    let hits = self.store.search(repo, &vector, limit).await?;
    debug!(repo = %repo, hits = hits.len(), limit, "Retrieved context");
    Ok(hits)
  }
}

/// Render retrieved chunks as markdown context blocks
pub fn format_context(hits: &[ScoredChunk]) -> String {
  hits
    .iter()
    .map(|hit| {
      format!(
        "### {} (chunk {}/{})\n{}\n",
        hit.chunk.path,
        hit.chunk.chunk_index + 1,
        hit.chunk.total_chunks,
        hit.chunk.content.trim_end()
      )
    })
    .collect::<Vec<_>>()
    .join("\n")
}

#[cfg(test)]
mod tests {
  use async_trait::async_trait;
  use chrono::Utc;
  use docsmith_core::{Chunk, CredentialEntry, CredentialPool, IndexMetadata, SourceFile, credentials::DEFAULT_COOLDOWN};
  use embedding::{EmbeddingError, EmbeddingMode, EmbeddingProvider, Embeddings};
  use pretty_assertions::assert_eq;

  use super::*;
  use crate::MemoryVectorStore;

  /// Maps texts mentioning "storage" to one axis and everything else to the other
  struct KeywordEmbedder;

  #[async_trait]
  impl EmbeddingProvider for KeywordEmbedder {
    fn name(&self) -> &str {
      "keyword"
    }

    fn model_id(&self) -> &str {
      "keyword"
    }

    fn dimensions(&self) -> usize {
      2
    }

    async fn embed(
      &self,
      texts: &[&str],
      _mode: EmbeddingMode,
      _credential: &str,
    ) -> Result<Embeddings, EmbeddingError> {
      Ok(Embeddings::new(
        texts
          .iter()
          .map(|t| if t.contains("storage") { vec![1.0, 0.0] } else { vec![0.0, 1.0] })
          .collect(),
      ))
    }
  }

  fn chunk(path: &str, content: &str, vector: Vec<f32>) -> Chunk {
    let mut chunk = Chunk::new(&SourceFile::new(path, content), 0, content.to_string());
    chunk.total_chunks = 1;
    chunk.vector = Some(vector);
    chunk
  }

  #[tokio::test]
  async fn test_search_ranks_relevant_chunk_first() {
    let store = Arc::new(MemoryVectorStore::new());
    let metadata = IndexMetadata {
      owner: "acme".into(),
      repo: "widgets".into(),
      branch: "main".into(),
      file_count: 2,
      chunk_count: 2,
      provider: "keyword".into(),
      model: "keyword".into(),
      indexed_at: Utc::now(),
    };
    store
      .store(
        &metadata,
        vec![
          chunk("src/cli.rs", "argument parsing", vec![0.0, 1.0]),
          chunk("src/store.rs", "storage engine", vec![1.0, 0.0]),
        ],
      )
      .await
      .unwrap();

    let pool = CredentialPool::new("embeddings", CredentialEntry::from_secrets(["k"]), DEFAULT_COOLDOWN).unwrap();
    let embedder = Arc::new(PooledEmbedder::new(Arc::new(KeywordEmbedder), Arc::new(pool)));
    let retriever = Retriever::new(embedder, store);

    let hits = retriever
      .search(&RepoRef::new("acme", "widgets"), "how does storage work", 1)
      .await
      .unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].chunk.path, "src/store.rs");
  }

  #[test]
  fn test_format_context() {
    let mut second = chunk("src/lib.rs", "fn b() {}\n", vec![]);
    second.chunk_index = 1;
    second.total_chunks = 3;
    let hits = vec![
      ScoredChunk {
        chunk: chunk("README.md", "# Widgets", vec![]),
        score: 0.9,
      },
      ScoredChunk {
        chunk: second,
        score: 0.5,
      },
    ];

    assert_eq!(
      format_context(&hits),
      "### README.md (chunk 1/1)\n# Widgets\n\n### src/lib.rs (chunk 2/3)\nfn b() {}\n"
    );
  }

  #[test]
  fn test_format_empty_context() {
    assert_eq!(format_context(&[]), "");
  }
}

use docsmith_core::{Chunk, SourceFile, config::IndexConfig};
use tracing::trace;

/// Configuration for the chunker
#[derive(Debug, Clone, Copy)]
pub struct ChunkerConfig {
  /// Words per chunk
  pub chunk_size: usize,
  /// Words repeated at the start of the next chunk
  pub overlap: usize,
}

impl Default for ChunkerConfig {
  fn default() -> Self {
    Self {
      chunk_size: 350,
      overlap: 100,
    }
  }
}

impl From<&IndexConfig> for ChunkerConfig {
  fn from(config: &IndexConfig) -> Self {
    Self {
      chunk_size: config.chunk_size,
      overlap: config.chunk_overlap,
    }
  }
}

/// Word-window chunker
///
/// Splits a document on whitespace into windows of `chunk_size` words, each
/// window starting `chunk_size - overlap` words after the previous one.
/// Documents that fit in one window are kept whole.
#[derive(Debug, Clone, Default)]
pub struct Chunker {
  config: ChunkerConfig,
}

impl Chunker {
  pub fn new(config: ChunkerConfig) -> Self {
    Self {
      config: ChunkerConfig {
        chunk_size: config.chunk_size.max(1),
        overlap: config.overlap,
      },
    }
  }

  /// Words between the starts of consecutive windows, at least 1
  pub fn step(&self) -> usize {
    self.config.chunk_size.saturating_sub(self.config.overlap).max(1)
  }

  pub fn chunk(&self, file: &SourceFile) -> Vec<Chunk> {
    let words: Vec<&str> = file.content.split_whitespace().collect();
    if words.is_empty() {
      return Vec::new();
    }

    let size = self.config.chunk_size;
    if words.len() <= size {
      let mut chunk = Chunk::new(file, 0, file.content.clone());
      chunk.total_chunks = 1;
      return vec![chunk];
    }

    let step = self.step();
    let mut chunks = Vec::with_capacity(words.len().div_ceil(step));
    let mut start = 0;
    loop {
      let end = (start + size).min(words.len());
      chunks.push(Chunk::new(file, chunks.len(), words[start..end].join(" ")));
      if end == words.len() {
        break;
      }
      start += step;
    }

    let total = chunks.len();
    for chunk in &mut chunks {
      chunk.total_chunks = total;
    }

    trace!(path = %file.path, words = words.len(), chunks = total, "Chunked file");
    chunks
  }

  pub fn chunk_all(&self, files: &[SourceFile]) -> Vec<Chunk> {
    files.iter().flat_map(|f| self.chunk(f)).collect()
  }
}

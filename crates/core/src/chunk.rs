use std::path::Path;

use serde::{Deserialize, Serialize};

/// Characters per token estimate (for LLM token counting)
pub const CHARS_PER_TOKEN: usize = 4;

/// Estimate the token count of a text.
///
/// Rounds up so that a non-empty text never estimates to zero tokens.
pub fn estimate_tokens(text: &str) -> u64 {
  text.chars().count().div_ceil(CHARS_PER_TOKEN) as u64
}

/// A file pulled from a repository source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFile {
  /// Path relative to the repository root, `/`-separated
  pub path: String,
  pub content: String,
  /// Lowercase extension without the dot (empty when the file has none)
  pub extension: String,
}

impl SourceFile {
  pub fn new(path: impl Into<String>, content: impl Into<String>) -> Self {
    let path = path.into();
    let extension = Path::new(&path)
      .extension()
      .map(|e| e.to_string_lossy().to_lowercase())
      .unwrap_or_default();
    Self {
      path,
      content: content.into(),
      extension,
    }
  }
}

/// Files returned by a repository source together with the resolved branch.
#[derive(Debug, Clone, Default)]
pub struct FetchedRepository {
  pub files: Vec<SourceFile>,
  pub branch: String,
}

/// A bounded slice of a source document, the unit of embedding and retrieval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
  /// `<path>#<chunk_index>`
  pub id: String,
  pub path: String,
  pub content: String,
  /// Dense 0-based position within the source document
  pub chunk_index: usize,
  /// Number of chunks produced from the source document
  pub total_chunks: usize,
  pub extension: String,
  /// Set as a whole once embedding succeeds
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub vector: Option<Vec<f32>>,
}

impl Chunk {
  pub fn new(file: &SourceFile, chunk_index: usize, content: String) -> Self {
    Self {
      id: format!("{}#{}", file.path, chunk_index),
      path: file.path.clone(),
      content,
      chunk_index,
      total_chunks: 0,
      extension: file.extension.clone(),
      vector: None,
    }
  }

  /// Text sent to the embedding provider. The path is prepended so that
  /// file names participate in retrieval.
  pub fn embedding_text(&self) -> String {
    format!("File: {}\n\n{}", self.path, self.content)
  }

  pub fn is_embedded(&self) -> bool {
    self.vector.is_some()
  }
}

/// Identifies an indexed repository in the vector store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepoRef {
  pub owner: String,
  pub repo: String,
}

impl RepoRef {
  pub fn new(owner: impl Into<String>, repo: impl Into<String>) -> Self {
    Self {
      owner: owner.into(),
      repo: repo.into(),
    }
  }

  /// Parse a repository reference from a GitHub URL, an `owner/repo`
  /// shorthand, or a local directory path.
  ///
  /// Local paths map to owner `local` and the directory name as repo.
  pub fn parse(source: &str) -> Option<Self> {
    let trimmed = source.trim().trim_end_matches('/');
    if trimmed.is_empty() {
      return None;
    }

    for prefix in ["https://github.com/", "http://github.com/", "git@github.com:", "github.com/"] {
      if let Some(rest) = trimmed.strip_prefix(prefix) {
        let mut parts = rest.split('/');
        let owner = parts.next().filter(|s| !s.is_empty())?;
        let repo = parts.next().filter(|s| !s.is_empty())?;
        return Some(Self::new(owner, repo.trim_end_matches(".git")));
      }
    }

    let path = Path::new(trimmed);
    let looks_local = trimmed.starts_with('.') || trimmed.starts_with('/') || trimmed.starts_with('~') || path.exists();
    if looks_local {
      let name = path.file_name()?.to_string_lossy().to_string();
      return Some(Self::new("local", name));
    }

    let mut parts = trimmed.split('/');
    match (parts.next(), parts.next(), parts.next()) {
      (Some(owner), Some(repo), None) if !owner.is_empty() && !repo.is_empty() => Some(Self::new(owner, repo)),
      _ => None,
    }
  }
}

impl std::fmt::Display for RepoRef {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}/{}", self.owner, self.repo)
  }
}

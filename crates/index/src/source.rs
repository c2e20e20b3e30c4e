//! Repository sources.
//!
//! A source turns a repository reference into the text files to index.

use std::{
  collections::HashMap,
  path::{Path, PathBuf},
};

use async_trait::async_trait;
use docsmith_core::{FetchedRepository, SourceFile, config::IndexConfig};
use ignore::WalkBuilder;
use thiserror::Error;
use tracing::{debug, trace};

#[derive(Error, Debug)]
pub enum SourceError {
  #[error("repository not found: {0}")]
  NotFound(String),

  #[error("source not supported: {0}")]
  Unsupported(String),

  #[error("failed to read {path}: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("source task failed: {0}")]
  Task(String),
}

#[async_trait]
pub trait RepositorySource: Send + Sync {
  async fn fetch_files(&self, url: &str) -> Result<FetchedRepository, SourceError>;
}

/// Parameters for walking a local checkout
#[derive(Debug, Clone)]
pub struct ScanParams {
  pub extensions: Vec<String>,
  pub exclude_dirs: Vec<String>,
  pub max_file_bytes: u64,
}

impl From<&IndexConfig> for ScanParams {
  fn from(config: &IndexConfig) -> Self {
    Self {
      extensions: config.include_extensions.iter().map(|e| e.to_lowercase()).collect(),
      exclude_dirs: config.exclude_dirs.clone(),
      max_file_bytes: config.max_file_bytes as u64,
    }
  }
}

/// Reads a repository from a directory on disk.
///
/// Respects `.gitignore`, skips hidden files, excluded directories and files
/// whose extension is not indexed. Non-UTF-8 files are skipped.
#[derive(Debug, Clone)]
pub struct LocalSource {
  params: ScanParams,
}

impl LocalSource {
  pub fn new(params: ScanParams) -> Self {
    Self { params }
  }

  pub fn from_config(config: &IndexConfig) -> Self {
    Self::new(ScanParams::from(config))
  }
}

#[async_trait]
impl RepositorySource for LocalSource {
  async fn fetch_files(&self, url: &str) -> Result<FetchedRepository, SourceError> {
    let root = expand_home(url);
    if !root.is_dir() {
      if is_remote_reference(url) {
        return Err(SourceError::Unsupported(format!("{} (only local checkouts can be indexed)", url)));
      }
      return Err(SourceError::NotFound(url.to_string()));
    }

    let params = self.params.clone();
    tokio::task::spawn_blocking(move || scan(&root, &params))
      .await
      .map_err(|e| SourceError::Task(e.to_string()))?
  }
}

/// URLs and `owner/repo` shorthand name a hosted repository, not a directory
fn is_remote_reference(url: &str) -> bool {
  if url.contains("://") {
    return !url.starts_with("file://");
  }
  if url.starts_with("git@") || url.starts_with("github.com/") {
    return true;
  }
  if url.starts_with(['/', '.', '~']) {
    return false;
  }
  let segments: Vec<&str> = url.trim_end_matches('/').split('/').collect();
  segments.len() == 2 && segments.iter().all(|s| !s.is_empty())
}

fn expand_home(url: &str) -> PathBuf {
  let path = url.strip_prefix("file://").unwrap_or(url);
  if let Some(rest) = path.strip_prefix("~/")
    && let Some(home) = std::env::var_os("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  PathBuf::from(path)
}

fn scan(root: &Path, params: &ScanParams) -> Result<FetchedRepository, SourceError> {
  let exclude = params.exclude_dirs.clone();
  let walker = WalkBuilder::new(root)
    .hidden(true)
    .git_ignore(true)
    .git_global(false)
    .git_exclude(true)
    .require_git(false)
    .max_filesize(Some(params.max_file_bytes))
    .filter_entry(move |entry| {
      let is_dir = entry.file_type().is_some_and(|t| t.is_dir());
      !(is_dir && exclude.iter().any(|d| entry.file_name() == d.as_str()))
    })
    .build();

  let mut files = Vec::new();
  let mut skipped = 0usize;
  for entry in walker.flatten() {
    if !entry.file_type().is_some_and(|t| t.is_file()) {
      continue;
    }
    let path = entry.path();
    let extension = path
      .extension()
      .map(|e| e.to_string_lossy().to_lowercase())
      .unwrap_or_default();
    if !params.extensions.contains(&extension) {
      continue;
    }

    let bytes = std::fs::read(path).map_err(|source| SourceError::Io {
      path: path.to_path_buf(),
      source,
    })?;
    let Ok(content) = String::from_utf8(bytes) else {
      skipped += 1;
      trace!(path = %path.display(), "Skipping non-UTF-8 file");
      continue;
    };

    let relative = path.strip_prefix(root).unwrap_or(path);
    let relative = relative
      .components()
      .map(|c| c.as_os_str().to_string_lossy())
      .collect::<Vec<_>>()
      .join("/");
    files.push(SourceFile::new(relative, content));
  }

  files.sort_by(|a, b| a.path.cmp(&b.path));
  let branch = read_branch(root).unwrap_or_else(|| "local".to_string());
  debug!(root = %root.display(), files = files.len(), skipped, branch, "Scanned local repository");

  Ok(FetchedRepository { files, branch })
}

/// Branch checked out in `root/.git`, if any
fn read_branch(root: &Path) -> Option<String> {
  let head = std::fs::read_to_string(root.join(".git").join("HEAD")).ok()?;
  head
    .trim()
    .strip_prefix("ref: refs/heads/")
    .map(|branch| branch.to_string())
}

/// Fixed set of repositories held in memory, keyed by url
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
  repos: HashMap<String, FetchedRepository>,
}

impl MemorySource {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_repository(mut self, url: impl Into<String>, branch: impl Into<String>, files: Vec<SourceFile>) -> Self {
    self.repos.insert(
      url.into(),
      FetchedRepository {
        files,
        branch: branch.into(),
      },
    );
    self
  }
}

#[async_trait]
impl RepositorySource for MemorySource {
  async fn fetch_files(&self, url: &str) -> Result<FetchedRepository, SourceError> {
    self
      .repos
      .get(url)
      .cloned()
      .ok_or_else(|| SourceError::NotFound(url.to_string()))
  }
}

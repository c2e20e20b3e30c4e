//! Configuration for docsmith.
//!
//! Config priority: project-relative (.docsmith/config.toml) > user (~/.config/docsmith/config.toml) > defaults

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::credentials::CredentialEntry;

/// Env var holding comma-separated embedding API keys
pub const EMBEDDING_KEYS_ENV: &str = "DOCSMITH_EMBEDDING_KEYS";
/// Env var holding comma-separated generation API keys
pub const GENERATION_KEYS_ENV: &str = "DOCSMITH_GENERATION_KEYS";

/// Pool id used for embedding credentials
pub const EMBEDDING_POOL_ID: &str = "embeddings";

// ============================================================================
// Embedding Configuration
// ============================================================================

/// Embedding provider options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProviderKind {
  #[default]
  OpenAi,
  Gemini,
  Ollama,
}

impl EmbeddingProviderKind {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::OpenAi => "openai",
      Self::Gemini => "gemini",
      Self::Ollama => "ollama",
    }
  }

  /// Provider-specific env var consulted when no keys are configured
  pub fn key_env_var(&self) -> Option<&'static str> {
    match self {
      Self::OpenAi => Some("OPENAI_API_KEY"),
      Self::Gemini => Some("GEMINI_API_KEY"),
      Self::Ollama => None,
    }
  }
}

/// Embedding configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
  /// Which embedding provider to use
  pub provider: EmbeddingProviderKind,

  /// Model name (e.g., "text-embedding-3-small", "text-embedding-004")
  pub model: String,

  /// Embedding dimensions
  pub dimensions: usize,

  /// Override the provider's base URL (OpenAI-compatible gateways, remote Ollama)
  #[serde(skip_serializing_if = "Option::is_none")]
  pub base_url: Option<String>,

  /// API keys rotated through the credential pool
  /// If empty, reads DOCSMITH_EMBEDDING_KEYS, then the provider's own env var
  pub api_keys: Vec<String>,

  /// Optional labels for api_keys (same order), used in logs
  #[serde(skip_serializing_if = "Option::is_none")]
  pub labels: Option<Vec<String>>,

  /// Per-credential token budget per minute; enables throughput-sensitive mode
  #[serde(skip_serializing_if = "Option::is_none")]
  pub tokens_per_minute: Option<u64>,

  /// Retries for transient network failures (default: 3)
  pub max_network_retries: u32,

  /// Linear backoff step in milliseconds (default: 1000)
  pub backoff_ms: u64,

  /// HTTP request timeout in seconds (default: 60)
  pub request_timeout_secs: u64,
}

impl Default for EmbeddingConfig {
  fn default() -> Self {
    Self {
      provider: EmbeddingProviderKind::OpenAi,
      model: "text-embedding-3-small".to_string(),
      dimensions: 1536,
      base_url: None,
      api_keys: Vec::new(),
      labels: None,
      tokens_per_minute: None,
      max_network_retries: 3,
      backoff_ms: 1000,
      request_timeout_secs: 60,
    }
  }
}

impl EmbeddingConfig {
  /// Resolve credentials from config and the process environment
  pub fn credential_entries(&self) -> Vec<CredentialEntry> {
    self.resolve_credentials(|name| std::env::var(name).ok())
  }

  /// Resolve credentials using a custom env lookup
  pub fn resolve_credentials(&self, env: impl Fn(&str) -> Option<String>) -> Vec<CredentialEntry> {
    // Local providers still go through a pool so every call path is the same
    if self.provider == EmbeddingProviderKind::Ollama && self.api_keys.is_empty() {
      return vec![CredentialEntry::new("", "local")];
    }
    resolve_keys(
      &self.api_keys,
      self.labels.as_deref(),
      EMBEDDING_KEYS_ENV,
      self.provider.key_env_var(),
      env,
    )
  }
}

// ============================================================================
// Generation Configuration
// ============================================================================

/// Chat/generation provider options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ChatProviderKind {
  #[default]
  OpenAi,
  Anthropic,
}

impl ChatProviderKind {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::OpenAi => "openai",
      Self::Anthropic => "anthropic",
    }
  }

  pub fn key_env_var(&self) -> &'static str {
    match self {
      Self::OpenAi => "OPENAI_API_KEY",
      Self::Anthropic => "ANTHROPIC_API_KEY",
    }
  }
}

/// Generation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
  pub provider: ChatProviderKind,

  /// Model name (e.g., "gpt-4o-mini", "claude-3-5-haiku-latest")
  pub model: String,

  #[serde(skip_serializing_if = "Option::is_none")]
  pub base_url: Option<String>,

  /// API keys rotated through the credential pool
  /// If empty, reads DOCSMITH_GENERATION_KEYS, then the provider's own env var
  pub api_keys: Vec<String>,

  #[serde(skip_serializing_if = "Option::is_none")]
  pub labels: Option<Vec<String>>,

  /// Per-credential token budget per minute; enables throughput-sensitive mode
  #[serde(skip_serializing_if = "Option::is_none")]
  pub tokens_per_minute: Option<u64>,

  /// Maximum tokens generated per request (default: 2048)
  pub max_output_tokens: u32,

  /// Retries for stream glitches and network failures (default: 2)
  pub max_retries: u32,

  /// Linear backoff step in milliseconds (default: 1000)
  pub backoff_ms: u64,

  pub temperature: f32,

  /// Chunks retrieved per generated section (default: 8)
  pub context_chunks: usize,
}

impl Default for GenerationConfig {
  fn default() -> Self {
    Self {
      provider: ChatProviderKind::OpenAi,
      model: "gpt-4o-mini".to_string(),
      base_url: None,
      api_keys: Vec::new(),
      labels: None,
      tokens_per_minute: None,
      max_output_tokens: 2048,
      max_retries: 2,
      backoff_ms: 1000,
      temperature: 0.2,
      context_chunks: 8,
    }
  }
}

impl GenerationConfig {
  /// Pool id, one pool per provider
  pub fn pool_id(&self) -> String {
    format!("generation-{}", self.provider.as_str())
  }

  pub fn credential_entries(&self) -> Vec<CredentialEntry> {
    self.resolve_credentials(|name| std::env::var(name).ok())
  }

  pub fn resolve_credentials(&self, env: impl Fn(&str) -> Option<String>) -> Vec<CredentialEntry> {
    resolve_keys(
      &self.api_keys,
      self.labels.as_deref(),
      GENERATION_KEYS_ENV,
      Some(self.provider.key_env_var()),
      env,
    )
  }
}

fn resolve_keys(
  keys: &[String],
  labels: Option<&[String]>,
  list_env: &str,
  single_env: Option<&str>,
  env: impl Fn(&str) -> Option<String>,
) -> Vec<CredentialEntry> {
  let secrets: Vec<String> = if !keys.is_empty() {
    keys.to_vec()
  } else if let Some(list) = env(list_env) {
    list
      .split(',')
      .map(str::trim)
      .filter(|s| !s.is_empty())
      .map(String::from)
      .collect()
  } else {
    single_env
      .and_then(&env)
      .map(|k| k.trim().to_string())
      .filter(|k| !k.is_empty())
      .into_iter()
      .collect()
  };

  secrets
    .into_iter()
    .enumerate()
    .map(|(i, secret)| {
      let label = labels
        .and_then(|l| l.get(i))
        .cloned()
        .unwrap_or_else(|| format!("key-{}", i));
      CredentialEntry::new(secret, label)
    })
    .collect()
}

// ============================================================================
// Indexing Configuration
// ============================================================================

/// Indexing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
  /// Words per chunk (default: 350)
  pub chunk_size: usize,

  /// Words shared between consecutive chunks (default: 100)
  pub chunk_overlap: usize,

  /// Chunks per embedding batch; progress is reported per batch (default: 20)
  pub embed_batch_size: usize,

  /// Embedding requests in flight per batch (default: 5)
  pub embed_concurrency: usize,

  /// Files larger than this are skipped (default: 512KB)
  pub max_file_bytes: usize,

  /// Extensions indexed by the local source
  pub include_extensions: Vec<String>,

  /// Directory names never descended into
  pub exclude_dirs: Vec<String>,
}

impl Default for IndexConfig {
  fn default() -> Self {
    let include_extensions = [
      "rs", "py", "js", "jsx", "ts", "tsx", "go", "java", "kt", "c", "h", "cpp", "hpp", "cs", "rb", "php", "swift",
      "scala", "sh", "md", "mdx", "txt", "toml", "yaml", "yml", "json",
    ];
    let exclude_dirs = ["node_modules", "target", "dist", "build", "vendor", ".git", "__pycache__"];
    Self {
      chunk_size: 350,
      chunk_overlap: 100,
      embed_batch_size: 20,
      embed_concurrency: 5,
      max_file_bytes: 512 * 1024,
      include_extensions: include_extensions.iter().map(|s| s.to_string()).collect(),
      exclude_dirs: exclude_dirs.iter().map(|s| s.to_string()).collect(),
    }
  }
}

// ============================================================================
// Pool / Job / Log Configuration
// ============================================================================

/// Credential pool configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
  /// Cooldown after a rate limit, in seconds (default: 30)
  pub cooldown_secs: u64,

  /// Longest wait for token budget before a request fails (default: 90)
  pub max_budget_wait_secs: u64,
}

impl Default for PoolConfig {
  fn default() -> Self {
    Self {
      cooldown_secs: 30,
      max_budget_wait_secs: 90,
    }
  }
}

/// Job registry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JobConfig {
  /// Seconds a finished job stays available for replay (default: 300)
  pub cleanup_delay_secs: u64,

  /// Most recent errors kept for inspection (default: 50)
  pub diagnostics_capacity: usize,
}

impl Default for JobConfig {
  fn default() -> Self {
    Self {
      cleanup_delay_secs: 300,
      diagnostics_capacity: 50,
    }
  }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
  /// Log level: "off", "error", "warn", "info", "debug", "trace"
  pub level: String,

  /// Log file rotation: "daily", "hourly", "never"
  pub rotation: String,

  /// Write logs to this directory instead of stderr
  #[serde(skip_serializing_if = "Option::is_none")]
  pub directory: Option<PathBuf>,
}

impl Default for LogConfig {
  fn default() -> Self {
    Self {
      level: "info".to_string(),
      rotation: "daily".to_string(),
      directory: None,
    }
  }
}

// ============================================================================
// Main Configuration
// ============================================================================

/// docsmith configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
  pub embedding: EmbeddingConfig,
  pub generation: GenerationConfig,
  pub index: IndexConfig,
  pub pool: PoolConfig,
  pub jobs: JobConfig,
  pub log: LogConfig,
}

/// Errors reading an explicitly requested config file
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
  #[error("Failed to read {path}: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
  #[error("Invalid config in {path}: {source}")]
  Parse {
    path: PathBuf,
    #[source]
    source: toml::de::Error,
  },
}

impl Config {
  /// Load config for a project, with fallback to user config
  pub fn load_for_project(project_path: &Path) -> Self {
    let project_config = Self::project_config_path(project_path);
    if let Ok(config) = Self::load_file(&project_config) {
      return config;
    }

    if let Some(user_config_path) = Self::user_config_path()
      && let Ok(config) = Self::load_file(&user_config_path)
    {
      return config;
    }

    Self::default()
  }

  /// Load a specific config file
  pub fn load_file(path: &Path) -> Result<Self, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
      path: path.to_path_buf(),
      source,
    })?;
    toml::from_str(&content).map_err(|source| ConfigError::Parse {
      path: path.to_path_buf(),
      source,
    })
  }

  /// Get the user-level config path
  pub fn user_config_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("DOCSMITH_CONFIG_DIR") {
      return Some(PathBuf::from(path).join("config.toml"));
    }

    if let Ok(path) = std::env::var("XDG_CONFIG_HOME") {
      return Some(PathBuf::from(path).join("docsmith").join("config.toml"));
    }

    dirs::config_dir().map(|p: PathBuf| p.join("docsmith").join("config.toml"))
  }

  /// Get the project-relative config path
  pub fn project_config_path(project_path: &Path) -> PathBuf {
    project_path.join(".docsmith").join("config.toml")
  }

  /// Generate a default config file as a string
  pub fn generate_template() -> String {
    let defaults = Self::default();
    format!(
      r#"# docsmith configuration
# Place in .docsmith/config.toml (project) or ~/.config/docsmith/config.toml (user)

[embedding]
# Provider: "openai", "gemini" or "ollama"
provider = "{embedding_provider}"
model = "{embedding_model}"
dimensions = {dimensions}
# Keys are rotated round-robin; a rate-limited key cools down for pool.cooldown_secs.
# Leave empty to read DOCSMITH_EMBEDDING_KEYS (comma-separated) or the provider env var.
api_keys = []
# Per-key token budget per minute (throughput-sensitive mode)
# tokens_per_minute = 1000000
max_network_retries = {max_network_retries}
backoff_ms = {backoff_ms}

[generation]
# Provider: "openai" or "anthropic"
provider = "{generation_provider}"
model = "{generation_model}"
api_keys = []
# tokens_per_minute = 200000
max_output_tokens = {max_output_tokens}
max_retries = {max_retries}
context_chunks = {context_chunks}

[index]
# Words per chunk and words shared between neighbouring chunks
chunk_size = {chunk_size}
chunk_overlap = {chunk_overlap}
# Chunks per embedding batch and requests in flight per batch
embed_batch_size = {embed_batch_size}
embed_concurrency = {embed_concurrency}
max_file_bytes = {max_file_bytes}

[pool]
cooldown_secs = {cooldown_secs}
# Longest wait for a key's token budget before the request fails
max_budget_wait_secs = {max_budget_wait_secs}

[jobs]
# Finished jobs stay available for reconnecting clients this long
cleanup_delay_secs = {cleanup_delay_secs}
diagnostics_capacity = {diagnostics_capacity}

[log]
# "off", "error", "warn", "info", "debug", "trace" (RUST_LOG overrides)
level = "{level}"
rotation = "{rotation}"
"#,
      embedding_provider = defaults.embedding.provider.as_str(),
      embedding_model = defaults.embedding.model,
      dimensions = defaults.embedding.dimensions,
      max_network_retries = defaults.embedding.max_network_retries,
      backoff_ms = defaults.embedding.backoff_ms,
      generation_provider = defaults.generation.provider.as_str(),
      generation_model = defaults.generation.model,
      max_output_tokens = defaults.generation.max_output_tokens,
      max_retries = defaults.generation.max_retries,
      context_chunks = defaults.generation.context_chunks,
      chunk_size = defaults.index.chunk_size,
      chunk_overlap = defaults.index.chunk_overlap,
      embed_batch_size = defaults.index.embed_batch_size,
      embed_concurrency = defaults.index.embed_concurrency,
      max_file_bytes = defaults.index.max_file_bytes,
      cooldown_secs = defaults.pool.cooldown_secs,
      max_budget_wait_secs = defaults.pool.max_budget_wait_secs,
      cleanup_delay_secs = defaults.jobs.cleanup_delay_secs,
      diagnostics_capacity = defaults.jobs.diagnostics_capacity,
      level = defaults.log.level,
      rotation = defaults.log.rotation,
    )
  }
}

#[cfg(test)]
mod tests {
  use pretty_assertions::assert_eq;
  use tempfile::TempDir;

  use super::*;

  #[test]
  fn test_defaults() {
    let config = Config::default();
    assert_eq!(config.index.chunk_size, 350);
    assert_eq!(config.index.chunk_overlap, 100);
    assert_eq!(config.pool.cooldown_secs, 30);
    assert_eq!(config.embedding.provider, EmbeddingProviderKind::OpenAi);
    assert_eq!(config.generation.pool_id(), "generation-openai");
  }

  #[test]
  fn test_load_project_config() {
    let temp = TempDir::new().unwrap();
    let dir = temp.path().join(".docsmith");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(
      dir.join("config.toml"),
      r#"
[embedding]
provider = "gemini"
api_keys = ["a", "b"]
labels = ["primary"]

[index]
chunk_size = 200
"#,
    )
    .unwrap();

    let config = Config::load_for_project(temp.path());
    assert_eq!(config.embedding.provider, EmbeddingProviderKind::Gemini);
    assert_eq!(config.index.chunk_size, 200);
    // Unspecified fields keep their defaults
    assert_eq!(config.index.chunk_overlap, 100);

    let entries = config.embedding.resolve_credentials(|_| None);
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].label, "primary");
    assert_eq!(entries[1].label, "key-1");
  }

  #[test]
  fn test_load_file_reports_parse_errors() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("bad.toml");
    std::fs::write(&path, "[index\nchunk_size = ").unwrap();
    assert!(matches!(Config::load_file(&path), Err(ConfigError::Parse { .. })));
    assert!(matches!(
      Config::load_file(&temp.path().join("missing.toml")),
      Err(ConfigError::Read { .. })
    ));
  }

  #[test]
  fn test_credentials_from_list_env() {
    let config = EmbeddingConfig::default();
    let entries = config.resolve_credentials(|name| match name {
      EMBEDDING_KEYS_ENV => Some(" k1, k2 ,,k3".to_string()),
      _ => None,
    });
    let secrets: Vec<&str> = entries.iter().map(|e| e.secret.as_str()).collect();
    assert_eq!(secrets, vec!["k1", "k2", "k3"]);
  }

  #[test]
  fn test_credentials_from_provider_env() {
    let config = GenerationConfig {
      provider: ChatProviderKind::Anthropic,
      ..Default::default()
    };
    let entries = config.resolve_credentials(|name| (name == "ANTHROPIC_API_KEY").then(|| "sk-ant".to_string()));
    assert_eq!(entries, vec![CredentialEntry::new("sk-ant", "key-0")]);
    assert!(config.resolve_credentials(|_| None).is_empty());
  }

  #[test]
  fn test_ollama_gets_local_credential() {
    let config = EmbeddingConfig {
      provider: EmbeddingProviderKind::Ollama,
      ..Default::default()
    };
    let entries = config.resolve_credentials(|_| None);
    assert_eq!(entries, vec![CredentialEntry::new("", "local")]);
  }

  #[test]
  fn test_template_parses_to_defaults() {
    let template = Config::generate_template();
    let parsed: Config = toml::from_str(&template).unwrap();
    assert_eq!(parsed.index.chunk_size, Config::default().index.chunk_size);
    assert_eq!(parsed.jobs.cleanup_delay_secs, 300);
    assert_eq!(parsed.log.level, "info");
  }

  #[test]
  fn test_toml_roundtrip() {
    let mut config = Config::default();
    config.generation.tokens_per_minute = Some(1000);
    let text = toml::to_string(&config).unwrap();
    let back: Config = toml::from_str(&text).unwrap();
    assert_eq!(back.generation.tokens_per_minute, Some(1000));
  }
}

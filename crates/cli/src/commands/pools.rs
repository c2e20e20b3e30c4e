//! Credential pool report

use anyhow::{Context, Result};
use docsmith::Runtime;
use docsmith_core::{Config, EmbeddingProviderKind};
use embedding::OllamaProvider;

use crate::format::format_pool_status;

/// Print the configured pools and their keys.
///
/// Pool state is not persisted between runs, so cooldowns are always fresh here.
pub async fn cmd_pools(config: Config, json: bool) -> Result<()> {
  let ollama = match config.embedding.provider {
    EmbeddingProviderKind::Ollama => Some(OllamaProvider::new(&config.embedding)?),
    _ => None,
  };
  let runtime = Runtime::from_config(config).context("Failed to initialize providers")?;
  let pools = runtime.pool_status();

  if json {
    println!("{}", serde_json::to_string_pretty(&pools)?);
    return Ok(());
  }

  let config = runtime.config();
  println!("Embedding:  {} ({})", config.embedding.provider.as_str(), config.embedding.model);
  println!("Generation: {} ({})", config.generation.provider.as_str(), config.generation.model);
  if let Some(ollama) = ollama {
    let reachable = if ollama.is_available().await {
      "reachable"
    } else {
      "NOT reachable"
    };
    println!("Ollama:     {}", reachable);
  }
  println!();
  print!("{}", format_pool_status(&pools));
  Ok(())
}

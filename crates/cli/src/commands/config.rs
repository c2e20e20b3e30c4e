//! Config file management

use std::path::Path;

use anyhow::{Context, Result, bail};
use docsmith_core::Config;

const REDACTED: &str = "<redacted>";

/// Show the effective configuration with api keys redacted
pub async fn cmd_config_show(config: &Config, explicit: Option<&Path>) -> Result<()> {
  let cwd = std::env::current_dir()?;
  let project_config = Config::project_config_path(&cwd);

  if let Some(path) = explicit {
    println!("Using config: {:?}", path);
  } else if project_config.exists() {
    println!("Using project config: {:?}", project_config);
  } else if let Some(user_path) = Config::user_config_path().filter(|p| p.exists()) {
    println!("Using user config: {:?}", user_path);
  } else {
    println!("Using default configuration (no config file found)");
  }
  println!();

  let mut shown = config.clone();
  for key in shown.embedding.api_keys.iter_mut().chain(shown.generation.api_keys.iter_mut()) {
    *key = REDACTED.to_string();
  }
  println!("{}", toml::to_string_pretty(&shown)?);
  Ok(())
}

/// Write the default config template to the project (or user) config path
pub async fn cmd_config_init(user: bool, force: bool) -> Result<()> {
  let config_path = if user {
    Config::user_config_path().context("No user config directory on this system")?
  } else {
    Config::project_config_path(&std::env::current_dir()?)
  };

  if config_path.exists() && !force {
    bail!("Config file already exists: {:?} (use --force to overwrite)", config_path);
  }
  if let Some(parent) = config_path.parent() {
    std::fs::create_dir_all(parent).with_context(|| format!("Failed to create {:?}", parent))?;
  }
  std::fs::write(&config_path, Config::generate_template())
    .with_context(|| format!("Failed to write {:?}", config_path))?;

  println!("Created config: {:?}", config_path);
  println!("Edit the file to configure providers and api keys.");
  Ok(())
}

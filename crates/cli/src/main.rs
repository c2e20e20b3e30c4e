//! docsmith CLI - index repositories and generate documentation from them

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;
mod format;
mod logging;

use commands::{cmd_config_init, cmd_config_show, cmd_docs, cmd_index, cmd_pools, load_config};
use logging::init_logging;

#[derive(Parser)]
#[command(name = "docsmith")]
#[command(about = "Generate documentation for a repository with retrieval-augmented LLM synthesis")]
#[command(after_help = "\
QUICK START:
  docsmith config init            # Write .docsmith/config.toml
  docsmith index ./my-repo        # Index a local checkout
  docsmith docs ./my-repo         # Index, then stream markdown to stdout

API KEYS:
  Set api_keys in the config, or DOCSMITH_EMBEDDING_KEYS / DOCSMITH_GENERATION_KEYS
  (comma-separated). Several keys are rotated when one is rate limited.")]
struct Cli {
  /// Config file to use instead of the project or user config
  #[arg(long, global = true, value_name = "FILE")]
  config: Option<PathBuf>,

  #[command(subcommand)]
  command: Commands,
}

/// Subcommands for `docsmith config`
#[derive(Subcommand)]
pub enum ConfigCommand {
  /// Show current effective configuration
  #[command(long_about = "Show the current effective configuration.\n\n\
    Displays which config file is being used and its contents as TOML. Api keys are redacted.")]
  Show,

  /// Write a config file with every default spelled out
  Init {
    /// Write the user config (~/.config/docsmith/config.toml) instead of the project config
    #[arg(long)]
    user: bool,
    /// Overwrite an existing file
    #[arg(long)]
    force: bool,
  },
}

#[derive(Subcommand)]
enum Commands {
  /// Index a local repository checkout
  Index {
    source: String,
    /// Re-index even if the repository is already indexed
    #[arg(long)]
    force: bool,
  },
  /// Index a repository and generate documentation for it
  #[command(after_help = "\
EXAMPLES:
  docsmith docs ./my-repo > DOCS.md
  docsmith docs ./my-repo --topic \"storage layer\"")]
  Docs {
    source: String,
    /// Focus the documentation on one topic
    #[arg(short, long)]
    topic: Option<String>,
    /// Re-index even if the repository is already indexed
    #[arg(long)]
    force: bool,
  },
  /// Manage configuration
  Config {
    #[command(subcommand)]
    command: ConfigCommand,
  },
  /// Show credential pools and key counts
  Pools {
    /// Output as JSON
    #[arg(long)]
    json: bool,
  },
}

#[tokio::main]
async fn main() -> Result<()> {
  let cli = Cli::parse();
  let config = load_config(cli.config.as_deref())?;
  let _guard = init_logging(&config.log);

  match cli.command {
    Commands::Index { source, force } => cmd_index(config, &source, force).await,
    Commands::Docs { source, topic, force } => cmd_docs(config, &source, topic, force).await,
    Commands::Config { command } => match command {
      ConfigCommand::Show => cmd_config_show(&config, cli.config.as_deref()).await,
      ConfigCommand::Init { user, force } => cmd_config_init(user, force).await,
    },
    Commands::Pools { json } => cmd_pools(config, json).await,
  }
}

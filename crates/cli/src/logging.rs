//! Logging setup for CLI commands

use docsmith_core::config::LogConfig;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
  EnvFilter,
  filter::{Directive, LevelFilter},
};

const LOG_FILE_NAME: &str = "docsmith.log";

/// Parse log level from config string. `None` turns logging off.
fn parse_log_level(level: &str) -> Option<tracing::Level> {
  match level.to_lowercase().as_str() {
    "off" => None,
    "error" => Some(tracing::Level::ERROR),
    "warn" => Some(tracing::Level::WARN),
    "info" => Some(tracing::Level::INFO),
    "debug" => Some(tracing::Level::DEBUG),
    "trace" => Some(tracing::Level::TRACE),
    _ => Some(tracing::Level::INFO),
  }
}

fn env_filter(config: &LogConfig) -> EnvFilter {
  let directive: Directive = match parse_log_level(&config.level) {
    Some(level) => level.into(),
    None => LevelFilter::OFF.into(),
  };
  // RUST_LOG wins over the configured level
  EnvFilter::builder().with_default_directive(directive).from_env_lossy()
}

/// Initialize logging from config.
///
/// Logs go to stderr so generated documentation on stdout stays clean. With
/// `log.directory` set they go to a rolling file instead.
///
/// Returns the guard that must be kept alive for the duration of the program
pub fn init_logging(config: &LogConfig) -> Option<WorkerGuard> {
  let filter = env_filter(config);

  let Some(log_dir) = &config.directory else {
    tracing_subscriber::fmt()
      .with_env_filter(filter)
      .with_writer(std::io::stderr)
      .with_target(false)
      .init();
    return None;
  };

  if let Err(e) = std::fs::create_dir_all(log_dir) {
    eprintln!("Cannot create log directory {:?} ({}), logging to stderr", log_dir, e);
    tracing_subscriber::fmt()
      .with_env_filter(filter)
      .with_writer(std::io::stderr)
      .init();
    return None;
  }

  let file_appender = match config.rotation.as_str() {
    "hourly" => tracing_appender::rolling::hourly(log_dir, LOG_FILE_NAME),
    "never" => tracing_appender::rolling::never(log_dir, LOG_FILE_NAME),
    _ => tracing_appender::rolling::daily(log_dir, LOG_FILE_NAME),
  };
  let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_target(true)
    .with_ansi(false)
    .with_writer(file_writer)
    .init();

  Some(guard)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_parse_log_level() {
    assert_eq!(parse_log_level("DEBUG"), Some(tracing::Level::DEBUG));
    assert_eq!(parse_log_level("warn"), Some(tracing::Level::WARN));
    assert_eq!(parse_log_level("off"), None);
    assert_eq!(parse_log_level("verbose"), Some(tracing::Level::INFO));
  }
}

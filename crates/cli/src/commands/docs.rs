//! Documentation generation

use std::io::Write;

use anyhow::{Context, Result};
use docsmith::{GenerationRequest, JobEvent, JobOutcome, Runtime};
use docsmith_core::Config;

use super::{exit_cancelled, follow_job, index::index_source};
use crate::format::format_section_heading;

/// Index `source`, then stream generated markdown to stdout.
///
/// The vector store lives in memory, so every run indexes first.
pub async fn cmd_docs(config: Config, source: &str, topic: Option<String>, force: bool) -> Result<()> {
  let runtime = Runtime::from_config(config).context("Failed to initialize providers")?;
  index_source(&runtime, source, force).await?;

  let request = GenerationRequest { topic };
  let job_id = runtime.start_generation(source, request).await?;

  let mut stdout = std::io::stdout();
  let outcome = follow_job(&runtime, &job_id, |event| {
    let written = match event {
      JobEvent::Section { title } => write!(stdout, "{}", format_section_heading(title)),
      JobEvent::Content { text } => write!(stdout, "{}", text),
      _ => Ok(()),
    };
    let _ = written.and_then(|()| stdout.flush());
  })
  .await
  .context("Documentation generation failed")?;

  writeln!(stdout)?;
  if outcome == JobOutcome::Cancelled {
    exit_cancelled("Generation");
  }
  Ok(())
}

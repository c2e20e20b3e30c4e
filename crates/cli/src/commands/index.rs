//! Repository indexing

use std::sync::Arc;

use anyhow::{Context, Result};
use docsmith::{JobEvent, JobOutcome, Runtime};
use docsmith_core::Config;

use super::{exit_cancelled, follow_job};
use crate::format::format_progress;

pub async fn cmd_index(config: Config, source: &str, force: bool) -> Result<()> {
  let runtime = Runtime::from_config(config).context("Failed to initialize providers")?;
  index_source(&runtime, source, force).await
}

/// Index `source` and print progress to stderr
pub(crate) async fn index_source(runtime: &Arc<Runtime>, source: &str, force: bool) -> Result<()> {
  let job_id = runtime.start_index(source, force)?;
  let outcome = follow_job(runtime, &job_id, |event| {
    if let JobEvent::Progress(progress) = event {
      eprintln!("{}", format_progress(progress));
    }
  })
  .await
  .with_context(|| format!("Indexing {} failed", source))?;

  if outcome == JobOutcome::Cancelled {
    exit_cancelled("Indexing");
  }
  Ok(())
}

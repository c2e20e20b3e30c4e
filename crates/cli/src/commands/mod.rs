//! CLI command implementations

mod config;
mod docs;
mod index;
mod pools;

use std::path::Path;

use anyhow::{Context, Result, bail};
use docsmith::{JobEvent, JobOutcome, Runtime};
use docsmith_core::Config;
use tracing::warn;

pub use config::{cmd_config_init, cmd_config_show};
pub use docs::cmd_docs;
pub use index::cmd_index;
pub use pools::cmd_pools;

/// Load an explicit config file, or the project/user config for the working directory
pub fn load_config(path: Option<&Path>) -> Result<Config> {
  match path {
    Some(path) => Ok(Config::load_file(path)?),
    None => {
      let cwd = std::env::current_dir().context("Failed to read working directory")?;
      Ok(Config::load_for_project(&cwd))
    }
  }
}

/// Exit status for a job stopped with Ctrl-C
const EXIT_CANCELLED: i32 = 130;

/// Replay and then stream a job's events until it finishes.
///
/// Ctrl-C cancels the job; the job still ends with its own terminal event.
/// Returns the outcome for completed and cancelled jobs, an error for failed ones.
pub(crate) async fn follow_job(
  runtime: &Runtime,
  job_id: &str,
  mut on_event: impl FnMut(&JobEvent),
) -> Result<JobOutcome> {
  let (replay, mut live) = runtime
    .jobs()
    .attach(job_id)
    .with_context(|| format!("Job {} not found", job_id))?;
  for event in &replay {
    on_event(event);
  }

  let mut interrupted = false;
  loop {
    tokio::select! {
      event = live.recv() => match event {
        Some(event) => on_event(&event),
        None => break,
      },
      _ = tokio::signal::ctrl_c(), if !interrupted => {
        interrupted = true;
        warn!(job_id, "Interrupted, cancelling job");
        runtime.cancel(job_id);
      }
    }
  }

  match runtime.jobs().wait(job_id).await {
    Some(JobOutcome::Failed(message)) => bail!(message),
    Some(outcome) => Ok(outcome),
    None => bail!("Job {} not found", job_id),
  }
}

/// Report a cancelled job and exit without treating it as a failure
pub(crate) fn exit_cancelled(what: &str) -> ! {
  eprintln!("{} cancelled", what);
  std::process::exit(EXIT_CANCELLED)
}

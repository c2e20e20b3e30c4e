//! Index jobs.

use std::sync::Arc;

use docsmith_core::RepoRef;
use index::{IndexRequest, Indexer};
use tokio::sync::mpsc;
use tracing::{Instrument, debug, info_span};
use uuid::Uuid;

use crate::{
  jobs::JobEvent,
  service::{Runtime, ServiceError},
};

/// Progress events buffered between the indexer and the job log
const PROGRESS_BUFFER: usize = 64;

impl Runtime {
  /// Start indexing `source` in the background and return the job id.
  ///
  /// Every progress event is appended to the job; the job completes when the
  /// indexer reaches `complete` and fails on `cancelled` or `error`.
  pub fn start_index(self: &Arc<Self>, source: &str, force: bool) -> Result<String, ServiceError> {
    if RepoRef::parse(source).is_none() {
      let err = ServiceError::InvalidSource(source.to_string());
      self.diagnostics.record("index", None, err.to_string());
      return Err(err);
    }
    let embedder = self.embedder().inspect_err(|e| {
      self.diagnostics.record("index", None, e.to_string());
    })?;

    let job_id = format!("index-{}", Uuid::now_v7());
    let cancel = self.register_active(&job_id);
    let indexer = Indexer::new(
      self.components.source.clone(),
      self.components.store.clone(),
      embedder,
      self.config.index.clone(),
    );
    let request = IndexRequest::new(source).force(force);

    let runtime = self.clone();
    let id = job_id.clone();
    let span = info_span!("index_job", job_id = %job_id, source = %source);
    tokio::spawn(
      async move {
        let (tx, mut rx) = mpsc::channel(PROGRESS_BUFFER);
        let forward = async {
          while let Some(progress) = rx.recv().await {
            runtime.jobs.push_event(&id, JobEvent::Progress(progress));
          }
        };

        let (result, ()) = tokio::join!(indexer.run(&request, tx, cancel), forward);
        let result = result.map(|metadata| {
          debug!(chunks = metadata.chunk_count, "Index job finished");
        });
        runtime.finish_job(&id, "index", result.map_err(ServiceError::from));
      }
      .instrument(span),
    );

    Ok(job_id)
  }
}

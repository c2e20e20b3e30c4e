//! Bounded concurrency executor.
//!
//! Runs a batch of independent async operations with at most `concurrency`
//! of them in flight, returning results in input order regardless of
//! completion order.
//!
//! Failure is fail-fast: the first error observed is returned immediately.
//! Tasks already in flight are not aborted, they finish in the background
//! and their results are discarded. Workers stop claiming new tasks once a
//! failure has been seen.

use std::{
  future::Future,
  sync::{
    Arc, Mutex,
    atomic::{AtomicUsize, Ordering},
  },
};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::trace;

/// Run `tasks` with at most `concurrency` in flight.
///
/// The returned vector is positionally aligned with `tasks`. A concurrency
/// of zero is treated as one.
pub async fn run_bounded<T, E, F, Fut>(tasks: Vec<F>, concurrency: usize) -> Result<Vec<T>, E>
where
  F: FnOnce() -> Fut + Send + 'static,
  Fut: Future<Output = Result<T, E>> + Send + 'static,
  T: Send + 'static,
  E: Send + 'static,
{
  let len = tasks.len();
  if len == 0 {
    return Ok(Vec::new());
  }

  let slots: Arc<Vec<Mutex<Option<F>>>> = Arc::new(tasks.into_iter().map(|t| Mutex::new(Some(t))).collect());
  let cursor = Arc::new(AtomicUsize::new(0));
  let stop = CancellationToken::new();
  let (tx, mut rx) = mpsc::unbounded_channel::<(usize, Result<T, E>)>();

  let workers = concurrency.max(1).min(len);
  trace!(tasks = len, workers, "Starting bounded batch");

  let mut handles = Vec::with_capacity(workers);
  for _ in 0..workers {
    let slots = slots.clone();
    let cursor = cursor.clone();
    let stop = stop.clone();
    let tx = tx.clone();
    handles.push(tokio::spawn(async move {
      while !stop.is_cancelled() {
        let index = cursor.fetch_add(1, Ordering::SeqCst);
        if index >= slots.len() {
          break;
        }
        let task = slots[index].lock().unwrap_or_else(|e| e.into_inner()).take();
        let Some(task) = task else { continue };

        let result = task().await;
        let failed = result.is_err();
        if failed {
          stop.cancel();
        }
        // The receiver is gone once the batch has already failed
        if tx.send((index, result)).is_err() || failed {
          break;
        }
      }
    }));
  }
  drop(tx);

  let mut results: Vec<Option<T>> = (0..len).map(|_| None).collect();
  while let Some((index, result)) = rx.recv().await {
    match result {
      Ok(value) => results[index] = Some(value),
      Err(e) => {
        stop.cancel();
        return Err(e);
      }
    }
  }

  // Every worker has exited. A missing slot means a task panicked.
  if results.iter().any(Option::is_none) {
    for handle in handles {
      if let Err(e) = handle.await
        && e.is_panic()
      {
        std::panic::resume_unwind(e.into_panic());
      }
    }
  }

  Ok(results.into_iter().flatten().collect())
}

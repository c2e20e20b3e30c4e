//! In-memory job registry.
//!
//! A job is an append-only event log with a set of live subscribers. Every
//! pushed event is appended and fanned out to current subscribers under the
//! job lock, so a subscriber sees events in log order. Finishing a job
//! appends a terminal sentinel (`Done`, `Failed` or `Cancelled`), closes every subscriber
//! channel and resolves the completion signal once. Finished jobs stay
//! available for replay until a delayed cleanup removes them.

use std::{
  collections::HashMap,
  sync::{
    Arc, Mutex, MutexGuard, Weak,
    atomic::{AtomicU64, Ordering},
  },
  time::Duration,
};

use dashmap::DashMap;
use docsmith_core::IndexProgress;
use serde::{Deserialize, Serialize};
use tokio::{
  sync::{mpsc, watch},
  time::Instant,
};
use tracing::{debug, info, trace, warn};

/// Default time a finished job is kept for late subscribers
pub const DEFAULT_CLEANUP_DELAY: Duration = Duration::from_secs(300);

/// One entry in a job's event log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobEvent {
  Progress(IndexProgress),
  /// Streamed generation fragment
  Content { text: String },
  /// Start of a generated documentation section
  Section { title: String },
  Done,
  Failed { message: String },
  /// The job was stopped on request, distinct from a failure
  Cancelled,
}

impl JobEvent {
  /// Returns true for the `Done`, `Failed` and `Cancelled` sentinels
  pub fn is_terminal(&self) -> bool {
    matches!(self, Self::Done | Self::Failed { .. } | Self::Cancelled)
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
  Running,
  Complete,
  Error,
}

/// How a job finished
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
  Complete,
  Failed(String),
  Cancelled,
}

struct JobState {
  status: JobStatus,
  events: Vec<JobEvent>,
  subscribers: HashMap<u64, mpsc::UnboundedSender<JobEvent>>,
  next_subscriber: u64,
  completed_at: Option<Instant>,
}

pub struct Job {
  id: String,
  generation: u64,
  created_at: Instant,
  state: Mutex<JobState>,
  outcome: watch::Sender<Option<JobOutcome>>,
}

impl Job {
  fn new(id: String, generation: u64) -> Self {
    let (outcome, _) = watch::channel(None);
    Self {
      id,
      generation,
      created_at: Instant::now(),
      state: Mutex::new(JobState {
        status: JobStatus::Running,
        events: Vec::new(),
        subscribers: HashMap::new(),
        next_subscriber: 0,
        completed_at: None,
      }),
      outcome,
    }
  }

  pub fn id(&self) -> &str {
    &self.id
  }

  pub fn generation(&self) -> u64 {
    self.generation
  }

  pub fn created_at(&self) -> Instant {
    self.created_at
  }

  pub fn status(&self) -> JobStatus {
    self.lock().status
  }

  pub fn completed_at(&self) -> Option<Instant> {
    self.lock().completed_at
  }

  fn lock(&self) -> MutexGuard<'_, JobState> {
    self.state.lock().unwrap_or_else(|e| e.into_inner())
  }

  /// Register a subscriber while the state lock is held
  fn add_subscriber(self: &Arc<Self>, state: &mut JobState) -> Subscription {
    let (tx, rx) = mpsc::unbounded_channel();
    let id = state.next_subscriber;
    state.next_subscriber += 1;
    // A finished job hands out an already-closed channel
    if state.status == JobStatus::Running {
      state.subscribers.insert(id, tx);
    }
    Subscription {
      id,
      job: Arc::downgrade(self),
      rx,
    }
  }

  fn remove_subscriber(&self, id: u64) {
    self.lock().subscribers.remove(&id);
  }

  fn push(&self, event: JobEvent) -> bool {
    let mut state = self.lock();
    if state.status != JobStatus::Running {
      trace!(job_id = %self.id, "Event dropped, job already finished");
      return false;
    }
    state.events.push(event.clone());
    state.subscribers.retain(|_, tx| tx.send(event.clone()).is_ok());
    true
  }

  fn finish(&self, status: JobStatus, outcome: JobOutcome) -> bool {
    {
      let mut state = self.lock();
      if state.status != JobStatus::Running {
        return false;
      }
      let sentinel = match &outcome {
        JobOutcome::Complete => JobEvent::Done,
        JobOutcome::Failed(message) => JobEvent::Failed {
          message: message.clone(),
        },
        JobOutcome::Cancelled => JobEvent::Cancelled,
      };
      state.status = status;
      state.completed_at = Some(Instant::now());
      state.events.push(sentinel.clone());
      for (_, tx) in state.subscribers.drain() {
        let _ = tx.send(sentinel.clone());
      }
    }
    self.outcome.send_replace(Some(outcome));
    true
  }
}

/// A live view of a job's events.
///
/// Receives every event pushed after subscription, then the terminal
/// sentinel, then `None`. Dropping it unsubscribes.
pub struct Subscription {
  id: u64,
  job: Weak<Job>,
  rx: mpsc::UnboundedReceiver<JobEvent>,
}

impl Subscription {
  pub async fn recv(&mut self) -> Option<JobEvent> {
    self.rx.recv().await
  }

  pub fn try_recv(&mut self) -> Option<JobEvent> {
    self.rx.try_recv().ok()
  }

  pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
  fn drop(&mut self) {
    if let Some(job) = self.job.upgrade() {
      job.remove_subscriber(self.id);
    }
  }
}

pub struct JobRegistry {
  jobs: Arc<DashMap<String, Arc<Job>>>,
  next_generation: AtomicU64,
  cleanup_delay: Duration,
}

impl Default for JobRegistry {
  fn default() -> Self {
    Self::new(DEFAULT_CLEANUP_DELAY)
  }
}

impl JobRegistry {
  pub fn new(cleanup_delay: Duration) -> Self {
    Self {
      jobs: Arc::new(DashMap::new()),
      next_generation: AtomicU64::new(1),
      cleanup_delay,
    }
  }

  /// Register a running job. An existing job with the same id is replaced.
  pub fn create_job(&self, id: &str) -> Arc<Job> {
    let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
    let job = Arc::new(Job::new(id.to_string(), generation));
    if let Some(previous) = self.jobs.insert(id.to_string(), job.clone()) {
      info!(job_id = %id, old_generation = previous.generation, generation, "Job replaced");
    } else {
      debug!(job_id = %id, generation, "Job created");
    }
    job
  }

  pub fn get(&self, id: &str) -> Option<Arc<Job>> {
    self.jobs.get(id).map(|j| j.clone())
  }

  /// Append an event and fan it out. Returns false if the job is unknown or
  /// finished. Terminal sentinels are only appended by `complete_job` and
  /// `fail_job`.
  pub fn push_event(&self, id: &str, event: JobEvent) -> bool {
    if event.is_terminal() {
      warn!(job_id = %id, "Terminal events are appended by complete_job/fail_job");
      return false;
    }
    match self.get(id) {
      Some(job) => job.push(event),
      None => {
        trace!(job_id = %id, "Event for unknown job dropped");
        false
      }
    }
  }

  /// Subscribe to events pushed from now on
  pub fn subscribe(&self, id: &str) -> Option<Subscription> {
    let job = self.get(id)?;
    let mut state = job.lock();
    Some(job.add_subscriber(&mut state))
  }

  /// Snapshot of every event logged so far
  pub fn buffered_events(&self, id: &str) -> Option<Vec<JobEvent>> {
    let job = self.get(id)?;
    let events = job.lock().events.clone();
    Some(events)
  }

  /// Replay plus subscription taken under one lock: every event appears
  /// exactly once across the two.
  pub fn attach(&self, id: &str) -> Option<(Vec<JobEvent>, Subscription)> {
    let job = self.get(id)?;
    let mut state = job.lock();
    let replay = state.events.clone();
    let subscription = job.add_subscriber(&mut state);
    Some((replay, subscription))
  }

  pub fn complete_job(&self, id: &str) -> bool {
    self.finish(id, JobStatus::Complete, JobOutcome::Complete)
  }

  pub fn fail_job(&self, id: &str, message: impl Into<String>) -> bool {
    self.finish(id, JobStatus::Error, JobOutcome::Failed(message.into()))
  }

  /// Finish a job stopped on request. Status is `Error`, the sentinel is `Cancelled`.
  pub fn cancel_job(&self, id: &str) -> bool {
    self.finish(id, JobStatus::Error, JobOutcome::Cancelled)
  }

  fn finish(&self, id: &str, status: JobStatus, outcome: JobOutcome) -> bool {
    let Some(job) = self.get(id) else {
      debug!(job_id = %id, "Finish for unknown job ignored");
      return false;
    };
    if !job.finish(status, outcome) {
      return false;
    }
    debug!(job_id = %id, ?status, "Job finished");
    self.schedule_cleanup(id.to_string(), job.generation);
    true
  }

  /// Remove the job after the cleanup delay, unless it was replaced meanwhile
  fn schedule_cleanup(&self, id: String, generation: u64) {
    let Ok(handle) = tokio::runtime::Handle::try_current() else {
      warn!(job_id = %id, "No runtime for job cleanup, job kept");
      return;
    };
    let jobs = self.jobs.clone();
    let delay = self.cleanup_delay;
    handle.spawn(async move {
      tokio::time::sleep(delay).await;
      if jobs.remove_if(&id, |_, job| job.generation == generation).is_some() {
        trace!(job_id = %id, generation, "Finished job removed");
      } else {
        trace!(job_id = %id, generation, "Job replaced before cleanup, kept");
      }
    });
  }

  /// Wait until the job finishes. Returns `None` for unknown jobs.
  pub async fn wait(&self, id: &str) -> Option<JobOutcome> {
    let mut rx = self.get(id)?.outcome.subscribe();
    let outcome = rx.wait_for(Option::is_some).await.ok()?;
    outcome.clone()
  }

  pub fn status(&self, id: &str) -> Option<JobStatus> {
    self.get(id).map(|j| j.status())
  }

  pub fn len(&self) -> usize {
    self.jobs.len()
  }

  pub fn is_empty(&self) -> bool {
    self.jobs.is_empty()
  }
}

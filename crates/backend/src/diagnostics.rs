//! Bounded log of recent service errors.

use std::{
  collections::VecDeque,
  sync::{Mutex, MutexGuard},
};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiagnosticEntry {
  pub at: DateTime<Utc>,
  /// Where the error surfaced, e.g. "index" or "generation"
  pub context: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub job_id: Option<String>,
  pub message: String,
}

/// Keeps the most recent `capacity` errors, oldest first
#[derive(Debug)]
pub struct Diagnostics {
  entries: Mutex<VecDeque<DiagnosticEntry>>,
  capacity: usize,
}

impl Diagnostics {
  pub fn new(capacity: usize) -> Self {
    let capacity = capacity.max(1);
    Self {
      entries: Mutex::new(VecDeque::with_capacity(capacity)),
      capacity,
    }
  }

  pub fn record(&self, context: &str, job_id: Option<&str>, message: impl Into<String>) {
    let entry = DiagnosticEntry {
      at: Utc::now(),
      context: context.to_string(),
      job_id: job_id.map(str::to_string),
      message: message.into(),
    };
    warn!(context, job_id, message = %entry.message, "Recorded service error");

    let mut entries = self.lock();
    if entries.len() == self.capacity {
      entries.pop_front();
    }
    entries.push_back(entry);
  }

  pub fn recent(&self) -> Vec<DiagnosticEntry> {
    self.lock().iter().cloned().collect()
  }

  pub fn len(&self) -> usize {
    self.lock().len()
  }

  pub fn is_empty(&self) -> bool {
    self.lock().is_empty()
  }

  pub fn clear(&self) {
    self.lock().clear();
  }

  fn lock(&self) -> MutexGuard<'_, VecDeque<DiagnosticEntry>> {
    self.entries.lock().unwrap_or_else(|e| e.into_inner())
  }
}

impl Default for Diagnostics {
  fn default() -> Self {
    Self::new(50)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_keeps_most_recent_entries() {
    let diagnostics = Diagnostics::new(3);
    for i in 0..5 {
      diagnostics.record("index", Some("job"), format!("error {}", i));
    }

    let messages: Vec<_> = diagnostics.recent().into_iter().map(|e| e.message).collect();
    assert_eq!(messages, vec!["error 2", "error 3", "error 4"]);
  }

  #[test]
  fn test_clear_and_zero_capacity() {
    let diagnostics = Diagnostics::new(0);
    diagnostics.record("generation", None, "a");
    diagnostics.record("generation", None, "b");
    assert_eq!(diagnostics.len(), 1);
    assert_eq!(diagnostics.recent()[0].job_id, None);

    diagnostics.clear();
    assert!(diagnostics.is_empty());
  }
}

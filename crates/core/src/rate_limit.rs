// Token-budget limiter with a sliding 60 second window
//
// Tracks tokens consumed per credential identity and answers whether a
// request of a given estimated size fits under a per-minute budget. When it
// does not, the limiter computes how long until enough old usage ages out.
//
// Usage is recorded after a request completes, with the real token count
// reported by the provider (or the estimate when none is reported).

use std::{
  collections::VecDeque,
  sync::{Arc, Mutex},
  time::Duration,
};

use dashmap::DashMap;
use tokio::time::{Instant, sleep};
use tracing::{debug, trace};

use crate::credentials::PoolError;

/// Length of the sliding window
pub const WINDOW: Duration = Duration::from_secs(60);

/// Result of an allowance check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Allowance {
  pub allowed: bool,
  /// Time until the request would fit (zero when allowed)
  pub wait: Duration,
  /// Tokens counted inside the window at the time of the check
  pub current_usage: u64,
}

/// Usage records for one credential
#[derive(Debug, Default)]
struct UsageWindow {
  /// (timestamp, tokens), oldest first
  entries: VecDeque<(Instant, u64)>,
  total: u64,
}

impl UsageWindow {
  /// Drop entries that are no longer inside the window
  fn prune(&mut self, now: Instant, window: Duration) {
    let before = self.entries.len();
    while let Some(&(ts, tokens)) = self.entries.front() {
      if ts + window <= now {
        self.entries.pop_front();
        self.total -= tokens;
      } else {
        break;
      }
    }
    let pruned = before - self.entries.len();
    if pruned > 0 {
      trace!(pruned, remaining = self.entries.len(), total = self.total, "Pruned expired token usage");
    }
  }
}

/// Sliding-window token limiter keyed by credential identity.
#[derive(Debug)]
pub struct TokenBudgetLimiter {
  windows: DashMap<String, Arc<Mutex<UsageWindow>>>,
  window: Duration,
}

impl Default for TokenBudgetLimiter {
  fn default() -> Self {
    Self::new()
  }
}

impl TokenBudgetLimiter {
  pub fn new() -> Self {
    Self::with_window(WINDOW)
  }

  /// Create a limiter with a custom window length
  pub fn with_window(window: Duration) -> Self {
    Self {
      windows: DashMap::new(),
      window,
    }
  }

  fn window_for(&self, id: &str) -> Arc<Mutex<UsageWindow>> {
    self.windows.entry(id.to_string()).or_default().clone()
  }

  /// Check whether `estimated` more tokens fit under `limit`.
  pub fn check_allowance(&self, id: &str, estimated: u64, limit: u64) -> Allowance {
    let now = Instant::now();
    let window = self.window_for(id);
    let mut usage = window.lock().unwrap_or_else(|e| e.into_inner());
    usage.prune(now, self.window);

    let current_usage = usage.total;
    let projected = current_usage + estimated;
    if projected <= limit {
      return Allowance {
        allowed: true,
        wait: Duration::ZERO,
        current_usage,
      };
    }

    // Find the oldest entry whose expiry frees enough tokens
    let deficit = projected - limit;
    let mut freed = 0u64;
    let mut wait = self.window;
    for &(ts, tokens) in &usage.entries {
      freed += tokens;
      if freed >= deficit {
        wait = (ts + self.window).saturating_duration_since(now);
        break;
      }
    }

    debug!(
      id,
      current_usage,
      estimated,
      limit,
      wait_ms = wait.as_millis(),
      "Token budget exceeded"
    );

    Allowance {
      allowed: false,
      wait,
      current_usage,
    }
  }

  /// Record tokens actually consumed by a completed request
  pub fn record_usage(&self, id: &str, tokens: u64) {
    let now = Instant::now();
    let window = self.window_for(id);
    let mut usage = window.lock().unwrap_or_else(|e| e.into_inner());
    usage.prune(now, self.window);
    usage.entries.push_back((now, tokens));
    usage.total += tokens;
    trace!(id, tokens, total = usage.total, "Recorded token usage");
  }

  /// Tokens currently counted inside the window
  pub fn usage(&self, id: &str) -> u64 {
    let Some(window) = self.windows.get(id).map(|w| w.clone()) else {
      return 0;
    };
    let mut usage = window.lock().unwrap_or_else(|e| e.into_inner());
    usage.prune(Instant::now(), self.window);
    usage.total
  }

  /// Sleep until `estimated` tokens fit, giving up when the required wait
  /// exceeds `max_wait`.
  ///
  /// A request larger than the whole budget is let through once the window
  /// is empty, so it cannot stall forever.
  pub async fn wait_for_allowance(
    &self,
    id: &str,
    estimated: u64,
    limit: u64,
    max_wait: Duration,
  ) -> Result<(), PoolError> {
    let start = Instant::now();
    loop {
      let allowance = self.check_allowance(id, estimated, limit);
      if allowance.allowed || (allowance.current_usage == 0 && estimated > limit) {
        return Ok(());
      }

      if start.elapsed() + allowance.wait > max_wait {
        return Err(PoolError::BudgetExceeded {
          id: id.to_string(),
          retry_after: allowance.wait,
        });
      }

      debug!(id, wait_ms = allowance.wait.as_millis(), "Waiting for token budget");
      sleep(allowance.wait).await;
    }
  }
}

/// A limiter paired with one budget, applied per credential identity
#[derive(Debug, Clone)]
pub struct BudgetGate {
  pub limiter: Arc<TokenBudgetLimiter>,
  pub tokens_per_minute: u64,
  pub max_wait: Duration,
}

impl BudgetGate {
  pub fn new(limiter: Arc<TokenBudgetLimiter>, tokens_per_minute: u64, max_wait: Duration) -> Self {
    Self {
      limiter,
      tokens_per_minute,
      max_wait,
    }
  }

  /// Wait until `estimated` tokens fit for `id`
  pub async fn admit(&self, id: &str, estimated: u64) -> Result<(), PoolError> {
    self
      .limiter
      .wait_for_allowance(id, estimated, self.tokens_per_minute, self.max_wait)
      .await
  }

  pub fn record(&self, id: &str, tokens: u64) {
    self.limiter.record_usage(id, tokens);
  }
}

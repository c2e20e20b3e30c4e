//! Rotating credential pools with per-credential cooldown.
//!
//! A pool hands out API credentials round-robin and skips credentials that
//! were recently rate limited. It never waits: when every credential is
//! cooling down, `acquire` returns `None` and the caller reports
//! `time_until_available` upstream.
//!
//! Pools live in a [`PoolRegistry`] keyed by a logical pool id
//! ("embeddings", "generation-openai", ...). Concurrent jobs that use the
//! same pool id share rotation state and cooldowns.

use std::{
  collections::HashMap,
  sync::{Arc, Mutex, MutexGuard},
  time::Duration,
};

use dashmap::DashMap;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Default time a rate-limited credential is excluded from rotation
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(30);

/// Errors raised by credential pools and token budgets
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PoolError {
  #[error("Credential pool '{0}' has no credentials configured")]
  Empty(String),
  #[error("All credentials in pool '{pool}' are cooling down, retry in {}s", retry_after.as_secs().max(1))]
  AllCredentialsExhausted { pool: String, retry_after: Duration },
  #[error("Token budget for '{id}' exceeded, retry in {}s", retry_after.as_secs().max(1))]
  BudgetExceeded { id: String, retry_after: Duration },
}

impl PoolError {
  /// Suggested wait before the operation can succeed, if known
  pub fn retry_after(&self) -> Option<Duration> {
    match self {
      Self::Empty(_) => None,
      Self::AllCredentialsExhausted { retry_after, .. } | Self::BudgetExceeded { retry_after, .. } => {
        Some(*retry_after)
      }
    }
  }
}

/// An API credential and a display label safe to log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialEntry {
  pub secret: String,
  pub label: String,
}

impl CredentialEntry {
  pub fn new(secret: impl Into<String>, label: impl Into<String>) -> Self {
    Self {
      secret: secret.into(),
      label: label.into(),
    }
  }

  /// Build entries from bare secrets, labelled `key-0`, `key-1`, ...
  pub fn from_secrets<I, S>(secrets: I) -> Vec<Self>
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    secrets
      .into_iter()
      .enumerate()
      .map(|(i, secret)| Self::new(secret, format!("key-{}", i)))
      .collect()
  }
}

/// A credential handed out by [`CredentialPool::acquire`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcquiredCredential {
  pub secret: String,
  pub label: String,
  /// Position in the pool, used for `mark_cooldown`
  pub index: usize,
}

#[derive(Debug, Default)]
struct PoolState {
  /// index -> cooldown expiry
  cooldowns: HashMap<usize, Instant>,
  last_used: Option<usize>,
}

/// Round-robin credential pool
#[derive(Debug)]
pub struct CredentialPool {
  id: String,
  entries: Vec<CredentialEntry>,
  cooldown: Duration,
  state: Mutex<PoolState>,
}

impl CredentialPool {
  pub fn new(id: impl Into<String>, entries: Vec<CredentialEntry>, cooldown: Duration) -> Result<Self, PoolError> {
    let id = id.into();
    if entries.is_empty() {
      return Err(PoolError::Empty(id));
    }
    Ok(Self {
      id,
      entries,
      cooldown,
      state: Mutex::new(PoolState::default()),
    })
  }

  pub fn id(&self) -> &str {
    &self.id
  }

  pub fn cooldown(&self) -> Duration {
    self.cooldown
  }

  /// Number of credentials in the pool
  pub fn count(&self) -> usize {
    self.entries.len()
  }

  fn state(&self) -> MutexGuard<'_, PoolState> {
    // A poisoned lock only means another task panicked mid-update; the
    // state itself is always consistent between statements.
    self.state.lock().unwrap_or_else(|e| e.into_inner())
  }

  fn same_secrets(&self, entries: &[CredentialEntry]) -> bool {
    self.entries.len() == entries.len() && self.entries.iter().zip(entries).all(|(a, b)| a.secret == b.secret)
  }

  /// Hand out the next available credential.
  ///
  /// Scans from the position after the last handed-out credential, wrapping
  /// once. The previously used credential is only returned again when no
  /// other credential is available.
  pub fn acquire(&self) -> Option<AcquiredCredential> {
    let now = Instant::now();
    let mut state = self.state();
    let len = self.entries.len();
    let start = state.last_used.map(|i| (i + 1) % len).unwrap_or(0);

    for offset in 0..len {
      let index = (start + offset) % len;
      let available = state.cooldowns.get(&index).is_none_or(|expiry| *expiry <= now);
      if available {
        state.cooldowns.remove(&index);
        state.last_used = Some(index);
        let entry = &self.entries[index];
        return Some(AcquiredCredential {
          secret: entry.secret.clone(),
          label: entry.label.clone(),
          index,
        });
      }
    }

    debug!(pool = %self.id, size = len, "No credential available, all cooling down");
    None
  }

  /// Exclude a credential from rotation for the cooldown duration.
  ///
  /// Always restarts the cooldown from now, even when a cooldown is already
  /// pending.
  pub fn mark_cooldown(&self, index: usize) {
    let Some(entry) = self.entries.get(index) else {
      warn!(pool = %self.id, index, "Ignoring cooldown for unknown credential index");
      return;
    };
    let expiry = Instant::now() + self.cooldown;
    self.state().cooldowns.insert(index, expiry);
    info!(
      pool = %self.id,
      credential = %entry.label,
      cooldown_ms = self.cooldown.as_millis(),
      "Credential rate limited, cooling down"
    );
  }

  /// Time until at least one credential can be acquired (zero if one can now)
  pub fn time_until_available(&self) -> Duration {
    let now = Instant::now();
    let state = self.state();
    let mut shortest: Option<Duration> = None;

    for index in 0..self.entries.len() {
      let remaining = match state.cooldowns.get(&index) {
        Some(expiry) if *expiry > now => *expiry - now,
        _ => return Duration::ZERO,
      };
      shortest = Some(shortest.map_or(remaining, |s| s.min(remaining)));
    }

    shortest.unwrap_or(Duration::ZERO)
  }

  /// Number of credentials currently cooling down
  pub fn count_in_cooldown(&self) -> usize {
    let now = Instant::now();
    self.state().cooldowns.values().filter(|expiry| **expiry > now).count()
  }

  /// The error to report when `acquire` returned `None`
  pub fn exhausted_error(&self) -> PoolError {
    PoolError::AllCredentialsExhausted {
      pool: self.id.clone(),
      retry_after: self.time_until_available(),
    }
  }
}

/// Process-wide map of credential pools, keyed by logical pool id.
///
/// Registries are plain values so tests can create isolated instances.
#[derive(Debug)]
pub struct PoolRegistry {
  pools: DashMap<String, Arc<CredentialPool>>,
  cooldown: Duration,
}

impl Default for PoolRegistry {
  fn default() -> Self {
    Self::new(DEFAULT_COOLDOWN)
  }
}

impl PoolRegistry {
  pub fn new(cooldown: Duration) -> Self {
    Self {
      pools: DashMap::new(),
      cooldown,
    }
  }

  /// Get the pool for `id`, creating it if needed.
  ///
  /// If a pool exists but was built from a different secret sequence it is
  /// replaced by a fresh pool: rotation position and cooldowns are cleared
  /// rather than merged.
  pub fn get_or_create(&self, id: &str, entries: Vec<CredentialEntry>) -> Result<Arc<CredentialPool>, PoolError> {
    if let Some(existing) = self.pools.get(id)
      && existing.same_secrets(&entries)
    {
      return Ok(existing.clone());
    }

    let pool = Arc::new(CredentialPool::new(id, entries, self.cooldown)?);
    if self.pools.insert(id.to_string(), pool.clone()).is_some() {
      info!(pool = %id, size = pool.count(), "Credential set changed, pool reset");
    } else {
      debug!(pool = %id, size = pool.count(), "Credential pool created");
    }
    Ok(pool)
  }

  pub fn get(&self, id: &str) -> Option<Arc<CredentialPool>> {
    self.pools.get(id).map(|p| p.clone())
  }

  /// Drop a pool. Holders of the `Arc` keep working with the old instance.
  pub fn evict(&self, id: &str) -> bool {
    self.pools.remove(id).is_some()
  }

  pub fn ids(&self) -> Vec<String> {
    let mut ids: Vec<String> = self.pools.iter().map(|e| e.key().clone()).collect();
    ids.sort();
    ids
  }
}

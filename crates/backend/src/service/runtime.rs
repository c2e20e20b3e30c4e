//! Process-wide service state.
//!
//! The runtime owns everything that outlives a single job: credential pools,
//! the token-budget limiter, the job registry, diagnostics and the storage
//! and provider backends. Jobs share pools by id, so concurrent jobs see one
//! rotation position and one set of cooldowns.

use std::{sync::Arc, time::Duration};

use dashmap::DashMap;
use docsmith_core::{
  BudgetGate, CredentialEntry, PoolRegistry, TokenBudgetLimiter,
  config::{Config, EMBEDDING_POOL_ID},
};
use embedding::{EmbeddingBackend, EmbeddingProvider, PooledEmbedder, RetryPolicy};
use index::{LocalSource, MemoryVectorStore, RepositorySource, Retriever, VectorStore};
use llm::{ChatBackend, ChatProvider, PooledGenerator};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::{diagnostics::Diagnostics, jobs::JobRegistry, service::ServiceError};

/// Pluggable backends behind the service
pub struct RuntimeComponents {
  pub source: Arc<dyn RepositorySource>,
  pub store: Arc<dyn VectorStore>,
  pub embedding: Arc<dyn EmbeddingProvider>,
  pub chat: Arc<dyn ChatProvider>,
}

impl RuntimeComponents {
  /// Local filesystem source, in-memory store and the configured providers
  pub fn from_config(config: &Config) -> Result<Self, ServiceError> {
    Ok(Self {
      source: Arc::new(LocalSource::from_config(&config.index)),
      store: Arc::new(MemoryVectorStore::new()),
      embedding: Arc::new(EmbeddingBackend::from_config(&config.embedding)?),
      chat: Arc::new(ChatBackend::from_config(&config.generation)?),
    })
  }
}

/// Snapshot of one credential pool
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PoolStatus {
  pub id: String,
  pub size: usize,
  pub in_cooldown: usize,
  pub labels: Vec<String>,
}

pub struct Runtime {
  pub(crate) config: Config,
  pub(crate) pools: PoolRegistry,
  pub(crate) limiter: Arc<TokenBudgetLimiter>,
  pub(crate) jobs: Arc<JobRegistry>,
  pub(crate) diagnostics: Arc<Diagnostics>,
  pub(crate) components: RuntimeComponents,
  embedding_credentials: Vec<CredentialEntry>,
  generation_credentials: Vec<CredentialEntry>,
  /// Cancellation tokens of running jobs
  pub(crate) active: DashMap<String, CancellationToken>,
}

impl Runtime {
  /// Build a runtime, resolving credentials from config and the environment
  pub fn new(config: Config, components: RuntimeComponents) -> Self {
    let embedding_credentials = config.embedding.credential_entries();
    let generation_credentials = config.generation.credential_entries();
    Self::with_credentials(config, components, embedding_credentials, generation_credentials)
  }

  pub fn with_credentials(
    config: Config,
    components: RuntimeComponents,
    embedding_credentials: Vec<CredentialEntry>,
    generation_credentials: Vec<CredentialEntry>,
  ) -> Self {
    info!(
      embedding = %components.embedding.name(),
      embedding_keys = embedding_credentials.len(),
      generation = %components.chat.name(),
      generation_keys = generation_credentials.len(),
      "Runtime initialized"
    );

    Self {
      pools: PoolRegistry::new(Duration::from_secs(config.pool.cooldown_secs)),
      limiter: Arc::new(TokenBudgetLimiter::new()),
      jobs: Arc::new(JobRegistry::new(Duration::from_secs(config.jobs.cleanup_delay_secs))),
      diagnostics: Arc::new(Diagnostics::new(config.jobs.diagnostics_capacity)),
      components,
      embedding_credentials,
      generation_credentials,
      active: DashMap::new(),
      config,
    }
  }

  pub fn from_config(config: Config) -> Result<Arc<Self>, ServiceError> {
    let components = RuntimeComponents::from_config(&config)?;
    Ok(Arc::new(Self::new(config, components)))
  }

  pub fn config(&self) -> &Config {
    &self.config
  }

  pub fn jobs(&self) -> &Arc<JobRegistry> {
    &self.jobs
  }

  pub fn diagnostics(&self) -> &Arc<Diagnostics> {
    &self.diagnostics
  }

  pub fn pools(&self) -> &PoolRegistry {
    &self.pools
  }

  pub fn limiter(&self) -> &Arc<TokenBudgetLimiter> {
    &self.limiter
  }

  pub fn store(&self) -> &Arc<dyn VectorStore> {
    &self.components.store
  }

  fn budget_gate(&self, tokens_per_minute: Option<u64>) -> Option<BudgetGate> {
    tokens_per_minute.map(|tpm| {
      BudgetGate::new(
        self.limiter.clone(),
        tpm,
        Duration::from_secs(self.config.pool.max_budget_wait_secs),
      )
    })
  }

  /// Pooled embedder over the shared `embeddings` pool
  pub fn embedder(&self) -> Result<Arc<PooledEmbedder>, ServiceError> {
    let pool = self
      .pools
      .get_or_create(EMBEDDING_POOL_ID, self.embedding_credentials.clone())?;
    let mut embedder = PooledEmbedder::new(self.components.embedding.clone(), pool)
      .with_retry(RetryPolicy::from_config(&self.config.embedding))
      .with_concurrency(self.config.index.embed_concurrency);
    if let Some(budget) = self.budget_gate(self.config.embedding.tokens_per_minute) {
      embedder = embedder.with_budget(budget);
    }
    Ok(Arc::new(embedder))
  }

  /// Pooled generator over the configured provider's pool
  pub fn generator(&self) -> Result<PooledGenerator, ServiceError> {
    let pool = self
      .pools
      .get_or_create(&self.config.generation.pool_id(), self.generation_credentials.clone())?;
    let mut generator =
      PooledGenerator::new(self.components.chat.clone(), pool).with_config(&self.config.generation);
    if let Some(budget) = self.budget_gate(self.config.generation.tokens_per_minute) {
      generator = generator.with_budget(budget);
    }
    Ok(generator)
  }

  pub fn retriever(&self) -> Result<Retriever, ServiceError> {
    Ok(Retriever::new(self.embedder()?, self.components.store.clone()))
  }

  /// Request cancellation of a running job.
  ///
  /// Returns false if the job is unknown or already finished.
  pub fn cancel(&self, job_id: &str) -> bool {
    match self.active.get(job_id) {
      Some(token) => {
        info!(job_id, "Cancelling job");
        token.cancel();
        true
      }
      None => {
        debug!(job_id, "Cancel requested for inactive job");
        false
      }
    }
  }

  /// Cancel every running job
  pub fn cancel_all(&self) -> usize {
    let mut cancelled = 0;
    for entry in self.active.iter() {
      entry.value().cancel();
      cancelled += 1;
    }
    cancelled
  }

  /// Register a running job and its cancellation token
  pub(crate) fn register_active(&self, job_id: &str) -> CancellationToken {
    let token = CancellationToken::new();
    self.jobs.create_job(job_id);
    self.active.insert(job_id.to_string(), token.clone());
    token
  }

  /// Move a finished job to its terminal state and log failures.
  ///
  /// Cancellation ends the job with the `Cancelled` sentinel and is not a diagnostic.
  pub(crate) fn finish_job(&self, job_id: &str, context: &str, result: Result<(), ServiceError>) {
    self.active.remove(job_id);
    match result {
      Ok(()) => {
        self.jobs.complete_job(job_id);
      }
      Err(e) if e.is_cancelled() => {
        self.jobs.cancel_job(job_id);
      }
      Err(e) => {
        self.diagnostics.record(context, Some(job_id), e.to_string());
        self.jobs.fail_job(job_id, e.to_string());
      }
    }
  }

  /// State of the embedding and generation pools. A pool without
  /// credentials is reported with size zero.
  pub fn pool_status(&self) -> Vec<PoolStatus> {
    let generation_pool = self.config.generation.pool_id();
    [
      (EMBEDDING_POOL_ID, &self.embedding_credentials),
      (generation_pool.as_str(), &self.generation_credentials),
    ]
    .into_iter()
    .map(|(id, entries)| {
      let in_cooldown = match self.pools.get_or_create(id, entries.clone()) {
        Ok(pool) => pool.count_in_cooldown(),
        Err(e) => {
          debug!(pool = %id, err = %e, "Pool unavailable");
          0
        }
      };
      PoolStatus {
        id: id.to_string(),
        size: entries.len(),
        in_cooldown,
        labels: entries.iter().map(|e| e.label.clone()).collect(),
      }
    })
    .collect()
  }
}

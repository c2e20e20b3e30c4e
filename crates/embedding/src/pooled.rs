// Pool-driven embedding with credential rotation
//
// Every request acquires a credential from the shared pool. A rate-limited
// credential is put in cooldown and the request retries with the next one;
// this loop has no count bound and ends when the pool reports every
// credential cooling down. Connection-level failures retry on the same path
// with linear backoff, a bounded number of times. Everything else fails the
// request.

use std::{sync::Arc, time::Duration};

use docsmith_core::{
  BudgetGate, CredentialPool, FailureKind,
  config::{EmbeddingConfig, IndexConfig},
  estimate_tokens,
};
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::provider::{EmbeddingError, EmbeddingMode, EmbeddingProvider};

/// Retry bounds for non-rate-limit failures
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
  pub max_network_retries: u32,
  /// Backoff before retry `n` is `backoff * n`
  pub backoff: Duration,
}

impl Default for RetryPolicy {
  fn default() -> Self {
    Self {
      max_network_retries: 3,
      backoff: Duration::from_secs(1),
    }
  }
}

impl RetryPolicy {
  pub fn from_config(config: &EmbeddingConfig) -> Self {
    Self {
      max_network_retries: config.max_network_retries,
      backoff: Duration::from_millis(config.backoff_ms),
    }
  }

  pub fn backoff_for_attempt(&self, attempt: u32) -> Duration {
    self.backoff * attempt
  }
}

pub struct PooledEmbedder {
  provider: Arc<dyn EmbeddingProvider>,
  pool: Arc<CredentialPool>,
  budget: Option<BudgetGate>,
  retry: RetryPolicy,
  /// Requests in flight when embedding a list of texts
  concurrency: usize,
}

impl PooledEmbedder {
  pub fn new(provider: Arc<dyn EmbeddingProvider>, pool: Arc<CredentialPool>) -> Self {
    Self {
      provider,
      pool,
      budget: None,
      retry: RetryPolicy::default(),
      concurrency: IndexConfig::default().embed_concurrency,
    }
  }

  pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
    self.retry = retry;
    self
  }

  pub fn with_budget(mut self, budget: BudgetGate) -> Self {
    self.budget = Some(budget);
    self
  }

  pub fn with_concurrency(mut self, concurrency: usize) -> Self {
    self.concurrency = concurrency.max(1);
    self
  }

  pub fn provider_name(&self) -> &str {
    self.provider.name()
  }

  pub fn model_id(&self) -> &str {
    self.provider.model_id()
  }

  pub fn pool(&self) -> &Arc<CredentialPool> {
    &self.pool
  }

  /// Embed one document chunk
  pub async fn embed_one(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
    self.embed_single(text, EmbeddingMode::Document).await
  }

  /// Embed a retrieval query
  pub async fn embed_query(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
    self.embed_single(text, EmbeddingMode::Query).await
  }

  /// Embed several documents, one pooled request per text, bounded concurrency.
  ///
  /// Results are in input order. The first failure fails the call.
  pub async fn embed_many(self: &Arc<Self>, texts: Vec<String>) -> Result<Vec<Vec<f32>>, EmbeddingError> {
    let tasks: Vec<_> = texts
      .into_iter()
      .map(|text| {
        let embedder = self.clone();
        move || async move { embedder.embed_one(&text).await }
      })
      .collect();
    docsmith_core::run_bounded(tasks, self.concurrency).await
  }

  async fn embed_single(&self, text: &str, mode: EmbeddingMode) -> Result<Vec<f32>, EmbeddingError> {
    let mut vectors = self.embed_texts(&[text], mode).await?;
    vectors
      .pop()
      .ok_or_else(|| EmbeddingError::InvalidResponse("provider returned no embedding".to_string()))
  }

  /// One logical request: acquire, gate, call, classify, repeat
  pub async fn embed_texts(&self, texts: &[&str], mode: EmbeddingMode) -> Result<Vec<Vec<f32>>, EmbeddingError> {
    let estimated: u64 = texts.iter().map(|t| estimate_tokens(t)).sum();
    let mut network_attempts = 0u32;
    let mut rotations = 0usize;

    loop {
      let Some(credential) = self.pool.acquire() else {
        let err = self.pool.exhausted_error();
        warn!(pool = %self.pool.id(), err = %err, "Embedding pool exhausted");
        return Err(err.into());
      };

      let budget_id = format!("{}/{}", self.pool.id(), credential.label);
      if let Some(budget) = &self.budget {
        budget.admit(&budget_id, estimated).await?;
      }

      match self.provider.embed(texts, mode, &credential.secret).await {
        Ok(embeddings) => {
          if let Some(budget) = &self.budget {
            let used = match embeddings.tokens {
              Some(reported) => {
                if reported != estimated {
                  debug!(reported, estimated, budget = %budget_id, "Provider usage differs from estimate");
                }
                reported
              }
              None => estimated,
            };
            budget.record(&budget_id, used);
          }
          if rotations > 0 || network_attempts > 0 {
            debug!(rotations, network_attempts, credential = %credential.label, "Embedding succeeded after retry");
          }
          return Ok(embeddings.vectors);
        }
        Err(e) => match e.failure_kind() {
          FailureKind::RateLimited => {
            self.pool.mark_cooldown(credential.index);
            rotations += 1;
            info!(
              credential = %credential.label,
              in_cooldown = self.pool.count_in_cooldown(),
              pool_size = self.pool.count(),
              "Rate limited, rotating credential"
            );
          }
          FailureKind::TransientNetwork | FailureKind::StreamParseGlitch
            if network_attempts < self.retry.max_network_retries =>
          {
            network_attempts += 1;
            let delay = self.retry.backoff_for_attempt(network_attempts);
            warn!(
              attempt = network_attempts,
              max_retries = self.retry.max_network_retries,
              backoff_ms = delay.as_millis(),
              err = %e,
              "Transient embedding failure, will retry"
            );
            sleep(delay).await;
          }
          kind => {
            warn!(?kind, credential = %credential.label, err = %e, "Embedding failed");
            return Err(e);
          }
        },
      }
    }
  }
}

// Pool-driven streaming generation
//
// Credentials rotate on rate limits and transient failures retry a bounded
// number of times, but only until the first fragment has been forwarded to
// the caller. After that a failure propagates so no text is ever sent twice.

use std::{sync::Arc, time::Duration};

use docsmith_core::{BudgetGate, CredentialPool, FailureKind, config::GenerationConfig};
use futures::StreamExt;
use tokio::{sync::mpsc, time::sleep};
use tracing::{debug, info, warn};

use crate::{
  ChatChunk, ChatMessage, ChatRequest, LlmError, TokenUsage,
  provider::{ChatProvider, Result},
};

/// Retry bounds for stream glitches and network failures
#[derive(Debug, Clone, Copy)]
pub struct GenerationRetry {
  pub max_retries: u32,
  pub backoff: Duration,
}

impl Default for GenerationRetry {
  fn default() -> Self {
    Self {
      max_retries: 2,
      backoff: Duration::from_secs(1),
    }
  }
}

pub struct PooledGenerator {
  provider: Arc<dyn ChatProvider>,
  pool: Arc<CredentialPool>,
  budget: Option<BudgetGate>,
  retry: GenerationRetry,
  max_output_tokens: u32,
  temperature: f32,
}

impl PooledGenerator {
  pub fn new(provider: Arc<dyn ChatProvider>, pool: Arc<CredentialPool>) -> Self {
    let defaults = GenerationConfig::default();
    Self {
      provider,
      pool,
      budget: None,
      retry: GenerationRetry::default(),
      max_output_tokens: defaults.max_output_tokens,
      temperature: defaults.temperature,
    }
  }

  /// Apply output limits and retry bounds from config
  pub fn with_config(mut self, config: &GenerationConfig) -> Self {
    self.retry = GenerationRetry {
      max_retries: config.max_retries,
      backoff: Duration::from_millis(config.backoff_ms),
    };
    self.max_output_tokens = config.max_output_tokens;
    self.temperature = config.temperature;
    self
  }

  pub fn with_retry(mut self, retry: GenerationRetry) -> Self {
    self.retry = retry;
    self
  }

  pub fn with_budget(mut self, budget: BudgetGate) -> Self {
    self.budget = Some(budget);
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

  /// Stream a completion, forwarding text fragments to `sink` as they arrive.
  ///
  /// Returns the reported token usage (or `None` when the provider sent none).
  pub async fn stream(
    &self,
    system: &str,
    messages: &[ChatMessage],
    sink: &mpsc::Sender<String>,
  ) -> Result<Option<TokenUsage>> {
    let request = ChatRequest {
      system: system.to_string(),
      messages: messages.to_vec(),
      max_tokens: self.max_output_tokens,
      temperature: self.temperature,
    };
    let estimated = request.estimated_tokens();
    let mut attempts = 0u32;

    loop {
      let Some(credential) = self.pool.acquire() else {
        let err = self.pool.exhausted_error();
        warn!(pool = %self.pool.id(), err = %err, "Generation pool exhausted");
        return Err(err.into());
      };

      let budget_id = format!("{}/{}", self.pool.id(), credential.label);
      if let Some(budget) = &self.budget {
        budget.admit(&budget_id, estimated).await?;
      }

      let mut forwarded = false;
      let result = self.attempt(&request, &credential.secret, sink, &mut forwarded).await;

      let err = match result {
        Ok(usage) => {
          if let Some(budget) = &self.budget {
            budget.record(&budget_id, usage.map(|u| u.total()).unwrap_or(estimated));
          }
          debug!(credential = %credential.label, ?usage, "Generation complete");
          return Ok(usage);
        }
        Err(e) => e,
      };

      let kind = err.failure_kind();
      if kind == FailureKind::RateLimited {
        self.pool.mark_cooldown(credential.index);
      }

      if forwarded {
        warn!(credential = %credential.label, ?kind, err = %err, "Generation failed after output started");
        return Err(err);
      }

      match kind {
        FailureKind::RateLimited => {
          info!(
            credential = %credential.label,
            in_cooldown = self.pool.count_in_cooldown(),
            "Rate limited, rotating credential"
          );
        }
        FailureKind::TransientNetwork | FailureKind::StreamParseGlitch if attempts < self.retry.max_retries => {
          attempts += 1;
          let delay = self.retry.backoff * attempts;
          warn!(
            attempt = attempts,
            max_retries = self.retry.max_retries,
            backoff_ms = delay.as_millis(),
            err = %err,
            "Retrying generation"
          );
          sleep(delay).await;
        }
        _ => {
          warn!(?kind, err = %err, "Generation failed");
          return Err(err);
        }
      }
    }
  }

  async fn attempt(
    &self,
    request: &ChatRequest,
    credential: &str,
    sink: &mpsc::Sender<String>,
    forwarded: &mut bool,
  ) -> Result<Option<TokenUsage>> {
    let mut stream = self.provider.stream_chat(request, credential).await?;
    let mut usage = None;

    while let Some(chunk) = stream.next().await {
      match chunk? {
        ChatChunk::Text(text) => {
          if text.is_empty() {
            continue;
          }
          sink.send(text).await.map_err(|_| LlmError::SinkClosed)?;
          *forwarded = true;
        }
        ChatChunk::Usage {
          input_tokens,
          output_tokens,
        } => {
          usage = Some(TokenUsage {
            input_tokens,
            output_tokens,
          });
        }
      }
    }

    if !*forwarded {
      return Err(LlmError::EmptyResponse);
    }
    Ok(usage)
  }

  /// Run a completion and collect the whole response
  pub async fn complete(&self, system: &str, messages: &[ChatMessage]) -> Result<String> {
    let (tx, mut rx) = mpsc::channel::<String>(64);
    let producer = async move {
      let result = self.stream(system, messages, &tx).await;
      drop(tx);
      result
    };
    let collector = async move {
      let mut text = String::new();
      while let Some(fragment) = rx.recv().await {
        text.push_str(&fragment);
      }
      text
    };

    let (result, text) = tokio::join!(producer, collector);
    result?;
    Ok(text)
  }
}

//! Shared fixtures for service-level tests.
//!
//! Providers here are deterministic and offline: embeddings are bags of
//! hashed words, and chat answers are scripted by prompt kind.

use std::{
  collections::HashSet,
  sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
  },
  time::Duration,
};

use async_trait::async_trait;
use docsmith_core::{CredentialEntry, SourceFile, config::Config};
use embedding::{EmbeddingError, EmbeddingMode, EmbeddingProvider, Embeddings};
use futures::{StreamExt, stream};
use index::{MemorySource, MemoryVectorStore};
use llm::{ChatChunk, ChatProvider, ChatRequest, ChatStream, LlmError};

use crate::{
  jobs::{JobEvent, JobOutcome},
  service::{Runtime, RuntimeComponents},
};

pub const REPO: &str = "acme/widgets";
const DIMENSIONS: usize = 16;

/// Embeds text as a normalized bag of hashed words.
///
/// Secrets listed in `rate_limited` are answered with HTTP 429.
#[derive(Default)]
pub struct HashEmbedder {
  pub calls: AtomicUsize,
  pub rate_limited: HashSet<String>,
  /// Simulated latency per request
  pub delay: Option<Duration>,
}

#[async_trait]
impl EmbeddingProvider for HashEmbedder {
  fn name(&self) -> &str {
    "hash"
  }

  fn model_id(&self) -> &str {
    "hash-16"
  }

  fn dimensions(&self) -> usize {
    DIMENSIONS
  }

  async fn embed(
    &self,
    texts: &[&str],
    _mode: EmbeddingMode,
    credential: &str,
  ) -> Result<Embeddings, EmbeddingError> {
    self.calls.fetch_add(1, Ordering::SeqCst);
    if let Some(delay) = self.delay {
      tokio::time::sleep(delay).await;
    }
    if self.rate_limited.contains(credential) {
      return Err(EmbeddingError::Http {
        provider: "hash",
        status: 429,
        message: "Too Many Requests".into(),
      });
    }
    Ok(Embeddings::new(texts.iter().map(|t| hash_vector(t)).collect()))
  }
}

fn hash_vector(text: &str) -> Vec<f32> {
  let mut vector = vec![0.0f32; DIMENSIONS];
  for word in text.split_whitespace() {
    let bucket = word
      .to_lowercase()
      .bytes()
      .fold(0usize, |acc, b| acc.wrapping_mul(31).wrapping_add(b as usize));
    vector[bucket % DIMENSIONS] += 1.0;
  }
  vector
}

/// How the scripted chat answers section prompts
#[derive(Clone)]
pub enum SectionReply {
  Fragments(Vec<&'static str>),
  Reject(u16),
}

/// Answers outline prompts with `outline` and section prompts with `section`
pub struct ScriptedChat {
  pub outline: &'static str,
  pub section: SectionReply,
  pub requests: AtomicUsize,
}

impl ScriptedChat {
  pub fn new(outline: &'static str, section: SectionReply) -> Self {
    Self {
      outline,
      section,
      requests: AtomicUsize::new(0),
    }
  }
}

#[async_trait]
impl ChatProvider for ScriptedChat {
  fn name(&self) -> &str {
    "scripted"
  }

  fn model_id(&self) -> &str {
    "scripted-1"
  }

  async fn stream_chat(&self, request: &ChatRequest, _credential: &str) -> llm::Result<ChatStream> {
    self.requests.fetch_add(1, Ordering::SeqCst);
    let prompt = request.messages.last().map(|m| m.content.as_str()).unwrap_or_default();

    let chunks: Vec<llm::Result<ChatChunk>> = if prompt.contains("Reply with JSON only") {
      vec![Ok(ChatChunk::Text(self.outline.to_string()))]
    } else {
      match &self.section {
        SectionReply::Fragments(parts) => parts.iter().map(|p| Ok(ChatChunk::Text(p.to_string()))).collect(),
        SectionReply::Reject(status) => {
          return Err(LlmError::Http {
            provider: "scripted",
            status: *status,
            message: "rejected".into(),
          });
        }
      }
    };
    Ok(stream::iter(chunks).boxed())
  }
}

pub const TWO_SECTION_OUTLINE: &str =
  r#"{"sections":[{"title":"Overview","focus":"what widgets do"},{"title":"Storage","focus":"how data is kept"}]}"#;

pub fn repository_files() -> Vec<SourceFile> {
  let words = |prefix: &str, n: usize| (0..n).map(|i| format!("{}{}", prefix, i)).collect::<Vec<_>>().join(" ");
  vec![
    SourceFile::new("README.md", format!("widgets overview {}", words("intro", 40))),
    SourceFile::new("src/store.rs", format!("storage engine {}", words("store", 60))),
    SourceFile::new("src/cli.rs", format!("command line {}", words("cli", 30))),
  ]
}

pub fn test_config() -> Config {
  let mut config = Config::default();
  config.index.chunk_size = 20;
  config.index.chunk_overlap = 5;
  config.index.embed_batch_size = 4;
  config.index.embed_concurrency = 2;
  config.generation.context_chunks = 3;
  config
}

pub struct TestRuntime {
  pub runtime: Arc<Runtime>,
  pub embedder: Arc<HashEmbedder>,
  pub chat: Arc<ScriptedChat>,
}

pub fn runtime_with(
  config: Config,
  embedder: HashEmbedder,
  chat: ScriptedChat,
  embedding_keys: &[&str],
) -> TestRuntime {
  let embedder = Arc::new(embedder);
  let chat = Arc::new(chat);
  let components = RuntimeComponents {
    source: Arc::new(MemorySource::new().with_repository(REPO, "main", repository_files())),
    store: Arc::new(MemoryVectorStore::new()),
    embedding: embedder.clone(),
    chat: chat.clone(),
  };
  let runtime = Runtime::with_credentials(
    config,
    components,
    CredentialEntry::from_secrets(embedding_keys.iter().copied()),
    CredentialEntry::from_secrets(["chat-key"]),
  );
  TestRuntime {
    runtime: Arc::new(runtime),
    embedder,
    chat,
  }
}

pub fn test_runtime() -> TestRuntime {
  runtime_with(
    test_config(),
    HashEmbedder::default(),
    ScriptedChat::new(TWO_SECTION_OUTLINE, SectionReply::Fragments(vec!["Widgets ", "are ", "great."])),
    &["embed-key"],
  )
}

/// Wait for a job and return its outcome with the full event log
pub async fn finish(runtime: &Runtime, job_id: &str) -> (JobOutcome, Vec<JobEvent>) {
  let outcome = runtime.jobs().wait(job_id).await.expect("job exists");
  let events = runtime.jobs().buffered_events(job_id).expect("job exists");
  (outcome, events)
}

/// Index the test repository and wait for completion
pub async fn index_repository(runtime: &Arc<Runtime>) {
  let job_id = runtime.start_index(REPO, false).expect("start index");
  let (outcome, _) = finish(runtime, &job_id).await;
  assert_eq!(outcome, JobOutcome::Complete);
}

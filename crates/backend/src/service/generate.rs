//! Documentation generation jobs.
//!
//! Generation plans an outline from retrieved context, then writes each
//! section in order. Every section is announced with a `Section` event and
//! its text streams into the job as `Content` fragments.

use std::sync::Arc;

use docsmith_core::RepoRef;
use index::{Retriever, format_context};
use llm::{
  ChatMessage, OutlineSection, PooledGenerator, plan_outline,
  prompts::{DOCS_SYSTEM_PROMPT, build_section_prompt},
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span};
use uuid::Uuid;

use crate::{
  jobs::JobEvent,
  service::{Runtime, ServiceError},
};

/// Query used to gather outline context when no topic is given
const OVERVIEW_QUERY: &str = "project overview, architecture, main modules and entry points";

/// Fragments buffered between the generator and the job log
const FRAGMENT_BUFFER: usize = 64;

#[derive(Debug, Clone, Default)]
pub struct GenerationRequest {
  /// Narrow the documentation to one subject
  pub topic: Option<String>,
}

impl GenerationRequest {
  pub fn with_topic(topic: impl Into<String>) -> Self {
    Self {
      topic: Some(topic.into()),
    }
  }
}

/// Everything one generation job needs, detached from the runtime
struct GenerationJob {
  job_id: String,
  repo: RepoRef,
  request: GenerationRequest,
  retriever: Retriever,
  generator: PooledGenerator,
  context_chunks: usize,
  cancel: CancellationToken,
}

impl Runtime {
  /// Start generating documentation for an indexed repository.
  ///
  /// Fails with `NotIndexed` before any job is created when the repository
  /// has not been indexed.
  pub async fn start_generation(
    self: &Arc<Self>,
    source: &str,
    request: GenerationRequest,
  ) -> Result<String, ServiceError> {
    let prepared = self.prepare_generation(source).await;
    let (repo, retriever, generator) = prepared.inspect_err(|e| {
      self.diagnostics.record("generation", None, e.to_string());
    })?;

    let job_id = format!("docs-{}", Uuid::now_v7());
    let cancel = self.register_active(&job_id);
    let job = GenerationJob {
      job_id: job_id.clone(),
      repo,
      request,
      retriever,
      generator,
      context_chunks: self.config.generation.context_chunks,
      cancel,
    };

    let runtime = self.clone();
    let span = info_span!("generation_job", job_id = %job_id, repo = %job.repo);
    tokio::spawn(
      async move {
        let result = job.run(&runtime).await;
        runtime.finish_job(&job.job_id, "generation", result);
      }
      .instrument(span),
    );

    Ok(job_id)
  }

  async fn prepare_generation(&self, source: &str) -> Result<(RepoRef, Retriever, PooledGenerator), ServiceError> {
    let repo = RepoRef::parse(source).ok_or_else(|| ServiceError::InvalidSource(source.to_string()))?;
    if !self.components.store.is_indexed(&repo).await? {
      return Err(ServiceError::NotIndexed(repo.to_string()));
    }
    Ok((repo, self.retriever()?, self.generator()?))
  }
}

impl GenerationJob {
  async fn run(&self, runtime: &Runtime) -> Result<(), ServiceError> {
    let repo_name = self.repo.to_string();
    let topic = self.request.topic.as_deref();

    self.checkpoint()?;
    let hits = self
      .retriever
      .search(&self.repo, topic.unwrap_or(OVERVIEW_QUERY), self.context_chunks)
      .await?;
    let outline = plan_outline(&self.generator, &repo_name, topic, &format_context(&hits)).await?;
    info!(sections = outline.sections.len(), "Outline planned");

    for section in &outline.sections {
      self.checkpoint()?;
      runtime.jobs.push_event(
        &self.job_id,
        JobEvent::Section {
          title: section.title.clone(),
        },
      );
      self.write_section(runtime, &repo_name, section).await?;
    }
    Ok(())
  }

  async fn write_section(
    &self,
    runtime: &Runtime,
    repo_name: &str,
    section: &OutlineSection,
  ) -> Result<(), ServiceError> {
    let query = if section.focus.is_empty() {
      section.title.clone()
    } else {
      format!("{}: {}", section.title, section.focus)
    };
    let hits = self.retriever.search(&self.repo, &query, self.context_chunks).await?;
    let prompt = build_section_prompt(repo_name, section, &format_context(&hits));
    let messages = [ChatMessage::user(prompt)];

    let (tx, mut rx) = mpsc::channel::<String>(FRAGMENT_BUFFER);
    let producer = async move {
      let result = self.generator.stream(DOCS_SYSTEM_PROMPT, &messages, &tx).await;
      drop(tx);
      result
    };
    let forward = async {
      let mut fragments = 0usize;
      while let Some(text) = rx.recv().await {
        fragments += 1;
        runtime.jobs.push_event(&self.job_id, JobEvent::Content { text });
      }
      fragments
    };

    let (result, fragments) = tokio::join!(producer, forward);
    let usage = result?;
    debug!(section = %section.title, fragments, ?usage, "Section written");
    Ok(())
  }

  fn checkpoint(&self) -> Result<(), ServiceError> {
    if self.cancel.is_cancelled() {
      return Err(ServiceError::Cancelled);
    }
    Ok(())
  }
}

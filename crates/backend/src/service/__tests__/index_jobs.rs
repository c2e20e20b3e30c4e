//! Index jobs driven through the runtime: progress forwarding, replay,
//! cancellation and credential rotation.

#[cfg(test)]
mod tests {
  use std::{collections::HashSet, sync::atomic::Ordering, time::Duration};

  use docsmith_core::{IndexProgress, RepoRef};
  use pretty_assertions::assert_eq;

  use crate::{
    jobs::{JobEvent, JobOutcome, JobStatus},
    service::{
      ServiceError,
      __tests__::helpers::{
        HashEmbedder, REPO, ScriptedChat, SectionReply, TWO_SECTION_OUTLINE, finish, runtime_with, test_config,
        test_runtime,
      },
    },
  };

  fn phases(events: &[JobEvent]) -> Vec<&'static str> {
    events
      .iter()
      .map(|e| match e {
        JobEvent::Progress(p) => p.phase(),
        JobEvent::Done => "done",
        JobEvent::Failed { .. } => "failed",
        JobEvent::Cancelled => "job_cancelled",
        _ => "other",
      })
      .collect()
  }

  #[tokio::test]
  async fn test_index_job_forwards_progress_and_completes() {
    let t = test_runtime();
    let job_id = t.runtime.start_index(REPO, false).unwrap();

    let (outcome, events) = finish(&t.runtime, &job_id).await;
    assert_eq!(outcome, JobOutcome::Complete);
    assert_eq!(
      phases(&events),
      vec!["clone", "extract", "chunk", "embed", "embed", "embed", "store", "complete", "done"]
    );
    assert_eq!(
      events[3],
      JobEvent::Progress(IndexProgress::Embed { current: 4, total: 9 })
    );

    let repo = RepoRef::new("acme", "widgets");
    assert_eq!(t.runtime.store().chunk_count(&repo).await.unwrap(), 9);
    assert_eq!(t.runtime.jobs().status(&job_id), Some(JobStatus::Complete));
    assert!(t.runtime.diagnostics().is_empty());
  }

  #[tokio::test]
  async fn test_late_attach_sees_every_event_once() {
    let t = test_runtime();
    let job_id = t.runtime.start_index(REPO, false).unwrap();

    // Attach while the job may still be running
    let (replay, mut live) = t.runtime.jobs().attach(&job_id).unwrap();
    let mut seen = replay;
    while let Some(event) = live.recv().await {
      seen.push(event);
    }

    assert_eq!(seen, t.runtime.jobs().buffered_events(&job_id).unwrap());
    assert_eq!(seen.iter().filter(|e| **e == JobEvent::Done).count(), 1);
    assert_eq!(
      seen
        .iter()
        .filter(|e| matches!(e, JobEvent::Progress(IndexProgress::Complete { .. })))
        .count(),
      1
    );
  }

  #[tokio::test]
  async fn test_second_index_is_skipped_unless_forced() {
    let t = test_runtime();
    let first = t.runtime.start_index(REPO, false).unwrap();
    finish(&t.runtime, &first).await;
    let calls = t.embedder.calls.load(Ordering::SeqCst);

    let second = t.runtime.start_index(REPO, false).unwrap();
    let (outcome, events) = finish(&t.runtime, &second).await;
    assert_eq!(outcome, JobOutcome::Complete);
    assert_eq!(phases(&events), vec!["complete", "done"]);
    assert_eq!(t.embedder.calls.load(Ordering::SeqCst), calls);

    let forced = t.runtime.start_index(REPO, true).unwrap();
    finish(&t.runtime, &forced).await;
    assert_eq!(t.embedder.calls.load(Ordering::SeqCst), calls * 2);
  }

  #[tokio::test(start_paused = true)]
  async fn test_cancel_stops_at_batch_boundary() {
    let mut config = test_config();
    config.index.embed_batch_size = 1;
    config.index.embed_concurrency = 1;
    let embedder = HashEmbedder {
      delay: Some(Duration::from_secs(1)),
      ..Default::default()
    };
    let t = runtime_with(
      config,
      embedder,
      ScriptedChat::new(TWO_SECTION_OUTLINE, SectionReply::Fragments(vec![])),
      &["embed-key"],
    );

    let job_id = t.runtime.start_index(REPO, false).unwrap();
    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert!(t.runtime.cancel(&job_id));

    let (outcome, events) = finish(&t.runtime, &job_id).await;
    assert_eq!(outcome, JobOutcome::Cancelled);
    assert_eq!(phases(&events).last(), Some(&"job_cancelled"));
    assert!(events.contains(&JobEvent::Progress(IndexProgress::Cancelled)));
    assert_eq!(t.runtime.jobs().status(&job_id), Some(JobStatus::Error));

    // The request in flight when cancel arrived still finished
    assert_eq!(t.embedder.calls.load(Ordering::SeqCst), 2);
    assert!(!t.runtime.store().is_indexed(&RepoRef::new("acme", "widgets")).await.unwrap());
    assert!(t.runtime.diagnostics().is_empty());
    assert!(!t.runtime.cancel(&job_id));
  }

  #[tokio::test]
  async fn test_rate_limited_key_rotates_and_indexing_succeeds() {
    let embedder = HashEmbedder {
      rate_limited: HashSet::from(["bad-key".to_string()]),
      ..Default::default()
    };
    let t = runtime_with(
      test_config(),
      embedder,
      ScriptedChat::new(TWO_SECTION_OUTLINE, SectionReply::Fragments(vec![])),
      &["bad-key", "good-key"],
    );

    let job_id = t.runtime.start_index(REPO, false).unwrap();
    let (outcome, _) = finish(&t.runtime, &job_id).await;
    assert_eq!(outcome, JobOutcome::Complete);

    let embedding_pool = &t.runtime.pool_status()[0];
    assert_eq!(embedding_pool.id, "embeddings");
    assert_eq!(embedding_pool.size, 2);
    assert_eq!(embedding_pool.in_cooldown, 1);
  }

  #[tokio::test]
  async fn test_all_keys_rate_limited_fails_job() {
    let embedder = HashEmbedder {
      rate_limited: HashSet::from(["only-key".to_string()]),
      ..Default::default()
    };
    let t = runtime_with(
      test_config(),
      embedder,
      ScriptedChat::new(TWO_SECTION_OUTLINE, SectionReply::Fragments(vec![])),
      &["only-key"],
    );

    let job_id = t.runtime.start_index(REPO, false).unwrap();
    let (outcome, events) = finish(&t.runtime, &job_id).await;
    assert!(matches!(outcome, JobOutcome::Failed(message) if message.contains("cooling down")));
    assert!(matches!(events.iter().rev().nth(1), Some(JobEvent::Progress(IndexProgress::Error { .. }))));

    let recorded = t.runtime.diagnostics().recent();
    assert_eq!(recorded.len(), 1);
    assert_eq!(recorded[0].job_id.as_deref(), Some(job_id.as_str()));
  }

  #[tokio::test]
  async fn test_invalid_and_unknown_sources() {
    let t = test_runtime();

    let err = t.runtime.start_index("not/a/repo", false).unwrap_err();
    assert!(matches!(err, ServiceError::InvalidSource(_)));
    assert_eq!(t.runtime.diagnostics().len(), 1);

    let job_id = t.runtime.start_index("acme/missing", false).unwrap();
    let (outcome, _) = finish(&t.runtime, &job_id).await;
    assert!(matches!(outcome, JobOutcome::Failed(message) if message.contains("not found")));
    assert_eq!(t.runtime.diagnostics().len(), 2);
  }

  #[tokio::test]
  async fn test_missing_credentials_fail_before_job() {
    let t = runtime_with(
      test_config(),
      HashEmbedder::default(),
      ScriptedChat::new(TWO_SECTION_OUTLINE, SectionReply::Fragments(vec![])),
      &[],
    );

    let err = t.runtime.start_index(REPO, false).unwrap_err();
    assert!(matches!(err, ServiceError::Pool(_)));
    assert!(t.runtime.jobs().is_empty());
  }
}

//! Generation jobs: outline planning, section streaming and failure paths.

#[cfg(test)]
mod tests {
  use std::sync::atomic::Ordering;

  use pretty_assertions::assert_eq;

  use crate::{
    jobs::{JobEvent, JobOutcome, JobStatus},
    service::{
      GenerationRequest, ServiceError,
      __tests__::helpers::{
        HashEmbedder, ScriptedChat, SectionReply, TWO_SECTION_OUTLINE, finish, index_repository, runtime_with,
        test_config, test_runtime,
      },
    },
  };

  fn section(title: &str) -> JobEvent {
    JobEvent::Section {
      title: title.to_string(),
    }
  }

  fn content(text: &str) -> JobEvent {
    JobEvent::Content { text: text.to_string() }
  }

  fn section_titles(events: &[JobEvent]) -> Vec<&str> {
    events
      .iter()
      .filter_map(|e| match e {
        JobEvent::Section { title } => Some(title.as_str()),
        _ => None,
      })
      .collect()
  }

  #[tokio::test]
  async fn test_generation_requires_index() {
    let t = test_runtime();

    let err = t
      .runtime
      .start_generation("acme/widgets", GenerationRequest::default())
      .await
      .unwrap_err();
    assert!(matches!(err, ServiceError::NotIndexed(ref repo) if repo == "acme/widgets"));
    assert!(t.runtime.jobs().is_empty());

    let recorded = t.runtime.diagnostics().recent();
    assert_eq!(recorded.len(), 1);
    assert_eq!(recorded[0].context, "generation");
    assert_eq!(t.chat.requests.load(Ordering::SeqCst), 0);
  }

  #[tokio::test]
  async fn test_sections_stream_in_outline_order() {
    let t = test_runtime();
    index_repository(&t.runtime).await;

    let job_id = t
      .runtime
      .start_generation("acme/widgets", GenerationRequest::default())
      .await
      .unwrap();
    let (outcome, events) = finish(&t.runtime, &job_id).await;

    assert_eq!(outcome, JobOutcome::Complete);
    assert_eq!(
      events,
      vec![
        section("Overview"),
        content("Widgets "),
        content("are "),
        content("great."),
        section("Storage"),
        content("Widgets "),
        content("are "),
        content("great."),
        JobEvent::Done,
      ]
    );
    // One outline request plus one per section
    assert_eq!(t.chat.requests.load(Ordering::SeqCst), 3);
  }

  #[tokio::test]
  async fn test_unusable_outline_falls_back_to_default() {
    let t = runtime_with(
      test_config(),
      HashEmbedder::default(),
      ScriptedChat::new(
        "Here is a great outline for you: overview, then details.",
        SectionReply::Fragments(vec!["text"]),
      ),
      &["embed-key"],
    );
    index_repository(&t.runtime).await;

    let job_id = t
      .runtime
      .start_generation("acme/widgets", GenerationRequest::default())
      .await
      .unwrap();
    let (outcome, events) = finish(&t.runtime, &job_id).await;

    assert_eq!(outcome, JobOutcome::Complete);
    assert_eq!(
      section_titles(&events),
      vec!["Overview", "Architecture", "Key Components", "Usage", "Configuration"]
    );
  }

  #[tokio::test]
  async fn test_rejected_section_fails_job() {
    let t = runtime_with(
      test_config(),
      HashEmbedder::default(),
      ScriptedChat::new(TWO_SECTION_OUTLINE, SectionReply::Reject(401)),
      &["embed-key"],
    );
    index_repository(&t.runtime).await;

    let job_id = t
      .runtime
      .start_generation("acme/widgets", GenerationRequest::with_topic("storage"))
      .await
      .unwrap();
    let (outcome, events) = finish(&t.runtime, &job_id).await;

    assert!(matches!(outcome, JobOutcome::Failed(message) if message.contains("401")));
    assert_eq!(events.first(), Some(&section("Overview")));
    assert!(matches!(events.last(), Some(JobEvent::Failed { .. })));
    assert_eq!(section_titles(&events).len(), 1);

    let recorded = t.runtime.diagnostics().recent();
    assert_eq!(recorded.len(), 1);
    assert_eq!(recorded[0].job_id.as_deref(), Some(job_id.as_str()));
  }

  #[tokio::test]
  async fn test_cancel_all_stops_generation() {
    let t = test_runtime();
    index_repository(&t.runtime).await;

    let job_id = t
      .runtime
      .start_generation("acme/widgets", GenerationRequest::default())
      .await
      .unwrap();
    // Cancelled before the spawned task reaches its first checkpoint
    assert_eq!(t.runtime.cancel_all(), 1);

    let (outcome, events) = finish(&t.runtime, &job_id).await;
    assert_eq!(outcome, JobOutcome::Cancelled);
    assert_eq!(events, vec![JobEvent::Cancelled]);
    assert_eq!(t.runtime.jobs().status(&job_id), Some(JobStatus::Error));
    assert!(t.runtime.diagnostics().is_empty());
  }
}

//! Documentation outline planning
//!
//! The model proposes an outline as JSON. Output that cannot be parsed into
//! a usable outline is replaced by a fixed default outline rather than
//! failing the whole generation.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{
  ChatMessage, LlmError, PooledGenerator,
  prompts::{DOCS_SYSTEM_PROMPT, build_outline_prompt},
  provider::Result,
};

const MAX_SECTIONS: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutlineSection {
  pub title: String,
  #[serde(default)]
  pub focus: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outline {
  pub sections: Vec<OutlineSection>,
}

impl Outline {
  /// Fixed outline used when the model's outline is unusable
  pub fn default_for(topic: Option<&str>) -> Self {
    let mut sections = vec![
      ("Overview", "What the project does and who it is for"),
      ("Architecture", "Main modules and how they fit together"),
      ("Key Components", "The most important types and functions"),
      ("Usage", "How to build, run and call the project"),
      ("Configuration", "Settings, environment variables and defaults"),
    ];
    if topic.is_some() {
      sections.insert(1, ("Topic Deep Dive", "The requested topic in detail"));
    }

    Self {
      sections: sections
        .into_iter()
        .map(|(title, focus)| OutlineSection {
          title: title.to_string(),
          focus: match (title, topic) {
            ("Topic Deep Dive", Some(t)) => t.to_string(),
            _ => focus.to_string(),
          },
        })
        .collect(),
    }
  }

  /// Parse model output into an outline
  pub fn parse(text: &str) -> Result<Self> {
    let json = extract_json(text).ok_or_else(|| LlmError::MalformedStructure("no JSON object in output".into()))?;
    let mut outline: Outline =
      serde_json::from_str(json).map_err(|e| LlmError::MalformedStructure(e.to_string()))?;

    outline.sections.retain(|s| !s.title.trim().is_empty());
    if outline.sections.is_empty() {
      return Err(LlmError::MalformedStructure("outline has no sections".into()));
    }
    outline.sections.truncate(MAX_SECTIONS);
    Ok(outline)
  }
}

/// Find the JSON object in a response that may be fenced or surrounded by prose
fn extract_json(text: &str) -> Option<&str> {
  let text = text.trim();
  let text = match text.strip_prefix("```") {
    Some(fenced) => {
      let body = &fenced[fenced.find('\n')? + 1..];
      body.rfind("```").map(|end| &body[..end]).unwrap_or(body)
    }
    None => text,
  };

  let start = text.find('{')?;
  let end = text.rfind('}')?;
  (start < end).then(|| &text[start..=end])
}

/// Ask the model for an outline, falling back to the default outline when
/// its answer is malformed.
///
/// Pool and provider failures still propagate.
pub async fn plan_outline(
  generator: &PooledGenerator,
  repo: &str,
  topic: Option<&str>,
  context: &str,
) -> Result<Outline> {
  let prompt = build_outline_prompt(repo, topic, context);
  let response = generator.complete(DOCS_SYSTEM_PROMPT, &[ChatMessage::user(prompt)]).await?;

  match Outline::parse(&response) {
    Ok(outline) => {
      debug!(repo, sections = outline.sections.len(), "Planned outline");
      Ok(outline)
    }
    Err(e) => {
      warn!(
        repo,
        err = %e,
        preview = %response.chars().take(200).collect::<String>(),
        "Unusable outline from model, using default"
      );
      Ok(Outline::default_for(topic))
    }
  }
}

#[cfg(test)]
mod tests {
  use std::sync::Arc;

  use async_trait::async_trait;
  use docsmith_core::{CredentialEntry, CredentialPool, credentials::DEFAULT_COOLDOWN};
  use futures::{StreamExt, stream};
  use pretty_assertions::assert_eq;

  use super::*;
  use crate::{ChatChunk, ChatProvider, ChatRequest, ChatStream};

  /// Answers every request with the same text
  struct FixedChat(&'static str);

  #[async_trait]
  impl ChatProvider for FixedChat {
    fn name(&self) -> &str {
      "fixed"
    }

    fn model_id(&self) -> &str {
      "fixed"
    }

    async fn stream_chat(&self, _request: &ChatRequest, _credential: &str) -> Result<ChatStream> {
      Ok(stream::iter(vec![Ok(ChatChunk::Text(self.0.to_string()))]).boxed())
    }
  }

  fn generator(answer: &'static str) -> PooledGenerator {
    let pool = CredentialPool::new("generation-openai", CredentialEntry::from_secrets(["k"]), DEFAULT_COOLDOWN).unwrap();
    PooledGenerator::new(Arc::new(FixedChat(answer)), Arc::new(pool))
  }

  #[tokio::test]
  async fn test_plan_outline_uses_model_answer() {
    let generator = generator(r#"{"sections":[{"title":"Storage","focus":"how chunks are stored"}]}"#);
    let outline = plan_outline(&generator, "acme/widgets", None, "").await.unwrap();
    assert_eq!(outline.sections[0].title, "Storage");
  }

  #[tokio::test]
  async fn test_plan_outline_falls_back_on_malformed_answer() {
    let generator = generator("Sure! The docs should cover setup and usage.");
    let outline = plan_outline(&generator, "acme/widgets", Some("setup"), "").await.unwrap();
    assert_eq!(outline, Outline::default_for(Some("setup")));
  }

  #[test]
  fn test_parse_plain_json() {
    let outline = Outline::parse(r#"{"sections":[{"title":"Intro","focus":"why"}]}"#).unwrap();
    assert_eq!(
      outline.sections,
      vec![OutlineSection {
        title: "Intro".into(),
        focus: "why".into()
      }]
    );
  }

  #[test]
  fn test_parse_fenced_json_with_prose() {
    let text = "```json\nHere you go: {\"sections\":[{\"title\":\"A\"},{\"title\":\"B\"}]}\n```";
    let outline = Outline::parse(text).unwrap();
    assert_eq!(outline.sections.len(), 2);
    assert_eq!(outline.sections[1].focus, "");
  }

  #[test]
  fn test_malformed_outputs() {
    for text in [
      "I cannot help with that",
      r#"{"sections": "nope"}"#,
      r#"{"sections": []}"#,
      r#"{"sections": [{"title": "  "}]}"#,
      "{ broken",
    ] {
      assert!(
        matches!(Outline::parse(text), Err(LlmError::MalformedStructure(_))),
        "accepted: {text}"
      );
    }
  }

  #[test]
  fn test_sections_are_capped() {
    let sections: Vec<String> = (0..12).map(|i| format!(r#"{{"title":"S{i}"}}"#)).collect();
    let text = format!(r#"{{"sections":[{}]}}"#, sections.join(","));
    assert_eq!(Outline::parse(&text).unwrap().sections.len(), MAX_SECTIONS);
  }

  #[test]
  fn test_default_outline_includes_topic() {
    assert_eq!(Outline::default_for(None).sections.len(), 5);

    let outline = Outline::default_for(Some("the cache"));
    assert_eq!(outline.sections[1].title, "Topic Deep Dive");
    assert_eq!(outline.sections[1].focus, "the cache");
  }
}

//! Prompts for documentation synthesis
//!
//! The outline prompt asks for JSON so it can be parsed; section prompts ask
//! for markdown that is streamed straight to the reader.

use tracing::trace;

use crate::OutlineSection;

/// System prompt shared by every documentation request
pub const DOCS_SYSTEM_PROMPT: &str = r#"You are a senior engineer writing developer documentation for a source repository.
Ground every statement in the provided source excerpts. Name real files, types and functions.
If the excerpts do not cover something, say so briefly instead of guessing.
Write concise GitHub-flavoured markdown."#;

/// Expected outline shape, quoted in the outline prompt
pub const OUTLINE_SCHEMA: &str = r#"{
  "sections": [
    { "title": "string", "focus": "string" }
  ]
}"#;

const OUTLINE_PROMPT: &str = r#"Plan documentation for the repository {repo}.
{topic}
Source excerpts:

{context}

Reply with JSON only, no prose, matching this shape:
{schema}

Use between 3 and 8 sections. "focus" says what the section must explain."#;

const SECTION_PROMPT: &str = r#"Write the "{title}" section of the documentation for {repo}.
Focus: {focus}

Source excerpts:

{context}

Start directly with the content; the section heading is added for you."#;

pub fn build_outline_prompt(repo: &str, topic: Option<&str>, context: &str) -> String {
  let topic = topic
    .map(|t| format!("The reader is interested in: {}\n", t))
    .unwrap_or_default();
  let prompt = OUTLINE_PROMPT
    .replace("{repo}", repo)
    .replace("{topic}", &topic)
    .replace("{schema}", OUTLINE_SCHEMA)
    .replace("{context}", context);
  trace!(prompt_len = prompt.len(), "Built outline prompt");
  prompt
}

pub fn build_section_prompt(repo: &str, section: &OutlineSection, context: &str) -> String {
  let focus = if section.focus.is_empty() {
    section.title.as_str()
  } else {
    section.focus.as_str()
  };
  SECTION_PROMPT
    .replace("{title}", &section.title)
    .replace("{repo}", repo)
    .replace("{focus}", focus)
    .replace("{context}", context)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_outline_prompt_includes_topic_and_schema() {
    let prompt = build_outline_prompt("acme/widgets", Some("the plugin API"), "### src/lib.rs (chunk 1/1)\n...");
    assert!(prompt.contains("acme/widgets"));
    assert!(prompt.contains("The reader is interested in: the plugin API"));
    assert!(prompt.contains("\"sections\""));
    assert!(prompt.contains("src/lib.rs"));
  }

  #[test]
  fn test_outline_prompt_without_topic() {
    let prompt = build_outline_prompt("acme/widgets", None, "");
    assert!(!prompt.contains("interested in"));
  }

  #[test]
  fn test_section_prompt_falls_back_to_title() {
    let section = OutlineSection {
      title: "Architecture".into(),
      focus: String::new(),
    };
    let prompt = build_section_prompt("acme/widgets", &section, "ctx");
    assert!(prompt.contains("Focus: Architecture"));
  }
}

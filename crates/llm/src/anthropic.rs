use std::time::Duration;

use async_trait::async_trait;
use docsmith_core::config::GenerationConfig;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{
  ChatChunk, ChatMessage, ChatRequest, LlmError,
  provider::{ChatProvider, ChatStream, Result},
  sse::{SseEvent, decode_stream},
};

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";
const API_VERSION: &str = "2023-06-01";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Anthropic Messages API streaming provider
#[derive(Debug, Clone)]
pub struct AnthropicProvider {
  client: reqwest::Client,
  base_url: String,
  model: String,
}

impl AnthropicProvider {
  pub fn new(config: &GenerationConfig) -> Result<Self> {
    let client = reqwest::Client::builder().connect_timeout(CONNECT_TIMEOUT).build()?;
    let base_url = config
      .base_url
      .as_deref()
      .unwrap_or(DEFAULT_BASE_URL)
      .trim_end_matches('/')
      .to_string();

    info!(model = %config.model, base_url, "Anthropic chat provider initialized");

    Ok(Self {
      client,
      base_url,
      model: config.model.clone(),
    })
  }

  fn messages_url(&self) -> String {
    format!("{}/messages", self.base_url)
  }

  fn build_body<'a>(&'a self, request: &'a ChatRequest) -> MessagesRequest<'a> {
    MessagesRequest {
      model: &self.model,
      system: (!request.system.is_empty()).then_some(request.system.as_str()),
      messages: &request.messages,
      max_tokens: request.max_tokens,
      temperature: request.temperature,
      stream: true,
    }
  }
}

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
  model: &'a str,
  #[serde(skip_serializing_if = "Option::is_none")]
  system: Option<&'a str>,
  messages: &'a [ChatMessage],
  max_tokens: u32,
  temperature: f32,
  stream: bool,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum StreamEvent {
  MessageStart {
    message: MessageStart,
  },
  ContentBlockDelta {
    delta: Delta,
  },
  MessageDelta {
    #[serde(default)]
    usage: Option<OutputUsage>,
  },
  Error {
    error: ApiError,
  },
  #[serde(other)]
  Other,
}

#[derive(Debug, Deserialize)]
struct MessageStart {
  #[serde(default)]
  usage: Option<InputUsage>,
}

#[derive(Debug, Deserialize)]
struct InputUsage {
  #[serde(default)]
  input_tokens: u64,
}

#[derive(Debug, Deserialize)]
struct OutputUsage {
  #[serde(default)]
  output_tokens: u64,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Delta {
  TextDelta {
    text: String,
  },
  #[serde(other)]
  Other,
}

#[derive(Debug, Deserialize)]
struct ApiError {
  #[serde(rename = "type", default)]
  kind: String,
  #[serde(default)]
  message: String,
}

/// Tracks input tokens from `message_start` until usage is complete
#[derive(Debug, Default)]
struct EventParser {
  input_tokens: u64,
}

impl EventParser {
  fn parse(&mut self, event: &SseEvent) -> Result<Vec<ChatChunk>> {
    if event.data.trim().is_empty() {
      return Ok(Vec::new());
    }

    let parsed: StreamEvent = serde_json::from_str(&event.data).map_err(|e| {
      LlmError::StreamParse(format!(
        "{} in {:?} event",
        e,
        event.event.as_deref().unwrap_or("unnamed")
      ))
    })?;

    Ok(match parsed {
      StreamEvent::MessageStart { message } => {
        self.input_tokens = message.usage.map(|u| u.input_tokens).unwrap_or_default();
        Vec::new()
      }
      StreamEvent::ContentBlockDelta {
        delta: Delta::TextDelta { text },
      } if !text.is_empty() => vec![ChatChunk::Text(text)],
      StreamEvent::MessageDelta { usage: Some(usage) } => vec![ChatChunk::Usage {
        input_tokens: self.input_tokens,
        output_tokens: usage.output_tokens,
      }],
      StreamEvent::Error { error } => {
        return Err(LlmError::Provider(format!("{}: {}", error.kind, error.message)));
      }
      _ => Vec::new(),
    })
  }
}

#[async_trait]
impl ChatProvider for AnthropicProvider {
  fn name(&self) -> &str {
    "anthropic"
  }

  fn model_id(&self) -> &str {
    &self.model
  }

  async fn stream_chat(&self, request: &ChatRequest, credential: &str) -> Result<ChatStream> {
    debug!(model = %self.model, messages = request.messages.len(), "Starting Anthropic message stream");

    let response = self
      .client
      .post(self.messages_url())
      .header("x-api-key", credential)
      .header("anthropic-version", API_VERSION)
      .json(&self.build_body(request))
      .send()
      .await?;

    let status = response.status();
    if !status.is_success() {
      let body = response.text().await.unwrap_or_default();
      warn!(status = status.as_u16(), body, "Anthropic message request failed");
      return Err(LlmError::Http {
        provider: "anthropic",
        status: status.as_u16(),
        message: body,
      });
    }

    let mut parser = EventParser::default();
    Ok(decode_stream(response.bytes_stream(), move |event| parser.parse(event)))
  }
}

#[cfg(test)]
mod tests {
  use pretty_assertions::assert_eq;

  use super::*;

  fn event(name: &str, data: &str) -> SseEvent {
    SseEvent {
      event: Some(name.to_string()),
      data: data.to_string(),
    }
  }

  #[test]
  fn test_full_event_sequence() {
    let mut parser = EventParser::default();
    let sequence = [
      event(
        "message_start",
        r#"{"type":"message_start","message":{"id":"msg_1","usage":{"input_tokens":25,"output_tokens":1}}}"#,
      ),
      event(
        "content_block_start",
        r#"{"type":"content_block_start","index":0,"content_block":{"type":"text","text":""}}"#,
      ),
      event("ping", r#"{"type": "ping"}"#),
      event(
        "content_block_delta",
        r#"{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"Hello"}}"#,
      ),
      event(
        "message_delta",
        r#"{"type":"message_delta","delta":{"stop_reason":"end_turn"},"usage":{"output_tokens":15}}"#,
      ),
      event("message_stop", r#"{"type":"message_stop"}"#),
    ];

    let chunks: Vec<ChatChunk> = sequence
      .iter()
      .flat_map(|e| parser.parse(e).unwrap())
      .collect();
    assert_eq!(
      chunks,
      vec![
        ChatChunk::Text("Hello".into()),
        ChatChunk::Usage {
          input_tokens: 25,
          output_tokens: 15
        }
      ]
    );
  }

  #[test]
  fn test_overloaded_error_event_is_rate_limit() {
    let mut parser = EventParser::default();
    let err = parser
      .parse(&event(
        "error",
        r#"{"type":"error","error":{"type":"overloaded_error","message":"Overloaded"}}"#,
      ))
      .unwrap_err();
    assert_eq!(err.failure_kind(), docsmith_core::FailureKind::RateLimited);
  }

  #[test]
  fn test_garbled_event_is_stream_glitch() {
    let mut parser = EventParser::default();
    let err = parser.parse(&event("content_block_delta", "{\"type\":")).unwrap_err();
    assert_eq!(err.failure_kind(), docsmith_core::FailureKind::StreamParseGlitch);
  }

  #[test]
  fn test_body_shape() {
    let provider = AnthropicProvider::new(&GenerationConfig::default()).unwrap();
    let request = ChatRequest {
      system: "sys".into(),
      messages: vec![ChatMessage::user("hi")],
      max_tokens: 64,
      temperature: 0.0,
    };
    let body = serde_json::to_value(provider.build_body(&request)).unwrap();
    assert_eq!(body["system"], "sys");
    assert_eq!(body["messages"][0]["role"], "user");
    assert_eq!(body["max_tokens"], 64);
    assert_eq!(provider.messages_url(), "https://api.anthropic.com/v1/messages");
  }
}

use std::time::Duration;

use async_trait::async_trait;
use docsmith_core::config::GenerationConfig;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, trace, warn};

use crate::{
  ChatChunk, ChatMessage, ChatRequest, LlmError,
  provider::{ChatProvider, ChatStream, Result},
  sse::{SseEvent, decode_stream},
};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// OpenAI-compatible `/chat/completions` streaming provider
#[derive(Debug, Clone)]
pub struct OpenAiChatProvider {
  client: reqwest::Client,
  base_url: String,
  model: String,
}

impl OpenAiChatProvider {
  pub fn new(config: &GenerationConfig) -> Result<Self> {
    let client = reqwest::Client::builder().connect_timeout(CONNECT_TIMEOUT).build()?;
    let base_url = config
      .base_url
      .as_deref()
      .unwrap_or(DEFAULT_BASE_URL)
      .trim_end_matches('/')
      .to_string();

    info!(model = %config.model, base_url, "OpenAI chat provider initialized");

    Ok(Self {
      client,
      base_url,
      model: config.model.clone(),
    })
  }

  fn completions_url(&self) -> String {
    format!("{}/chat/completions", self.base_url)
  }

  fn build_body<'a>(&'a self, request: &'a ChatRequest) -> CompletionRequest<'a> {
    let mut messages = Vec::with_capacity(request.messages.len() + 1);
    if !request.system.is_empty() {
      messages.push(WireMessage {
        role: "system",
        content: &request.system,
      });
    }
    messages.extend(request.messages.iter().map(WireMessage::from));

    CompletionRequest {
      model: &self.model,
      messages,
      max_tokens: request.max_tokens,
      temperature: request.temperature,
      stream: true,
      stream_options: StreamOptions { include_usage: true },
    }
  }
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
  model: &'a str,
  messages: Vec<WireMessage<'a>>,
  max_tokens: u32,
  temperature: f32,
  stream: bool,
  stream_options: StreamOptions,
}

#[derive(Debug, Serialize)]
struct StreamOptions {
  include_usage: bool,
}

#[derive(Debug, Serialize)]
struct WireMessage<'a> {
  role: &'static str,
  content: &'a str,
}

impl<'a> From<&'a ChatMessage> for WireMessage<'a> {
  fn from(message: &'a ChatMessage) -> Self {
    let role = match message.role {
      crate::Role::User => "user",
      crate::Role::Assistant => "assistant",
    };
    Self {
      role,
      content: &message.content,
    }
  }
}

#[derive(Debug, Deserialize)]
struct CompletionChunk {
  #[serde(default)]
  choices: Vec<StreamingChoice>,
  usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
struct StreamingChoice {
  delta: StreamingDelta,
}

#[derive(Debug, Deserialize)]
struct StreamingDelta {
  #[serde(default)]
  content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireUsage {
  prompt_tokens: u64,
  completion_tokens: u64,
}

/// Parse one `data:` payload of the completions stream
fn parse_event(event: &SseEvent) -> Result<Vec<ChatChunk>> {
  let data = event.data.trim();
  if data.is_empty() || data == "[DONE]" {
    return Ok(Vec::new());
  }

  let value: Value = serde_json::from_str(data)
    .map_err(|e| LlmError::StreamParse(format!("{}: {}", e, data.chars().take(120).collect::<String>())))?;

  // Errors can arrive inside an otherwise successful stream
  if let Some(error) = value.get("error") {
    let message = error
      .get("message")
      .and_then(Value::as_str)
      .unwrap_or("unknown error")
      .to_string();
    return Err(LlmError::Provider(message));
  }

  let chunk: CompletionChunk = serde_json::from_value(value).map_err(|e| LlmError::StreamParse(e.to_string()))?;
  let mut chunks = Vec::new();
  for choice in chunk.choices {
    if let Some(text) = choice.delta.content
      && !text.is_empty()
    {
      chunks.push(ChatChunk::Text(text));
    }
  }
  if let Some(usage) = chunk.usage {
    chunks.push(ChatChunk::Usage {
      input_tokens: usage.prompt_tokens,
      output_tokens: usage.completion_tokens,
    });
  }
  trace!(chunks = chunks.len(), "Parsed completion event");
  Ok(chunks)
}

#[async_trait]
impl ChatProvider for OpenAiChatProvider {
  fn name(&self) -> &str {
    "openai"
  }

  fn model_id(&self) -> &str {
    &self.model
  }

  async fn stream_chat(&self, request: &ChatRequest, credential: &str) -> Result<ChatStream> {
    debug!(model = %self.model, messages = request.messages.len(), "Starting OpenAI completion stream");

    let response = self
      .client
      .post(self.completions_url())
      .bearer_auth(credential)
      .json(&self.build_body(request))
      .send()
      .await?;

    let status = response.status();
    if !status.is_success() {
      let body = response.text().await.unwrap_or_default();
      warn!(status = status.as_u16(), body, "OpenAI completion request failed");
      return Err(LlmError::Http {
        provider: "openai",
        status: status.as_u16(),
        message: body,
      });
    }

    Ok(decode_stream(response.bytes_stream(), parse_event))
  }
}

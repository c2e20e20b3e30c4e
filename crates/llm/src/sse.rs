// Server-sent event decoding for streamed completions
//
// Bytes arrive in arbitrary slices; events are separated by a blank line and
// carry `event:` and `data:` fields. Multi-line data is joined with '\n'.

use std::collections::VecDeque;

use futures::{Stream, StreamExt, stream};

use crate::{ChatChunk, ChatStream, LlmError, Result};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct SseEvent {
  pub event: Option<String>,
  pub data: String,
}

/// Incremental line-oriented SSE decoder
#[derive(Debug, Default)]
pub(crate) struct SseDecoder {
  /// Bytes after the last complete line
  buffer: Vec<u8>,
  event: Option<String>,
  data: Vec<String>,
}

impl SseDecoder {
  /// Feed raw bytes, returning every event completed by them
  pub fn feed(&mut self, bytes: &[u8]) -> Result<Vec<SseEvent>> {
    self.buffer.extend_from_slice(bytes);
    let mut events = Vec::new();

    while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
      let line: Vec<u8> = self.buffer.drain(..=pos).collect();
      let line = std::str::from_utf8(&line[..line.len() - 1])
        .map_err(|e| LlmError::StreamParse(format!("invalid utf-8 in stream: {}", e)))?;
      if let Some(event) = self.feed_line(line.strip_suffix('\r').unwrap_or(line)) {
        events.push(event);
      }
    }

    Ok(events)
  }

  /// Flush a trailing event that was not followed by a blank line
  pub fn finish(&mut self) -> Option<SseEvent> {
    if !self.buffer.is_empty() {
      let rest = std::mem::take(&mut self.buffer);
      if let Ok(line) = String::from_utf8(rest) {
        self.feed_line(line.trim_end_matches('\r'));
      }
    }
    self.take_event()
  }

  fn feed_line(&mut self, line: &str) -> Option<SseEvent> {
    if line.is_empty() {
      return self.take_event();
    }
    // Comment / keep-alive
    if line.starts_with(':') {
      return None;
    }

    let (field, value) = line.split_once(':').unwrap_or((line, ""));
    let value = value.strip_prefix(' ').unwrap_or(value);
    match field {
      "event" => self.event = Some(value.to_string()),
      "data" => self.data.push(value.to_string()),
      _ => {}
    }
    None
  }

  fn take_event(&mut self) -> Option<SseEvent> {
    if self.event.is_none() && self.data.is_empty() {
      return None;
    }
    Some(SseEvent {
      event: self.event.take(),
      data: std::mem::take(&mut self.data).join("\n"),
    })
  }
}

struct DecodeState<S, F> {
  bytes: std::pin::Pin<Box<S>>,
  decoder: SseDecoder,
  parse: F,
  pending: VecDeque<Result<ChatChunk>>,
  finished: bool,
}

impl<S, F> DecodeState<S, F>
where
  F: FnMut(&SseEvent) -> Result<Vec<ChatChunk>>,
{
  fn push_events(&mut self, events: Vec<SseEvent>) {
    for event in events {
      match (self.parse)(&event) {
        Ok(chunks) => self.pending.extend(chunks.into_iter().map(Ok)),
        Err(e) => {
          self.pending.push_back(Err(e));
          self.finished = true;
          return;
        }
      }
    }
  }
}

/// Turn an HTTP body into a chunk stream using a per-provider event parser.
///
/// The stream ends after the first error.
pub(crate) fn decode_stream<S, B, F>(bytes: S, parse: F) -> ChatStream
where
  S: Stream<Item = std::result::Result<B, reqwest::Error>> + Send + 'static,
  B: AsRef<[u8]> + Send,
  F: FnMut(&SseEvent) -> Result<Vec<ChatChunk>> + Send + 'static,
{
  let state = DecodeState {
    bytes: Box::pin(bytes),
    decoder: SseDecoder::default(),
    parse,
    pending: VecDeque::new(),
    finished: false,
  };

  stream::unfold(state, |mut state| async move {
    loop {
      if let Some(item) = state.pending.pop_front() {
        return Some((item, state));
      }
      if state.finished {
        return None;
      }

      match state.bytes.next().await {
        Some(Ok(chunk)) => match state.decoder.feed(chunk.as_ref()) {
          Ok(events) => state.push_events(events),
          Err(e) => {
            state.pending.push_back(Err(e));
            state.finished = true;
          }
        },
        Some(Err(e)) => {
          state.pending.push_back(Err(LlmError::Request(e)));
          state.finished = true;
        }
        None => {
          let tail: Vec<SseEvent> = state.decoder.finish().into_iter().collect();
          state.push_events(tail);
          state.finished = true;
        }
      }
    }
  })
  .boxed()
}

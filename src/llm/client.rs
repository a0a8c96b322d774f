//! Streaming HTTP client for the chat-completions API.
//!
//! The response body is an SSE byte stream; this module decodes it into
//! discrete [`StreamEvent`]s. Failures surface as events in the stream,
//! never as panics — the orchestration loop treats the event stream as
//! the single account of a turn.

use async_stream::stream;
use futures_util::stream::{BoxStream, Stream, StreamExt};
use reqwest::Client;
use serde_json::{Map, Value};
use tracing::warn;
use uuid::Uuid;

use super::types::{ChatChunk, ChatRequest, StreamEvent, WireMessage};
use super::ChatStreamer;
use crate::config::{DEFAULT_API_BASE_URL, DEFAULT_MODEL};
use crate::tools::ToolDefinition;

/// Streaming client for an OpenAI-compatible chat-completions endpoint.
#[derive(Debug, Clone)]
pub struct OpenAiClient {
    http: Client,
    base_url: String,
    model: String,
}

impl OpenAiClient {
    /// Create a client with the default base URL (https://api.openai.com).
    pub fn new() -> Self {
        Self::with_base_url(DEFAULT_API_BASE_URL.into())
    }

    /// Create a client with a custom base URL (for testing with mock servers).
    pub fn with_base_url(base_url: String) -> Self {
        Self {
            http: Client::new(),
            base_url,
            model: DEFAULT_MODEL.into(),
        }
    }

    /// Change the model sent with subsequent requests.
    pub fn set_model(&mut self, model: impl Into<String>) {
        self.model = model.into();
    }

    /// Get the configured model identifier.
    pub fn model(&self) -> &str {
        &self.model
    }
}

impl Default for OpenAiClient {
    fn default() -> Self {
        Self::new()
    }
}

impl ChatStreamer for OpenAiClient {
    fn stream_chat(
        &self,
        messages: Vec<WireMessage>,
        tools: Vec<ToolDefinition>,
        api_key: &str,
    ) -> BoxStream<'static, StreamEvent> {
        let http = self.http.clone();
        let url = format!("{}/v1/chat/completions", self.base_url);
        let api_key = api_key.to_string();
        let request = ChatRequest {
            model: self.model.clone(),
            messages,
            tools,
            tool_choice: Some("auto".into()),
            stream: true,
        };

        Box::pin(stream! {
            let response = match http
                .post(&url)
                .bearer_auth(&api_key)
                .json(&request)
                .send()
                .await
            {
                Ok(r) => r,
                Err(e) => {
                    yield StreamEvent::Error {
                        message: format!("request failed: {e}"),
                    };
                    return;
                }
            };

            let status = response.status().as_u16();
            if status >= 400 {
                let body = response.text().await.unwrap_or_else(|_| "(no body)".into());
                yield StreamEvent::Error {
                    message: format!("API error (status {status}): {body}"),
                };
                return;
            }

            let events = decode_sse(response.bytes_stream());
            futures_util::pin_mut!(events);
            while let Some(event) = events.next().await {
                yield event;
            }
        })
    }
}

/// Decode an SSE-framed byte stream into [`StreamEvent`]s.
///
/// Records may be split across read chunks: complete lines are peeled off
/// a carry-over buffer and the trailing partial line is re-buffered.
/// `data: [DONE]` terminates the sequence immediately — buffered bytes
/// past it are never examined. A transport error mid-stream becomes a
/// single final `Error` event.
pub(crate) fn decode_sse<S, B, E>(bytes: S) -> impl Stream<Item = StreamEvent>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: std::fmt::Display,
{
    stream! {
        futures_util::pin_mut!(bytes);
        let mut buffer = String::new();

        while let Some(chunk) = bytes.next().await {
            let chunk = match chunk {
                Ok(c) => c,
                Err(e) => {
                    yield StreamEvent::Error {
                        message: format!("stream error: {e}"),
                    };
                    return;
                }
            };

            buffer.push_str(&String::from_utf8_lossy(chunk.as_ref()));

            while let Some(pos) = buffer.find('\n') {
                let line: String = buffer.drain(..=pos).collect();
                let trimmed = line.trim();
                let Some(data) = trimmed.strip_prefix("data: ") else {
                    continue;
                };
                if data == "[DONE]" {
                    yield StreamEvent::Done;
                    return;
                }
                for event in decode_record(data) {
                    yield event;
                }
            }
        }

        // Byte stream ended without an explicit [DONE].
        yield StreamEvent::Done;
    }
}

/// Decode one `data:` record into zero or more events. A malformed record
/// is logged and skipped — it never aborts the stream.
fn decode_record(data: &str) -> Vec<StreamEvent> {
    let chunk: ChatChunk = match serde_json::from_str(data) {
        Ok(c) => c,
        Err(e) => {
            warn!(error = %e, "skipping malformed SSE record");
            return Vec::new();
        }
    };

    let mut events = Vec::new();
    let Some(delta) = chunk.choices.into_iter().next().and_then(|c| c.delta) else {
        return events;
    };

    if let Some(content) = delta.content {
        if !content.is_empty() {
            events.push(StreamEvent::Content { delta: content });
        }
    }

    if let Some(calls) = delta.tool_calls {
        for call in calls {
            let (name, raw_args) = match call.function {
                Some(f) => (f.name, f.arguments),
                None => (None, None),
            };
            events.push(StreamEvent::ToolCall {
                id: call
                    .id
                    .unwrap_or_else(|| format!("tool_{}", Uuid::new_v4())),
                name: name.unwrap_or_default(),
                arguments: raw_args.as_deref().map(parse_arguments).unwrap_or_default(),
            });
        }
    }

    events
}

/// Parse a JSON-encoded argument string into a mapping. Anything that is
/// not a JSON object degrades to an empty map rather than failing the turn.
fn parse_arguments(raw: &str) -> Map<String, Value> {
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => map,
        Ok(_) | Err(_) => {
            warn!("tool-call arguments are not a JSON object, using empty mapping");
            Map::new()
        }
    }
}

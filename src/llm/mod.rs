//! Streaming LLM layer — chat-completions requests and SSE decoding.
//!
//! The orchestration loop talks to the provider through the
//! [`ChatStreamer`] seam; [`client::OpenAiClient`] is the production
//! implementation, tests script their own event sequences.

pub mod client;
pub mod types;

pub use client::OpenAiClient;
pub use types::{ChatRequest, StreamEvent, WireMessage};

use futures_util::stream::BoxStream;

use crate::tools::ToolDefinition;

/// Source of decoded stream events for one conversation turn.
///
/// The returned stream is lazy: the HTTP request is issued on first poll,
/// and request failures are surfaced as a single [`StreamEvent::Error`]
/// rather than an `Err`.
pub trait ChatStreamer: Send + Sync {
    fn stream_chat(
        &self,
        messages: Vec<WireMessage>,
        tools: Vec<ToolDefinition>,
        api_key: &str,
    ) -> BoxStream<'static, StreamEvent>;
}

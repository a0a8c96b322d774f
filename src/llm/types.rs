//! Wire types for the streaming chat-completions API.
//!
//! Serde-serializable to JSON for HTTP calls; SSE chunk shapes are
//! deserialize-only. Internal types stay Rust-native.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::tools::ToolDefinition;

/// Request body for a streaming chat completion.
#[derive(Debug, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDefinition>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<String>,
    pub stream: bool,
}

/// A single role+content message as sent on the wire. The transcript's
/// richer message type ([`crate::chat::ChatMessage`]) is projected down
/// to this before every request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireMessage {
    pub role: String,
    pub content: String,
}

/// One decoded unit of the provider's incremental response.
///
/// Transient: produced and consumed within a single request, never stored.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// A text fragment to append to the assistant message.
    Content { delta: String },
    /// A complete tool-call request detected in the stream.
    ToolCall {
        id: String,
        name: String,
        arguments: Map<String, Value>,
    },
    /// Upstream marked completion, or the byte stream ended.
    Done,
    /// The request or the stream itself failed. Terminal.
    Error { message: String },
}

/// One `data:` record of the SSE response.
#[derive(Debug, Deserialize)]
pub struct ChatChunk {
    #[serde(default)]
    pub choices: Vec<ChunkChoice>,
}

#[derive(Debug, Deserialize)]
pub struct ChunkChoice {
    pub delta: Option<ChunkDelta>,
}

#[derive(Debug, Deserialize)]
pub struct ChunkDelta {
    pub content: Option<String>,
    pub tool_calls: Option<Vec<ChunkToolCall>>,
}

#[derive(Debug, Deserialize)]
pub struct ChunkToolCall {
    pub id: Option<String>,
    pub function: Option<ChunkFunction>,
}

/// The function payload of a tool-call delta. `arguments` arrives as a
/// JSON-encoded string, not an object.
#[derive(Debug, Deserialize)]
pub struct ChunkFunction {
    pub name: Option<String>,
    pub arguments: Option<String>,
}

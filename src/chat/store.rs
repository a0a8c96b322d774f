//! Conversation store — the transcript, the pending tool call, and the
//! streaming flag.
//!
//! Pure state: no knowledge of network or approval semantics. Every
//! mutation goes through a method on [`Conversation`]; all operations are
//! synchronous and total.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::llm::WireMessage;

/// Who authored a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }
}

/// Lifecycle of a tool call. Transitions are monotonic:
/// `pending → approved → executing → {completed | error}`, with
/// `pending → rejected` the only shortcut. No path leads back to pending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolCallStatus {
    Pending,
    Approved,
    Executing,
    Completed,
    Rejected,
    Error,
}

/// A tool-call request, embedded in the assistant message that produced
/// it. The one awaiting a verdict is also held in
/// [`Conversation::pending_tool_call`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: Map<String, Value>,
    pub status: ToolCallStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolCall {
    /// A freshly detected call, awaiting a verdict.
    pub fn pending(id: String, name: String, arguments: Map<String, Value>) -> Self {
        Self {
            id,
            name,
            arguments,
            status: ToolCallStatus::Pending,
            result: None,
            error: None,
        }
    }
}

/// One entry in the transcript. Content of the most recent assistant
/// message is mutated in place while its turn streams.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub tool_calls: Vec<ToolCall>,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: format!("msg_{}", Uuid::new_v4()),
            role,
            content: content.into(),
            timestamp: Utc::now(),
            tool_calls: Vec::new(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// The mutable sink for an assistant turn's deltas and tool calls.
    pub fn assistant_empty() -> Self {
        Self::new(Role::Assistant, "")
    }

    /// Project down to the role+content shape resent on each turn.
    pub fn to_wire(&self) -> WireMessage {
        WireMessage {
            role: self.role.as_str().into(),
            content: self.content.clone(),
        }
    }
}

/// The ordered transcript plus turn-scoped flags. The only mutable shared
/// state in the system.
#[derive(Debug, Default)]
pub struct Conversation {
    messages: Vec<ChatMessage>,
    pending_tool_call: Option<ToolCall>,
    streaming: bool,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message in insertion order.
    pub fn push_message(&mut self, message: ChatMessage) {
        self.messages.push(message);
    }

    /// Replace the content of the most recently appended message.
    pub fn set_last_content(&mut self, content: impl Into<String>) {
        if let Some(last) = self.messages.last_mut() {
            last.content = content.into();
        }
    }

    /// Append a delta to the most recently appended message's content.
    pub fn append_to_last(&mut self, delta: &str) {
        if let Some(last) = self.messages.last_mut() {
            last.content.push_str(delta);
        }
    }

    /// Embed a tool call in the most recently appended message.
    pub fn push_tool_call_to_last(&mut self, call: ToolCall) {
        if let Some(last) = self.messages.last_mut() {
            last.tool_calls.push(call);
        }
    }

    /// Set the single store-wide pending tool call.
    pub fn set_pending_tool_call(&mut self, call: ToolCall) {
        self.pending_tool_call = Some(call);
    }

    pub fn clear_pending_tool_call(&mut self) {
        self.pending_tool_call = None;
    }

    /// Update a tool call's status (and result/error) by identifier,
    /// wherever it lives in the transcript. Identifiers are UUIDs, so at
    /// most one entry matches in practice.
    pub fn update_tool_call(
        &mut self,
        id: &str,
        status: ToolCallStatus,
        result: Option<Value>,
        error: Option<String>,
    ) {
        for message in &mut self.messages {
            for call in message.tool_calls.iter_mut().filter(|c| c.id == id) {
                call.status = status;
                call.result = result.clone();
                call.error = error.clone();
            }
        }
    }

    pub fn set_streaming(&mut self, streaming: bool) {
        self.streaming = streaming;
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn last_message(&self) -> Option<&ChatMessage> {
        self.messages.last()
    }

    pub fn pending_tool_call(&self) -> Option<&ToolCall> {
        self.pending_tool_call.as_ref()
    }

    /// The full history as wire messages (role+content only).
    pub fn wire_history(&self) -> Vec<WireMessage> {
        self.messages.iter().map(ChatMessage::to_wire).collect()
    }

    /// Reset the transcript, the pending tool call, and the streaming flag.
    pub fn clear(&mut self) {
        self.messages.clear();
        self.pending_tool_call = None;
        self.streaming = false;
    }
}

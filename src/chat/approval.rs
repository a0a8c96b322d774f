//! Human approval handles for pending tool calls.
//!
//! When the loop detects a tool call it sends a [`ToolApprovalRequest`]
//! to whatever surface the host wires up (a card in the UI, a test body)
//! and suspends on the oneshot until exactly one verdict arrives. At most
//! one request is outstanding at a time — the loop serializes tool calls.

use serde_json::{Map, Value};
use tokio::sync::oneshot;

/// User's verdict on a pending tool call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalVerdict {
    Approved,
    Rejected,
}

/// Request sent to the approval surface for a user decision.
#[derive(Debug)]
pub struct ToolApprovalRequest {
    /// Identifier of the tool call awaiting the verdict.
    pub call_id: String,
    /// Tool being invoked.
    pub tool_name: String,
    /// The arguments the model proposed.
    pub arguments: Map<String, Value>,
    /// Oneshot channel to send the verdict back to the loop.
    pub response_tx: oneshot::Sender<ApprovalVerdict>,
}

impl ToolApprovalRequest {
    /// Resolve with approval. Consumes the request.
    pub fn approve(self) {
        let _ = self.response_tx.send(ApprovalVerdict::Approved);
    }

    /// Resolve with rejection. Consumes the request.
    pub fn reject(self) {
        let _ = self.response_tx.send(ApprovalVerdict::Rejected);
    }
}

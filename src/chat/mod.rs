//! Chat core — transcript state, approval handles, and the turn loop.
//!
//! - `store`: the conversation transcript, pending tool call, streaming flag
//! - `approval`: oneshot-resolved approve/reject handles
//! - `session`: the orchestration loop driving decoder, store, and gateway

pub mod approval;
pub mod session;
pub mod store;

pub use approval::{ApprovalVerdict, ToolApprovalRequest};
pub use session::ChatSession;
pub use store::{ChatMessage, Conversation, Role, ToolCall, ToolCallStatus};

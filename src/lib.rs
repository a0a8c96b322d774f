//! Expense chat client core — manage expenses by talking to a model that
//! calls remote tools, with a human approving every call.
//!
//! The moving parts, leaves first:
//!
//! - [`llm`]: streaming chat-completions client and SSE decoder
//! - [`tools`]: the fixed expense tool catalog and its HTTP gateway
//! - [`chat`]: conversation store, approval handles, orchestration loop
//! - [`config`]: API key, endpoints, approval-wait policy
//!
//! Rendering, settings persistence, the expense database, and the model
//! itself live outside this crate; a host wires a [`chat::ChatSession`]
//! to its own surfaces.
//!
//! ```no_run
//! use std::sync::Arc;
//! use expense_chat::chat::ChatSession;
//! use expense_chat::config::Settings;
//! use expense_chat::llm::OpenAiClient;
//! use expense_chat::tools::HttpToolGateway;
//!
//! # async fn run() {
//! let settings = Settings::from_env();
//! let gateway = Arc::new(HttpToolGateway::new(settings.tool_server_url.clone()));
//! let (approval_tx, mut _approval_rx) = tokio::sync::mpsc::channel(1);
//! let session = ChatSession::new(
//!     Arc::new(OpenAiClient::new()),
//!     gateway,
//!     approval_tx,
//!     settings,
//! );
//!
//! // The host renders `session.conversation()`, resolves requests from
//! // `approval_rx`, and forwards user input:
//! session.send_message("Add $50 for groceries today").await;
//! # }
//! ```

pub mod chat;
pub mod config;
pub mod llm;
pub mod tools;

//! Client configuration — API key, endpoints, and the approval-wait policy.
//!
//! Settings come from the environment at startup and can be overridden at
//! runtime (the settings form is a presentation concern; persistence lives
//! outside this crate).

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default base URL for the expense tool server.
pub const DEFAULT_TOOL_SERVER_URL: &str = "http://localhost:3001";

/// Default base URL for the chat-completions provider.
pub const DEFAULT_API_BASE_URL: &str = "https://api.openai.com";

/// Default model identifier.
pub const DEFAULT_MODEL: &str = "gpt-4";

/// Runtime configuration for the chat client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Bearer token for the chat-completions provider. Sending is gated
    /// until this is present.
    pub api_key: Option<String>,
    /// Model identifier sent with every completion request.
    pub model: String,
    /// Base URL of the chat-completions provider.
    pub api_base_url: String,
    /// Base URL of the expense tool server.
    pub tool_server_url: String,
    /// Seconds to wait for a tool-approval verdict before auto-rejecting.
    /// None waits indefinitely.
    pub approval_timeout_secs: Option<u64>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_key: None,
            model: DEFAULT_MODEL.into(),
            api_base_url: DEFAULT_API_BASE_URL.into(),
            tool_server_url: DEFAULT_TOOL_SERVER_URL.into(),
            approval_timeout_secs: None,
        }
    }
}

impl Settings {
    /// Read settings from the environment: `OPENAI_API_KEY` and
    /// `EXPENSE_TOOL_SERVER_URL`. Missing variables fall back to defaults.
    pub fn from_env() -> Self {
        Self {
            api_key: std::env::var("OPENAI_API_KEY").ok().filter(|k| !k.is_empty()),
            tool_server_url: std::env::var("EXPENSE_TOOL_SERVER_URL")
                .ok()
                .filter(|u| !u.is_empty())
                .unwrap_or_else(|| DEFAULT_TOOL_SERVER_URL.into()),
            ..Self::default()
        }
    }

    /// Override the API key at runtime (e.g. from the settings form).
    pub fn set_api_key(&mut self, key: impl Into<String>) {
        self.api_key = Some(key.into());
    }

    /// Override the tool server base URL at runtime.
    pub fn set_tool_server_url(&mut self, url: impl Into<String>) {
        self.tool_server_url = url.into();
    }

    /// The approval wait bound as a `Duration`, if configured.
    pub fn approval_timeout(&self) -> Option<Duration> {
        self.approval_timeout_secs.map(Duration::from_secs)
    }
}

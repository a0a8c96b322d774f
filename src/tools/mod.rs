//! Tool gateway — the fixed catalog of expense tools and their remote
//! invocation.
//!
//! Tools don't think, they execute. The catalog is static (no wire call);
//! `call_tool` is a single POST to the expense server with no retries —
//! calls are human-gated and infrequent, so transport-level behavior is
//! left to reqwest.

pub mod expense;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::debug;

/// Errors from tool invocation.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("tool call failed (status {status}): {message}")]
    Status { status: u16, message: String },

    /// The server answered but declared failure. Display is exactly the
    /// remote-provided message.
    #[error("{0}")]
    Failed(String),
}

/// A tool schema in the chat-completions function format:
/// `{"type":"function","function":{name, description, parameters}}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    #[serde(rename = "type")]
    pub kind: String,
    pub function: FunctionSpec,
}

/// The function half of a [`ToolDefinition`]. `parameters` is a
/// JSON-schema value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionSpec {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

impl ToolDefinition {
    fn function(name: &str, description: &str, parameters: Value) -> Self {
        Self {
            kind: "function".into(),
            function: FunctionSpec {
                name: name.into(),
                description: description.into(),
                parameters,
            },
        }
    }

    /// Tool name (as used in routing and on the wire).
    pub fn name(&self) -> &str {
        &self.function.name
    }
}

/// The static tool catalog. Defined once, shared read-only; no network.
pub fn catalog() -> Vec<ToolDefinition> {
    vec![
        ToolDefinition::function(
            "add_expense",
            "Add a new expense to the database",
            json!({
                "type": "object",
                "properties": {
                    "date": { "type": "string", "description": "Date in YYYY-MM-DD format" },
                    "amount": { "type": "number", "description": "Expense amount (positive number)" },
                    "category": { "type": "string", "description": "Main expense category" },
                    "subcategory": { "type": "string", "description": "Optional subcategory" },
                    "note": { "type": "string", "description": "Optional note or description" }
                },
                "required": ["date", "amount", "category"]
            }),
        ),
        ToolDefinition::function(
            "list_expenses",
            "List expenses within a date range, optionally filtered by category",
            json!({
                "type": "object",
                "properties": {
                    "start_date": { "type": "string", "description": "Start date in YYYY-MM-DD format" },
                    "end_date": { "type": "string", "description": "End date in YYYY-MM-DD format" },
                    "category": { "type": "string", "description": "Optional category filter" }
                },
                "required": ["start_date", "end_date"]
            }),
        ),
        ToolDefinition::function(
            "summarize_expenses",
            "Get expense summary by category for a date range",
            json!({
                "type": "object",
                "properties": {
                    "start_date": { "type": "string", "description": "Start date in YYYY-MM-DD format" },
                    "end_date": { "type": "string", "description": "End date in YYYY-MM-DD format" },
                    "category": { "type": "string", "description": "Optional category filter" }
                },
                "required": ["start_date", "end_date"]
            }),
        ),
    ]
}

/// Executes approved tool calls. The seam between the orchestration loop
/// and the expense server; tests substitute scripted implementations.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    /// The static catalog this executor serves.
    fn definitions(&self) -> Vec<ToolDefinition>;

    /// Invoke a tool by name. Returns the remote result payload unchanged
    /// (opaque at this layer — may be any JSON value).
    async fn call_tool(
        &self,
        name: &str,
        arguments: &Map<String, Value>,
    ) -> Result<Value, ToolError>;
}

/// Response envelope from the expense server's `/call_tool` endpoint.
#[derive(Debug, Deserialize)]
struct CallToolResponse {
    success: bool,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<String>,
}

/// HTTP gateway to the expense tool server.
#[derive(Debug, Clone)]
pub struct HttpToolGateway {
    http: Client,
    base_url: String,
}

impl HttpToolGateway {
    /// Create a gateway for the given base URL (e.g. `http://localhost:3001`).
    pub fn new(base_url: String) -> Self {
        Self {
            http: Client::new(),
            base_url,
        }
    }

    /// The configured base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl ToolExecutor for HttpToolGateway {
    fn definitions(&self) -> Vec<ToolDefinition> {
        catalog()
    }

    async fn call_tool(
        &self,
        name: &str,
        arguments: &Map<String, Value>,
    ) -> Result<Value, ToolError> {
        debug!(tool = name, "calling tool");

        let url = format!("{}/call_tool", self.base_url);
        let response = self
            .http
            .post(&url)
            .json(&json!({ "name": name, "arguments": arguments }))
            .send()
            .await?;

        let status = response.status().as_u16();
        if status >= 400 {
            let message = response.text().await.unwrap_or_else(|_| "(no body)".into());
            return Err(ToolError::Status { status, message });
        }

        let body: CallToolResponse = response.json().await?;
        if !body.success {
            return Err(ToolError::Failed(
                body.error.unwrap_or_else(|| "Tool call failed".into()),
            ));
        }

        Ok(body.result.unwrap_or(Value::Null))
    }
}

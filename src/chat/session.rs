//! Orchestration loop — one turn at a time, one event at a time.
//!
//! `send_message` appends the user message, opens a decoder session over
//! the full history, and folds every event into the conversation store.
//! A tool-call event suspends the loop on a oneshot verdict before any
//! further event is processed; every failure ends up as a transcript
//! annotation, never an escaping error. The streaming flag is cleared on
//! every exit path.

use std::sync::Arc;

use futures_util::StreamExt;
use serde_json::{Map, Value};
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{info, warn};

use super::approval::{ApprovalVerdict, ToolApprovalRequest};
use super::store::{ChatMessage, Conversation, ToolCall, ToolCallStatus};
use crate::config::Settings;
use crate::llm::{ChatStreamer, StreamEvent, WireMessage};
use crate::tools::{ToolDefinition, ToolExecutor};

/// One conversation and the loop that drives it.
///
/// Cheap to clone; clones share the same conversation. The approval
/// surface is whatever receives from the channel handed to [`new`].
///
/// [`new`]: ChatSession::new
#[derive(Clone)]
pub struct ChatSession {
    streamer: Arc<dyn ChatStreamer>,
    gateway: Arc<dyn ToolExecutor>,
    conversation: Arc<Mutex<Conversation>>,
    approval_tx: mpsc::Sender<ToolApprovalRequest>,
    tools: Vec<ToolDefinition>,
    ready: bool,
    settings: Arc<Mutex<Settings>>,
}

impl ChatSession {
    /// Create a session. Loads the tool catalog from the executor once;
    /// an executor with no tools leaves the session not ready.
    pub fn new(
        streamer: Arc<dyn ChatStreamer>,
        gateway: Arc<dyn ToolExecutor>,
        approval_tx: mpsc::Sender<ToolApprovalRequest>,
        settings: Settings,
    ) -> Self {
        let tools = gateway.definitions();
        let ready = !tools.is_empty();
        Self {
            streamer,
            gateway,
            conversation: Arc::new(Mutex::new(Conversation::new())),
            approval_tx,
            tools,
            ready,
            settings: Arc::new(Mutex::new(settings)),
        }
    }

    /// Handle to the conversation state, for rendering and inspection.
    pub fn conversation(&self) -> Arc<Mutex<Conversation>> {
        Arc::clone(&self.conversation)
    }

    /// Handle to the runtime settings (API key and URLs are settable).
    pub fn settings(&self) -> Arc<Mutex<Settings>> {
        Arc::clone(&self.settings)
    }

    /// Whether the tool catalog has been loaded.
    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// Run one full turn for the given user text.
    ///
    /// Refused (logged, not an error) when no API key is configured, the
    /// catalog never loaded, or a previous turn is still streaming.
    pub async fn send_message(&self, text: &str) {
        let api_key = { self.settings.lock().await.api_key.clone() };
        let Some(api_key) = api_key else {
            warn!("no API key configured, dropping message");
            return;
        };
        if !self.ready {
            warn!("tool catalog not loaded, dropping message");
            return;
        }

        let history;
        {
            let mut conv = self.conversation.lock().await;
            if conv.is_streaming() {
                warn!("a turn is already streaming, dropping message");
                return;
            }
            conv.push_message(ChatMessage::user(text));
            // The prompt history ends at the user message; the empty
            // assistant message below is this turn's mutable sink.
            history = conv.wire_history();
            conv.push_message(ChatMessage::assistant_empty());
            conv.set_streaming(true);
        }

        self.run_turn(history, api_key).await;

        self.conversation.lock().await.set_streaming(false);
    }

    /// Consume the event stream for one turn. Infallible by construction:
    /// every failure has already been folded into the store.
    async fn run_turn(&self, history: Vec<WireMessage>, api_key: String) {
        let mut events = self
            .streamer
            .stream_chat(history, self.tools.clone(), &api_key);

        while let Some(event) = events.next().await {
            match event {
                StreamEvent::Content { delta } => {
                    self.conversation.lock().await.append_to_last(&delta);
                }
                StreamEvent::ToolCall {
                    id,
                    name,
                    arguments,
                } => {
                    self.handle_tool_call(id, name, arguments).await;
                }
                StreamEvent::Error { message } => {
                    // Tolerated: later events in the same stream still apply.
                    self.conversation
                        .lock()
                        .await
                        .append_to_last(&format!("\n\n❌ Error: {message}"));
                }
                StreamEvent::Done => break,
            }
        }
    }

    /// Drive one tool call from detection through its terminal state.
    async fn handle_tool_call(&self, id: String, name: String, arguments: Map<String, Value>) {
        info!(call_id = %id, tool = %name, "tool call detected");

        let call = ToolCall::pending(id.clone(), name.clone(), arguments.clone());
        {
            let mut conv = self.conversation.lock().await;
            conv.push_tool_call_to_last(call.clone());
            conv.set_pending_tool_call(call);
        }

        match self.await_verdict(&id, &name, arguments.clone()).await {
            ApprovalVerdict::Approved => {
                {
                    let mut conv = self.conversation.lock().await;
                    conv.update_tool_call(&id, ToolCallStatus::Approved, None, None);
                    conv.update_tool_call(&id, ToolCallStatus::Executing, None, None);
                }
                match self.gateway.call_tool(&name, &arguments).await {
                    Ok(result) => {
                        info!(call_id = %id, "tool executed");
                        let rendered = render_result(&result);
                        let mut conv = self.conversation.lock().await;
                        conv.update_tool_call(&id, ToolCallStatus::Completed, Some(result), None);
                        conv.append_to_last(&format!("\n\n✓ Tool executed: {rendered}"));
                    }
                    Err(e) => {
                        warn!(call_id = %id, error = %e, "tool execution failed");
                        let message = e.to_string();
                        let mut conv = self.conversation.lock().await;
                        conv.update_tool_call(
                            &id,
                            ToolCallStatus::Error,
                            None,
                            Some(message.clone()),
                        );
                        conv.append_to_last(&format!("\n\n✗ Tool execution failed: {message}"));
                    }
                }
            }
            ApprovalVerdict::Rejected => {
                info!(call_id = %id, "tool call rejected");
                let mut conv = self.conversation.lock().await;
                conv.update_tool_call(&id, ToolCallStatus::Rejected, None, None);
                conv.append_to_last("\n\n⚠️ Tool call rejected by user");
            }
        }

        self.conversation.lock().await.clear_pending_tool_call();
    }

    /// Suspend until the approval surface resolves this call. A missing
    /// surface, a dropped handle, or an elapsed wait bound all count as
    /// rejection.
    async fn await_verdict(
        &self,
        call_id: &str,
        tool_name: &str,
        arguments: Map<String, Value>,
    ) -> ApprovalVerdict {
        let (tx, rx) = oneshot::channel();
        let request = ToolApprovalRequest {
            call_id: call_id.into(),
            tool_name: tool_name.into(),
            arguments,
            response_tx: tx,
        };

        if self.approval_tx.send(request).await.is_err() {
            warn!(call_id = %call_id, "approval surface is gone, auto-rejecting");
            return ApprovalVerdict::Rejected;
        }

        let limit = { self.settings.lock().await.approval_timeout() };
        let received = match limit {
            Some(limit) => match tokio::time::timeout(limit, rx).await {
                Ok(received) => received,
                Err(_) => {
                    warn!(call_id = %call_id, "approval wait timed out, auto-rejecting");
                    return ApprovalVerdict::Rejected;
                }
            },
            None => rx.await,
        };

        received.unwrap_or_else(|_| {
            warn!(call_id = %call_id, "approval handle dropped, auto-rejecting");
            ApprovalVerdict::Rejected
        })
    }
}

/// Render a tool result for the transcript annotation: structured values
/// as pretty JSON, strings bare, scalars via their display form.
fn render_result(result: &Value) -> String {
    match result {
        Value::String(s) => s.clone(),
        Value::Object(_) | Value::Array(_) => {
            serde_json::to_string_pretty(result).unwrap_or_else(|_| result.to_string())
        }
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::store::Role;
    use crate::tools::{self, ToolError};
    use futures_util::stream::BoxStream;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct ScriptedStreamer(Vec<StreamEvent>);

    impl ChatStreamer for ScriptedStreamer {
        fn stream_chat(
            &self,
            _messages: Vec<WireMessage>,
            _tools: Vec<ToolDefinition>,
            _api_key: &str,
        ) -> BoxStream<'static, StreamEvent> {
            Box::pin(futures_util::stream::iter(self.0.clone()))
        }
    }

    struct MockGateway {
        outcome: Result<Value, String>,
        calls: AtomicUsize,
    }

    impl MockGateway {
        fn ok(result: Value) -> Arc<Self> {
            Arc::new(Self {
                outcome: Ok(result),
                calls: AtomicUsize::new(0),
            })
        }

        fn failing(error: &str) -> Arc<Self> {
            Arc::new(Self {
                outcome: Err(error.into()),
                calls: AtomicUsize::new(0),
            })
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait::async_trait]
    impl ToolExecutor for MockGateway {
        fn definitions(&self) -> Vec<ToolDefinition> {
            tools::catalog()
        }

        async fn call_tool(
            &self,
            _name: &str,
            _arguments: &Map<String, Value>,
        ) -> Result<Value, ToolError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.outcome {
                Ok(v) => Ok(v.clone()),
                Err(e) => Err(ToolError::Failed(e.clone())),
            }
        }
    }

    fn test_settings() -> Settings {
        Settings {
            api_key: Some("sk-test".into()),
            ..Settings::default()
        }
    }

    fn session_with(
        events: Vec<StreamEvent>,
        gateway: Arc<MockGateway>,
        settings: Settings,
    ) -> (ChatSession, mpsc::Receiver<ToolApprovalRequest>) {
        let (tx, rx) = mpsc::channel(4);
        let session = ChatSession::new(Arc::new(ScriptedStreamer(events)), gateway, tx, settings);
        (session, rx)
    }

    fn content(delta: &str) -> StreamEvent {
        StreamEvent::Content {
            delta: delta.into(),
        }
    }

    fn add_expense_call(id: &str) -> StreamEvent {
        let mut arguments = Map::new();
        arguments.insert("date".into(), json!("2024-01-15"));
        arguments.insert("amount".into(), json!(50));
        arguments.insert("category".into(), json!("groceries"));
        StreamEvent::ToolCall {
            id: id.into(),
            name: "add_expense".into(),
            arguments,
        }
    }

    async fn last_content(session: &ChatSession) -> String {
        let conv = session.conversation();
        let conv = conv.lock().await;
        conv.last_message().unwrap().content.clone()
    }

    async fn embedded_call(session: &ChatSession, id: &str) -> ToolCall {
        let conv = session.conversation();
        let conv = conv.lock().await;
        conv.messages()
            .iter()
            .flat_map(|m| m.tool_calls.iter())
            .find(|c| c.id == id)
            .cloned()
            .unwrap()
    }

    #[tokio::test]
    async fn content_only_turn_concatenates_deltas_in_order() {
        let gateway = MockGateway::ok(Value::Null);
        let (session, _rx) = session_with(
            vec![content("Hel"), content("lo "), content("there"), StreamEvent::Done],
            gateway,
            test_settings(),
        );

        session.send_message("hi").await;

        let conv = session.conversation();
        let conv = conv.lock().await;
        assert_eq!(conv.messages().len(), 2);
        assert_eq!(conv.messages()[0].role, Role::User);
        assert_eq!(conv.messages()[1].role, Role::Assistant);
        assert_eq!(conv.messages()[1].content, "Hello there");
        assert!(!conv.is_streaming());
    }

    #[tokio::test]
    async fn send_without_api_key_is_a_logged_noop() {
        let gateway = MockGateway::ok(Value::Null);
        let (session, _rx) = session_with(
            vec![content("never"), StreamEvent::Done],
            gateway,
            Settings::default(),
        );

        session.send_message("hi").await;

        assert!(session.conversation().lock().await.messages().is_empty());
    }

    #[tokio::test]
    async fn send_while_streaming_is_a_logged_noop() {
        let gateway = MockGateway::ok(Value::Null);
        let (session, _rx) =
            session_with(vec![content("x"), StreamEvent::Done], gateway, test_settings());

        session.conversation().lock().await.set_streaming(true);
        session.send_message("hi").await;

        assert!(session.conversation().lock().await.messages().is_empty());
    }

    #[tokio::test]
    async fn approved_tool_call_executes_and_annotates() {
        let gateway = MockGateway::ok(json!({"id": "e1"}));
        let (session, mut rx) = session_with(
            vec![
                content("I'll add that expense."),
                add_expense_call("call_1"),
                StreamEvent::Done,
            ],
            Arc::clone(&gateway),
            test_settings(),
        );

        let driver = {
            let session = session.clone();
            tokio::spawn(async move { session.send_message("Add $50 for groceries today").await })
        };

        let request = rx.recv().await.expect("approval request");
        assert_eq!(request.call_id, "call_1");
        assert_eq!(request.tool_name, "add_expense");
        assert_eq!(request.arguments["amount"], 50);
        {
            // Mid-suspension: the flag is up and exactly this call is pending.
            let conv = session.conversation();
            let conv = conv.lock().await;
            assert!(conv.is_streaming());
            assert_eq!(conv.pending_tool_call().unwrap().id, "call_1");
        }
        request.approve();
        driver.await.unwrap();

        let text = last_content(&session).await;
        assert!(text.contains("✓ Tool executed:"));
        assert!(text.contains("e1"));

        let call = embedded_call(&session, "call_1").await;
        assert_eq!(call.status, ToolCallStatus::Completed);
        assert_eq!(call.result.unwrap()["id"], "e1");

        assert_eq!(gateway.call_count(), 1);
        let conv = session.conversation();
        let conv = conv.lock().await;
        assert!(conv.pending_tool_call().is_none());
        assert!(!conv.is_streaming());
    }

    #[tokio::test]
    async fn rejected_tool_call_never_invokes_gateway() {
        let gateway = MockGateway::ok(json!({"id": "e1"}));
        let (session, mut rx) = session_with(
            vec![add_expense_call("call_1"), StreamEvent::Done],
            Arc::clone(&gateway),
            test_settings(),
        );

        let driver = {
            let session = session.clone();
            tokio::spawn(async move { session.send_message("Add $50 for groceries today").await })
        };

        rx.recv().await.expect("approval request").reject();
        driver.await.unwrap();

        let text = last_content(&session).await;
        assert!(text.contains("⚠️ Tool call rejected by user"));
        let call = embedded_call(&session, "call_1").await;
        assert_eq!(call.status, ToolCallStatus::Rejected);
        assert_eq!(gateway.call_count(), 0);
    }

    #[tokio::test]
    async fn failing_tool_call_records_error_and_continues() {
        let gateway = MockGateway::failing("network down");
        let (session, mut rx) = session_with(
            vec![
                add_expense_call("call_1"),
                content(" Anything else?"),
                StreamEvent::Done,
            ],
            Arc::clone(&gateway),
            test_settings(),
        );

        let driver = {
            let session = session.clone();
            tokio::spawn(async move { session.send_message("Add $50").await })
        };

        rx.recv().await.expect("approval request").approve();
        driver.await.unwrap();

        let call = embedded_call(&session, "call_1").await;
        assert_eq!(call.status, ToolCallStatus::Error);
        assert_eq!(call.error.as_deref(), Some("network down"));

        let text = last_content(&session).await;
        assert!(text.contains("✗ Tool execution failed:"));
        // The turn keeps consuming events after the failure.
        assert!(text.contains("Anything else?"));
        assert!(!session.conversation().lock().await.is_streaming());
    }

    #[tokio::test]
    async fn stream_error_is_annotated_but_not_fatal() {
        let gateway = MockGateway::ok(Value::Null);
        let (session, _rx) = session_with(
            vec![
                StreamEvent::Error {
                    message: "upstream hiccup".into(),
                },
                content("still here"),
                StreamEvent::Done,
            ],
            gateway,
            test_settings(),
        );

        session.send_message("hi").await;

        let text = last_content(&session).await;
        assert!(text.contains("❌ Error: upstream hiccup"));
        assert!(text.contains("still here"));
        assert!(!session.conversation().lock().await.is_streaming());
    }

    #[tokio::test]
    async fn sequential_tool_calls_resolve_strictly_in_order() {
        let gateway = MockGateway::ok(json!({"ok": true}));
        let (session, mut rx) = session_with(
            vec![
                add_expense_call("call_1"),
                add_expense_call("call_2"),
                StreamEvent::Done,
            ],
            Arc::clone(&gateway),
            test_settings(),
        );

        let driver = {
            let session = session.clone();
            tokio::spawn(async move { session.send_message("add two expenses").await })
        };

        let first = rx.recv().await.expect("first request");
        assert_eq!(first.call_id, "call_1");
        {
            // call_2 must not even exist while call_1 is unresolved.
            let conv = session.conversation();
            let conv = conv.lock().await;
            assert_eq!(conv.pending_tool_call().unwrap().id, "call_1");
            let total: usize = conv.messages().iter().map(|m| m.tool_calls.len()).sum();
            assert_eq!(total, 1);
        }
        first.approve();

        let second = rx.recv().await.expect("second request");
        assert_eq!(second.call_id, "call_2");
        second.approve();
        driver.await.unwrap();

        assert_eq!(gateway.call_count(), 2);
        assert_eq!(
            embedded_call(&session, "call_1").await.status,
            ToolCallStatus::Completed
        );
        assert_eq!(
            embedded_call(&session, "call_2").await.status,
            ToolCallStatus::Completed
        );
    }

    #[tokio::test]
    async fn approval_timeout_auto_rejects() {
        let gateway = MockGateway::ok(Value::Null);
        let settings = Settings {
            approval_timeout_secs: Some(0),
            ..test_settings()
        };
        let (session, _rx) = session_with(
            vec![add_expense_call("call_1"), StreamEvent::Done],
            Arc::clone(&gateway),
            settings,
        );

        session.send_message("Add $50").await;

        let call = embedded_call(&session, "call_1").await;
        assert_eq!(call.status, ToolCallStatus::Rejected);
        assert_eq!(gateway.call_count(), 0);
        assert!(!session.conversation().lock().await.is_streaming());
    }

    #[tokio::test]
    async fn dropped_approval_surface_auto_rejects() {
        let gateway = MockGateway::ok(Value::Null);
        let (session, rx) = session_with(
            vec![add_expense_call("call_1"), StreamEvent::Done],
            Arc::clone(&gateway),
            test_settings(),
        );
        drop(rx);

        session.send_message("Add $50").await;

        let call = embedded_call(&session, "call_1").await;
        assert_eq!(call.status, ToolCallStatus::Rejected);
        assert_eq!(gateway.call_count(), 0);
        assert!(!session.conversation().lock().await.is_streaming());
    }

    #[test]
    fn render_result_shapes() {
        assert_eq!(render_result(&json!("plain")), "plain");
        assert_eq!(render_result(&json!(42)), "42");
        let pretty = render_result(&json!({"id": "e1"}));
        assert!(pretty.contains("\"id\": \"e1\""));
    }
}

//! Tool execution context and event helpers.

use crate::Tool;
use crate::output_policy::ToolOutputPolicy;
use crate::schema::validate_args;
use log::{debug, warn};
use serde_json::{Value, json};
use sidekick_rs_protocol::{
    EventMsg, EventPayload, EventSink, SessionId, ToolCallId, ToolError, TurnId,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

/// Shared service dependencies for a turn (constructed once, shared via Arc).
pub struct TurnServices {
    /// Base directory relative document paths resolve against.
    pub workspace_root: PathBuf,
    /// Output policy applied to tool results.
    pub output_policy: Option<ToolOutputPolicy>,
    /// Optional event sink for tool events.
    pub event_sink: Option<Arc<dyn EventSink>>,
}

impl TurnServices {
    /// Services rooted at a directory with no policy and no sink.
    pub fn new(workspace_root: impl Into<PathBuf>) -> Self {
        Self {
            workspace_root: workspace_root.into(),
            output_policy: None,
            event_sink: None,
        }
    }
}

/// Shared context passed to tools during execution.
///
/// Per-invocation identity fields are stored directly.
/// Shared service references live behind an `Arc<TurnServices>` so cloning
/// per tool call is a cheap reference-count bump.
#[derive(Clone)]
pub struct ToolContext {
    /// Session id associated with the tool call.
    pub session_id: SessionId,
    /// Optional turn id for the tool call.
    pub turn_id: Option<TurnId>,
    /// Tool call id for this invocation, set once the call starts.
    pub tool_call_id: Option<ToolCallId>,
    /// Tool name for the current invocation.
    pub tool_name: Option<String>,
    /// Shared turn-scoped services.
    pub services: Arc<TurnServices>,
}

impl ToolContext {
    /// Build a context for a session turn.
    pub fn new(session_id: SessionId, turn_id: Option<TurnId>, services: Arc<TurnServices>) -> Self {
        Self {
            session_id,
            turn_id,
            tool_call_id: None,
            tool_name: None,
            services,
        }
    }

    /// Apply the configured output policy to a tool result value.
    pub fn apply_output_policy(&self, value: Value) -> Value {
        match self.services.output_policy.as_ref() {
            Some(policy) => policy.apply(value),
            None => value,
        }
    }

    /// Resolve a user-supplied path against the workspace root.
    pub fn resolve_path(&self, raw: &str) -> PathBuf {
        let path = Path::new(raw.trim());
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.services.workspace_root.join(path)
        }
    }

    /// Emit a tool-call started event and return the tool call id.
    pub fn emit_tool_started(&self, name: &str, args: &Value) -> ToolCallId {
        let tool_call_id = self.tool_call_id.unwrap_or_else(Uuid::new_v4);
        let (Some(turn_id), Some(sink)) = (self.turn_id, self.services.event_sink.as_ref()) else {
            return tool_call_id;
        };
        sink.emit(EventMsg::new(
            self.session_id,
            EventPayload::ToolCallStarted {
                turn_id,
                tool_call_id,
                tool_name: name.to_string(),
                arguments: args.clone(),
            },
        ));
        tool_call_id
    }

    /// Emit a tool-call finished event.
    pub fn emit_tool_finished(&self, tool_call_id: ToolCallId, result: Value, success: bool) {
        let (Some(turn_id), Some(sink)) = (self.turn_id, self.services.event_sink.as_ref()) else {
            return;
        };
        sink.emit(EventMsg::new(
            self.session_id,
            EventPayload::ToolCallFinished {
                turn_id,
                tool_call_id,
                result,
                success,
            },
        ));
    }

    /// Execute a tool: validate arguments, call, apply output policy, emit events.
    ///
    /// Arguments that fail schema validation never reach `Tool::call`.
    pub async fn execute_tool(&mut self, tool: &dyn Tool, args: Value) -> Result<Value, ToolError> {
        self.tool_name = Some(tool.name().to_string());
        let tool_call_id = self.emit_tool_started(tool.name(), &args);
        self.tool_call_id = Some(tool_call_id);

        if let Err(err) = validate_args(&tool.args_schema(), &args) {
            warn!(
                "tool arguments rejected (tool_name={}, session_id={}): {}",
                tool.name(),
                self.session_id,
                err
            );
            self.emit_tool_finished(tool_call_id, json!({ "error": err.to_string() }), false);
            return Err(err);
        }

        debug!(
            "executing tool (tool_name={}, session_id={})",
            tool.name(),
            self.session_id
        );
        match tool.call(self, args).await {
            Ok(result) => {
                let output = self.apply_output_policy(result);
                self.emit_tool_finished(tool_call_id, output.clone(), true);
                Ok(output)
            }
            Err(err) => {
                warn!(
                    "tool failed (tool_name={}, kind={}): {}",
                    tool.name(),
                    err.kind(),
                    err
                );
                self.emit_tool_finished(tool_call_id, json!({ "error": err.to_string() }), false);
                Err(err)
            }
        }
    }
}

impl std::fmt::Debug for ToolContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolContext")
            .field("session_id", &self.session_id)
            .field("turn_id", &self.turn_id)
            .field("tool_call_id", &self.tool_call_id)
            .field("tool_name", &self.tool_name)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::{ToolContext, TurnServices};
    use crate::Tool;
    use crate::output_policy::ToolOutputPolicy;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use sidekick_rs_protocol::{EventMsg, EventPayload, EventSink, ToolError};
    use std::collections::VecDeque;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::tempdir;
    use uuid::Uuid;

    #[derive(Default)]
    struct RecordingSink {
        events: parking_lot::Mutex<VecDeque<EventMsg>>,
    }

    impl EventSink for RecordingSink {
        fn emit(&self, event: EventMsg) {
            self.events.lock().push_back(event);
        }
    }

    #[derive(Debug, Default)]
    struct CountingTool {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Tool for CountingTool {
        fn name(&self) -> &str {
            "counting"
        }

        fn description(&self) -> &str {
            "counts invocations"
        }

        fn args_schema(&self) -> serde_json::Value {
            json!({
                "type": "object",
                "properties": { "query": { "type": "string" } },
                "required": ["query"]
            })
        }

        async fn call(
            &self,
            _ctx: &ToolContext,
            args: serde_json::Value,
        ) -> Result<serde_json::Value, ToolError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if args["query"] == "fail" {
                return Err(ToolError::Timeout("search took too long".to_string()));
            }
            Ok(json!({ "echo": args["query"], "api_key": "sk-secret" }))
        }
    }

    fn context_with_sink(sink: Arc<RecordingSink>) -> ToolContext {
        let temp = tempdir().expect("tempdir");
        let mut services = TurnServices::new(temp.path());
        services.event_sink = Some(sink);
        ToolContext::new(Uuid::new_v4(), Some(Uuid::new_v4()), Arc::new(services))
    }

    #[test]
    fn apply_output_policy_redacts() {
        let mut services = TurnServices::new("/tmp");
        services.output_policy = Some(ToolOutputPolicy {
            max_string_bytes: 4,
            max_array_len: 8,
            max_object_entries: 8,
            redact_keys: vec!["secret".to_string()],
            redact_values: Vec::new(),
            replacement: "[X]".to_string(),
        });
        let ctx = ToolContext::new(Uuid::nil(), None, Arc::new(services));
        let output = ctx.apply_output_policy(json!({ "secret": "value" }));
        assert_eq!(output, json!({ "secret": "[X]" }));
    }

    #[test]
    fn resolve_path_joins_relative_paths() {
        let ctx = ToolContext::new(Uuid::nil(), None, Arc::new(TurnServices::new("/work")));
        assert_eq!(
            ctx.resolve_path("notes/a.txt"),
            std::path::PathBuf::from("/work/notes/a.txt")
        );
        assert_eq!(
            ctx.resolve_path("/abs/b.pdf"),
            std::path::PathBuf::from("/abs/b.pdf")
        );
    }

    #[tokio::test]
    async fn execute_tool_emits_started_and_finished() {
        let sink = Arc::new(RecordingSink::default());
        let mut ctx = context_with_sink(sink.clone());
        let tool = CountingTool::default();

        let result = ctx
            .execute_tool(&tool, json!({ "query": "rust" }))
            .await
            .expect("execute");
        assert_eq!(result["echo"], "rust");

        let events = sink.events.lock();
        assert_eq!(events.len(), 2);
        let started_id = match &events[0].payload {
            EventPayload::ToolCallStarted {
                tool_call_id,
                tool_name,
                ..
            } => {
                assert_eq!(tool_name, "counting");
                *tool_call_id
            }
            other => panic!("unexpected event: {other:?}"),
        };
        match &events[1].payload {
            EventPayload::ToolCallFinished {
                tool_call_id,
                success,
                ..
            } => {
                assert_eq!(*tool_call_id, started_id);
                assert_eq!(*success, true);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn invalid_arguments_never_reach_the_tool() {
        let sink = Arc::new(RecordingSink::default());
        let mut ctx = context_with_sink(sink.clone());
        let tool = CountingTool::default();

        let err = ctx
            .execute_tool(&tool, json!({ "query": 42 }))
            .await
            .expect_err("invalid");
        assert!(matches!(err, ToolError::InvalidArguments(_)));
        assert_eq!(tool.calls.load(Ordering::SeqCst), 0);
        assert_eq!(sink.events.lock().len(), 2);
    }

    #[tokio::test]
    async fn execute_tool_emits_failure_event() {
        let sink = Arc::new(RecordingSink::default());
        let mut ctx = context_with_sink(sink.clone());
        let tool = CountingTool::default();

        let err = ctx
            .execute_tool(&tool, json!({ "query": "fail" }))
            .await
            .expect_err("failed");
        match err {
            ToolError::Timeout(message) => assert_eq!(message, "search took too long"),
            other => panic!("unexpected error: {other:?}"),
        }
        let events = sink.events.lock();
        match &events[1].payload {
            EventPayload::ToolCallFinished {
                success, result, ..
            } => {
                assert_eq!(*success, false);
                assert_eq!(result["error"], "timed out: search took too long");
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }
}

//! Dispatch of model-issued tool calls into registered tools.
//!
//! Every call yields a [`ToolOutcome`]; failures become data the model can
//! read instead of errors that abort the turn.

use crate::context::{ToolContext, TurnServices};
use crate::registry::ToolRegistry;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sidekick_rs_protocol::{SessionId, ToolCallId, ToolError, TurnId};
use std::sync::Arc;

/// Result record for one executed tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolOutcome {
    /// Whether the tool returned a result.
    pub success: bool,
    /// Name of the requested tool.
    pub tool_name: String,
    /// Tool output when successful.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Error message when the call failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolOutcome {
    /// Successful outcome.
    pub fn ok(tool_name: impl Into<String>, result: Value) -> Self {
        Self {
            success: true,
            tool_name: tool_name.into(),
            result: Some(result),
            error: None,
        }
    }

    /// Failed outcome carrying the error text.
    pub fn failed(tool_name: impl Into<String>, error: &ToolError) -> Self {
        Self {
            success: false,
            tool_name: tool_name.into(),
            result: None,
            error: Some(error.to_string()),
        }
    }

    /// JSON text handed back to the model as the tool result content.
    pub fn to_content(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            format!(
                "{{\"success\":false,\"tool_name\":{:?},\"error\":\"unserializable tool output\"}}",
                self.tool_name
            )
        })
    }
}

/// Executes tool calls against a registry with shared turn services.
#[derive(Clone)]
pub struct ToolExecutor {
    registry: ToolRegistry,
    services: Arc<TurnServices>,
}

impl ToolExecutor {
    /// Create an executor over a registry.
    pub fn new(registry: ToolRegistry, services: Arc<TurnServices>) -> Self {
        Self { registry, services }
    }

    /// Registry backing this executor.
    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Execute a tool by name with structured arguments.
    pub async fn execute(
        &self,
        session_id: SessionId,
        turn_id: Option<TurnId>,
        name: &str,
        args: Value,
    ) -> ToolOutcome {
        self.execute_with_id(session_id, turn_id, None, name, args)
            .await
    }

    /// Execute a model-issued call whose arguments may be a JSON string or object.
    pub async fn execute_call(
        &self,
        session_id: SessionId,
        turn_id: Option<TurnId>,
        tool_call_id: Option<ToolCallId>,
        name: &str,
        raw_arguments: &Value,
    ) -> ToolOutcome {
        match parse_arguments(raw_arguments) {
            Ok(args) => {
                self.execute_with_id(session_id, turn_id, tool_call_id, name, args)
                    .await
            }
            Err(err) => {
                warn!("tool call arguments unparseable (tool_name={name}): {err}");
                ToolOutcome::failed(name, &err)
            }
        }
    }

    async fn execute_with_id(
        &self,
        session_id: SessionId,
        turn_id: Option<TurnId>,
        tool_call_id: Option<ToolCallId>,
        name: &str,
        args: Value,
    ) -> ToolOutcome {
        let Some(tool) = self.registry.get(name) else {
            let err = ToolError::ToolNotFound(name.to_string());
            warn!("{err}");
            return ToolOutcome::failed(name, &err);
        };
        let mut ctx = ToolContext::new(session_id, turn_id, self.services.clone());
        ctx.tool_call_id = tool_call_id;
        match ctx.execute_tool(tool.as_ref(), args).await {
            Ok(result) => {
                info!("tool call succeeded (tool_name={name})");
                ToolOutcome::ok(name, result)
            }
            Err(err) => ToolOutcome::failed(name, &err),
        }
    }
}

/// Accept arguments as an object, a JSON-encoded object string, or empty.
pub fn parse_arguments(raw: &Value) -> Result<Value, ToolError> {
    match raw {
        Value::Null => Ok(Value::Object(Default::default())),
        Value::String(text) if text.trim().is_empty() => Ok(Value::Object(Default::default())),
        Value::String(text) => serde_json::from_str(text)
            .map_err(|err| ToolError::InvalidArguments(format!("arguments are not JSON: {err}"))),
        other => Ok(other.clone()),
    }
}

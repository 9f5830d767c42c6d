use sidekick_rs_tools::{ToolContext, TurnServices};
use std::sync::Arc;
use uuid::Uuid;

pub fn base_tool_context() -> ToolContext {
    ToolContext::new(Uuid::nil(), None, Arc::new(TurnServices::new(".")))
}

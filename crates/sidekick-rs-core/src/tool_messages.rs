//! Utilities for normalizing tool-use and tool-result messages.

use sidekick_rs_llm::{ChatMessage, MessageType, ToolCall, ToolResult};
use std::collections::HashMap;

pub(crate) const TOOL_RESULT_PLACEHOLDER: &str = "[tool output omitted]";

/// Pair every tool call with a result message directly after it.
///
/// Providers reject transcripts where a tool-use turn is not answered, which
/// happens when a turn was interrupted or a tool message was deleted.
pub(crate) fn ensure_tool_results(messages: Vec<ChatMessage>) -> Vec<ChatMessage> {
    let mut result_map = collect_tool_results(&messages);
    let mut output = Vec::with_capacity(messages.len());

    for message in messages {
        match &message.message_type {
            MessageType::ToolUse(calls) => {
                let resolved: Vec<ToolResult> = calls
                    .iter()
                    .map(|call| {
                        result_map
                            .remove(&call.id)
                            .unwrap_or_else(|| placeholder_tool_result(call))
                    })
                    .collect();
                output.push(message);
                if !resolved.is_empty() {
                    output.push(ChatMessage::tool_results(resolved));
                }
            }
            MessageType::ToolResult(_) => {}
            _ => output.push(message),
        }
    }

    output
}

pub(crate) fn placeholder_tool_result(call: &ToolCall) -> ToolResult {
    ToolResult {
        call_id: call.id.clone(),
        name: call.name.clone(),
        content: TOOL_RESULT_PLACEHOLDER.to_string(),
        is_error: false,
    }
}

fn collect_tool_results(messages: &[ChatMessage]) -> HashMap<String, ToolResult> {
    let mut results = HashMap::new();
    for message in messages {
        if let MessageType::ToolResult(items) = &message.message_type {
            for item in items {
                results
                    .entry(item.call_id.clone())
                    .or_insert_with(|| item.clone());
            }
        }
    }
    results
}

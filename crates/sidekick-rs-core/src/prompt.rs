//! System prompt assembly for chat turns.

use chrono::{DateTime, Utc};
use sidekick_rs_config::ChatConfig;
use sidekick_rs_llm::ChatMessage;
use sidekick_rs_protocol::Role;
use sidekick_rs_tools::ToolSpec;

const TOOL_RULES: &str = "Rules:\n\
1. When the user asks about information you may not know (current news, weather, prices, \
schedules, recent releases), call a search tool instead of guessing.\n\
2. Prefer tool results over outdated knowledge, and say when results are inconclusive.\n\
3. Use the recency filter for time-sensitive questions and the site filter when the user names \
a source.\n\
4. Call at most one tool per reply, then answer from its result.";

/// Build the system prompt for a turn, or `None` when nothing applies.
///
/// Tool guidance is only added when `history` carries no system message of
/// its own and at least one tool is available.
pub fn build_system_prompt(
    chat: &ChatConfig,
    tools: &[ToolSpec],
    history: &[ChatMessage],
    now: DateTime<Utc>,
) -> Option<String> {
    let mut sections = Vec::new();
    if let Some(base) = chat.system_prompt.as_deref().map(str::trim)
        && !base.is_empty()
    {
        sections.push(base.to_string());
    }

    let history_has_system = history.iter().any(|message| message.role == Role::System);
    if chat.tool_guidance && !history_has_system && !tools.is_empty() {
        sections.push(render_tool_guidance(tools, now));
    }

    if sections.is_empty() {
        None
    } else {
        Some(sections.join("\n\n"))
    }
}

fn render_tool_guidance(tools: &[ToolSpec], now: DateTime<Utc>) -> String {
    let mut lines = vec![
        "You are a helpful assistant with access to the following tools:".to_string(),
    ];
    for tool in tools {
        let summary = tool.description.lines().next().unwrap_or_default().trim();
        lines.push(format!("- {}: {}", tool.name, summary));
    }
    lines.push(String::new());
    lines.push(TOOL_RULES.to_string());
    lines.push(String::new());
    lines.push(format!("Current time (UTC): {}", now.format("%Y-%m-%d %H:%M (%A)")));
    lines.join("\n")
}

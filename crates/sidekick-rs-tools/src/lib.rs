//! Tooling interfaces, web search engines, and built-in tools for Sidekick.

pub mod builtins;
pub mod context;
pub mod executor;
pub mod output_policy;
pub mod registry;
pub mod schema;
pub mod search;
pub mod tool;

/// Built-in tool registry and registration helper.
pub use builtins::{builtin_tool_registry, register_builtin_tools};
/// Tool context and shared turn services.
pub use context::{ToolContext, TurnServices};
/// Tool call dispatch and result records.
pub use executor::{ToolExecutor, ToolOutcome, parse_arguments};
/// Tool output policy.
pub use output_policy::ToolOutputPolicy;
/// Tool registry type.
pub use registry::ToolRegistry;
/// Argument validation.
pub use schema::validate_args;
/// Search engine types.
pub use search::{
    BaiduSearch, GoogleSearch, Recency, SearchHit, SearchProvider, SearchRequest, SearchResponse,
    SearchRouter,
};
/// Tool trait and spec type.
pub use tool::{Tool, ToolSpec};

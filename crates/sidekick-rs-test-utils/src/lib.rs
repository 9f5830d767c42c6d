//! Test helpers shared across Sidekick crates.

pub mod context;
pub mod events;
pub mod llm;
pub mod search;
pub mod tools;

pub use context::base_tool_context;
pub use events::RecordingSink;
pub use llm::{FailingProvider, ScriptedProvider, gemini_like_capabilities, tool_call};
pub use search::StaticSearchProvider;
pub use tools::{DummyTool, FailingTool};

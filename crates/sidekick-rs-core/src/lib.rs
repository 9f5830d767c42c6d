//! Core chat primitives for Sidekick.
//!
//! This crate owns the chat engine and its tool-calling loop, attachment
//! staging, and conversation persistence used by the command-line front end.

pub mod attachments;
pub mod engine;
pub mod error;
pub mod prompt;
pub mod sessions;
pub mod state;
pub mod titles;
mod tool_messages;
pub mod types;

pub use attachments::{AttachmentPlanner, StagedEntry, StagedFileCache, guess_mime};
pub use engine::{ChatEngine, TurnResult, TurnStream};
pub use error::{AttachmentError, SidekickCoreError, StateError};
pub use sessions::{SessionStore, resolve_storage_root};
pub use sidekick_rs_protocol::EventSink;
pub use state::{JsonlStateStore, StateStore};
pub use titles::suggest_title;
pub use types::{Message, Session, SessionId, SessionSummary};

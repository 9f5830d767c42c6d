//! Error types for the chat engine crate.

use sidekick_rs_llm::ProviderError;
use sidekick_rs_protocol::SessionId;
use thiserror::Error;

/// Errors returned by engine and session operations.
#[derive(Debug, Error)]
pub enum SidekickCoreError {
    /// Session id is unknown to the store.
    #[error("unknown session: {0}")]
    UnknownSession(SessionId),
    /// Message index is outside the session transcript.
    #[error("message index {index} out of range (session has {len} messages)")]
    MessageOutOfRange { index: usize, len: usize },
    /// Model provider failure.
    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),
    /// Attachment rejected or staging failed.
    #[error("attachment error: {0}")]
    Attachment(#[from] AttachmentError),
    /// State store error.
    #[error("state error: {0}")]
    State(#[from] StateError),
    /// Background turn task failed to complete.
    #[error("turn task failed: {0}")]
    Executor(String),
    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Reasons an attachment cannot be sent.
#[derive(Debug, Error)]
pub enum AttachmentError {
    /// File type is outside the accepted whitelist or the provider cannot take it.
    #[error("unsupported file type for {provider}: {name} ({mime})")]
    UnsupportedMime {
        name: String,
        mime: String,
        provider: String,
    },
    /// File exceeds the hard size limit.
    #[error("file too large: {name} ({size} bytes, limit {limit})")]
    TooLarge { name: String, size: u64, limit: u64 },
    /// Remote staging is required but unavailable or failed.
    #[error("remote staging unavailable for {name}: {reason}")]
    StagingUnavailable { name: String, reason: String },
    /// The file could not be read.
    #[error("cannot read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Errors returned by the state store.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("unsupported schema version: {0}")]
    UnsupportedSchema(u32),
    #[error("missing session metadata")]
    MissingMetadata,
    #[error("session already exists: {0}")]
    SessionExists(SessionId),
}

//! Conversation data types persisted by the session store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sidekick_rs_llm::{ToolCall, ToolResult};
use sidekick_rs_protocol::{AttachmentRef, Role};

pub use sidekick_rs_protocol::SessionId;

/// One turn of a conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    /// Role that produced the message.
    pub role: Role,
    /// Message text.
    pub content: String,
    /// Timestamp for the message, strictly increasing within a session.
    pub created_at: DateTime<Utc>,
    /// Files attached to a user message.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<AttachmentRef>,
    /// Tool calls requested by an assistant message.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    /// Result carried by a tool message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_result: Option<ToolResult>,
}

impl Message {
    fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            created_at: Utc::now(),
            attachments: Vec::new(),
            tool_calls: Vec::new(),
            tool_result: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn with_attachments(mut self, attachments: Vec<AttachmentRef>) -> Self {
        self.attachments = attachments;
        self
    }

    /// Assistant message that requested tool calls.
    pub fn tool_use(content: impl Into<String>, calls: Vec<ToolCall>) -> Self {
        Self {
            tool_calls: calls,
            ..Self::new(Role::Assistant, content)
        }
    }

    /// Tool message answering one call.
    pub fn tool_result(result: ToolResult) -> Self {
        Self {
            tool_result: Some(result),
            ..Self::new(Role::Tool, String::new())
        }
    }

    /// Whether this is a plain user or assistant text turn.
    pub fn is_dialogue(&self) -> bool {
        matches!(self.role, Role::User | Role::Assistant)
            && self.tool_calls.is_empty()
            && self.tool_result.is_none()
    }
}

/// Full conversation transcript.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Session {
    pub id: SessionId,
    /// Display title; empty until one is chosen.
    pub title: String,
    pub messages: Vec<Message>,
    pub created_at: DateTime<Utc>,
}

impl Session {
    /// Timestamp of the latest activity.
    pub fn updated_at(&self) -> DateTime<Utc> {
        self.messages
            .last()
            .map(|message| message.created_at)
            .unwrap_or(self.created_at)
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            id: self.id,
            title: self.title.clone(),
            message_count: self.messages.len(),
            created_at: self.created_at,
            updated_at: self.updated_at(),
        }
    }
}

/// Listing view of a conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionSummary {
    pub id: SessionId,
    pub title: String,
    pub message_count: usize,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

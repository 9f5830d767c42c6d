//! Wire protocol types for Sidekick events, roles, attachments, and tool errors.

mod attachment;
mod tool;

pub use attachment::{AttachmentKind, AttachmentRef, UploadStrategy};
pub use tool::ToolError;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::str::FromStr;
use uuid::Uuid;

/// Unique identifier for a session.
pub type SessionId = Uuid;
/// Unique identifier for a turn.
pub type TurnId = Uuid;
/// Unique identifier for a tool call.
pub type ToolCallId = Uuid;

/// Speaker role for a conversation entry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System instruction.
    System,
    /// User-authored message.
    User,
    /// Assistant-authored message.
    Assistant,
    /// Tool result fed back to the model.
    Tool,
}

impl Role {
    /// Return the role as a lowercase string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        }
    }

    /// Parse a role from a lowercase string, defaulting to user.
    pub fn parse(value: &str) -> Self {
        match value {
            "system" => Role::System,
            "assistant" | "model" => Role::Assistant,
            "tool" | "function" => Role::Tool,
            _ => Role::User,
        }
    }
}

impl FromStr for Role {
    type Err = ();

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Ok(Role::parse(value))
    }
}

/// Wrapper for events emitted during a chat turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventMsg {
    /// Unique id for the event.
    pub id: Uuid,
    /// Session id associated with the event.
    pub session_id: SessionId,
    /// Timestamp when the event was created.
    pub created_at: DateTime<Utc>,
    /// Event payload content.
    pub payload: EventPayload,
}

impl EventMsg {
    /// Build an event stamped with a fresh id and the current time.
    pub fn new(session_id: SessionId, payload: EventPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            session_id,
            created_at: Utc::now(),
            payload,
        }
    }
}

/// All events emitted while a turn runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type", content = "payload")]
pub enum EventPayload {
    /// Turn lifecycle started.
    TurnStarted {
        turn_id: TurnId,
        provider: String,
        model: String,
    },
    /// Attachment uploaded to provider storage.
    AttachmentStaged {
        turn_id: TurnId,
        display_name: String,
        remote_uri: String,
    },
    /// Streaming response delta from the assistant.
    AgentMessageDelta { turn_id: TurnId, delta: String },
    /// Tool call execution started.
    ToolCallStarted {
        turn_id: TurnId,
        tool_call_id: ToolCallId,
        tool_name: String,
        arguments: Value,
    },
    /// Tool call execution completed.
    ToolCallFinished {
        turn_id: TurnId,
        tool_call_id: ToolCallId,
        result: Value,
        success: bool,
    },
    /// Turn lifecycle completed.
    TurnCompleted { turn_id: TurnId, message: String },
    /// Error event for the session or turn.
    Error {
        turn_id: Option<TurnId>,
        message: String,
    },
}

/// Sink interface for engine and tool events.
pub trait EventSink: Send + Sync {
    /// Emit an event to downstream listeners.
    fn emit(&self, event: EventMsg);
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn role_parses_provider_aliases() {
        assert_eq!(Role::parse("model"), Role::Assistant);
        assert_eq!(Role::parse("function"), Role::Tool);
        assert_eq!(Role::parse("system"), Role::System);
        assert_eq!(Role::parse("anything"), Role::User);
        assert_eq!(Role::Tool.as_str(), "tool");
    }

    #[test]
    fn event_payload_round_trips_through_json() {
        let event = EventMsg::new(
            Uuid::new_v4(),
            EventPayload::ToolCallFinished {
                turn_id: Uuid::new_v4(),
                tool_call_id: Uuid::new_v4(),
                result: json!({ "ok": true }),
                success: true,
            },
        );
        let encoded = serde_json::to_value(&event).expect("serialize");
        assert_eq!(encoded["payload"]["type"], json!("tool_call_finished"));
        let decoded: EventMsg = serde_json::from_value(encoded.clone()).expect("deserialize");
        let decoded_value = serde_json::to_value(decoded).expect("serialize decoded");
        assert_eq!(decoded_value, encoded);
    }

    #[test]
    fn attachment_kind_classifies_mime_families() {
        assert_eq!(
            AttachmentKind::from_mime("application/pdf"),
            Some(AttachmentKind::Pdf)
        );
        assert_eq!(
            AttachmentKind::from_mime("IMAGE/PNG"),
            Some(AttachmentKind::Image)
        );
        assert_eq!(
            AttachmentKind::from_mime("video/mp4"),
            Some(AttachmentKind::Video)
        );
        assert_eq!(AttachmentKind::from_mime("text/plain"), None);
    }

    #[test]
    fn only_staged_attachments_expire() {
        let now = Utc::now();
        let mut attachment = AttachmentRef {
            path: "clip.mp4".to_string(),
            display_name: "clip.mp4".to_string(),
            mime_type: "video/mp4".to_string(),
            kind: AttachmentKind::Video,
            size_bytes: 10,
            strategy: UploadStrategy::RemoteStaged,
            remote_uri: Some("https://files/abc".to_string()),
            remote_name: Some("files/abc".to_string()),
            expires_at: Some(now - chrono::Duration::hours(1)),
            provider: Some("gemini".to_string()),
        };
        assert_eq!(attachment.is_expired(now), true);
        attachment.strategy = UploadStrategy::Inline;
        assert_eq!(attachment.is_expired(now), false);
    }
}

//! Provider-neutral chat request and response types.
//!
//! Adapters translate these into each vendor's wire format and back, so the
//! chat loop never sees vendor-specific shapes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sidekick_rs_protocol::{AttachmentKind, Role};

/// How attachment bytes are carried in a request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum AttachmentPayload {
    /// Base64-encoded bytes embedded in the request.
    Inline { data: String },
    /// Reference to a file already staged with the provider.
    Remote { uri: String },
}

/// Attachment ready to be encoded into a request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreparedAttachment {
    pub display_name: String,
    pub mime_type: String,
    pub kind: AttachmentKind,
    pub payload: AttachmentPayload,
}

/// A model-issued request to run a tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Provider call id (synthesized when the provider has none).
    pub id: String,
    pub name: String,
    /// Arguments as sent by the model; a JSON object or a raw JSON string.
    pub arguments: Value,
}

/// Result of a tool call fed back to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    /// Id of the call this answers.
    pub call_id: String,
    /// Name of the tool that ran.
    pub name: String,
    /// Result text (the JSON of the tool outcome).
    pub content: String,
    /// Whether the call failed.
    pub is_error: bool,
}

/// Variant payload of a chat message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case", tag = "type", content = "items")]
pub enum MessageType {
    #[default]
    Text,
    Attachments(Vec<PreparedAttachment>),
    ToolUse(Vec<ToolCall>),
    ToolResult(Vec<ToolResult>),
}

/// One message in a provider request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    #[serde(default)]
    pub message_type: MessageType,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self::text(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::text(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::text(Role::Assistant, content)
    }

    /// Plain text message with the given role.
    pub fn text(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            message_type: MessageType::Text,
        }
    }

    /// User message carrying attachments; text-only when the list is empty.
    pub fn user_with_attachments(
        content: impl Into<String>,
        attachments: Vec<PreparedAttachment>,
    ) -> Self {
        let message_type = if attachments.is_empty() {
            MessageType::Text
        } else {
            MessageType::Attachments(attachments)
        };
        Self {
            role: Role::User,
            content: content.into(),
            message_type,
        }
    }

    /// Assistant turn that requested tool calls.
    pub fn tool_use(content: impl Into<String>, calls: Vec<ToolCall>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            message_type: MessageType::ToolUse(calls),
        }
    }

    /// Tool results answering a preceding tool-use message.
    pub fn tool_results(results: Vec<ToolResult>) -> Self {
        Self {
            role: Role::Tool,
            content: String::new(),
            message_type: MessageType::ToolResult(results),
        }
    }

    /// Tool calls carried by this message, if any.
    pub fn tool_calls(&self) -> &[ToolCall] {
        match &self.message_type {
            MessageType::ToolUse(calls) => calls,
            _ => &[],
        }
    }
}

/// Tool declaration advertised to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDeclaration {
    pub name: String,
    pub description: String,
    /// JSON schema of the arguments.
    pub parameters: Value,
}

/// A complete provider request.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    /// Tools the model may call; empty disables function calling.
    pub tools: Vec<ToolDeclaration>,
    /// Overrides the provider's configured temperature.
    pub temperature: Option<f32>,
    /// Overrides the provider's configured output limit.
    pub max_output_tokens: Option<u32>,
}

impl ChatRequest {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            ..Self::default()
        }
    }

    pub fn with_tools(mut self, tools: Vec<ToolDeclaration>) -> Self {
        self.tools = tools;
        self
    }
}

/// Token accounting reported by the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

/// Normalized model response.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ModelResponse {
    pub text: String,
    pub tool_calls: Vec<ToolCall>,
    pub finish_reason: Option<String>,
    pub usage: Option<TokenUsage>,
}

impl ModelResponse {
    /// Plain text response.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            finish_reason: Some("stop".to_string()),
            ..Self::default()
        }
    }

    /// Response requesting tool calls.
    pub fn with_tool_calls(text: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            text: text.into(),
            tool_calls,
            finish_reason: Some("tool_calls".to_string()),
            usage: None,
        }
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// Fragment of a tool call delivered by a stream.
///
/// OpenAI-style streams spread one call over several fragments sharing an
/// `index`; Gemini delivers each call whole in one fragment.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ToolCallDelta {
    pub index: usize,
    pub id: Option<String>,
    pub name: Option<String>,
    /// Argument JSON text to append.
    pub arguments: Option<String>,
}

/// One decoded streaming event.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StreamChunk {
    pub text: Option<String>,
    pub tool_calls: Vec<ToolCallDelta>,
    pub finish_reason: Option<String>,
    pub usage: Option<TokenUsage>,
}

/// Attachment handling a provider supports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderCapabilities {
    /// Whether function calling is available.
    pub tools: bool,
    /// Whether native streaming is available.
    pub streaming: bool,
    /// Kinds that may be embedded inline.
    pub inline_kinds: Vec<AttachmentKind>,
    /// Kinds that may be staged remotely.
    pub staged_kinds: Vec<AttachmentKind>,
    /// Kinds that are always staged regardless of size.
    pub always_staged_kinds: Vec<AttachmentKind>,
}

impl ProviderCapabilities {
    /// Text-only provider with tools and streaming.
    pub fn text_only() -> Self {
        Self {
            tools: true,
            streaming: true,
            inline_kinds: Vec::new(),
            staged_kinds: Vec::new(),
            always_staged_kinds: Vec::new(),
        }
    }

    /// Whether a kind is accepted in any form.
    pub fn accepts(&self, kind: AttachmentKind) -> bool {
        self.inline_kinds.contains(&kind) || self.staged_kinds.contains(&kind)
    }
}

/// Processing state of a staged file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileState {
    Processing,
    Active,
    Failed,
    Unknown,
}

impl FileState {
    /// Parse the provider's upper-case state string.
    pub fn parse(value: &str) -> Self {
        match value {
            "PROCESSING" => FileState::Processing,
            "ACTIVE" => FileState::Active,
            "FAILED" => FileState::Failed,
            _ => FileState::Unknown,
        }
    }
}

/// A file uploaded to provider storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StagedFile {
    /// Provider resource name, e.g. `files/abc123`.
    pub name: String,
    /// URI used to reference the file in requests.
    pub uri: String,
    pub mime_type: String,
    pub state: FileState,
    /// Provider-reported expiry, when given.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

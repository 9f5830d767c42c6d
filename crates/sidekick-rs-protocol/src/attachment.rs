//! Attachment reference types shared by the engine, providers, and storage.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Broad media family of an attachment.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AttachmentKind {
    /// Still image (jpeg, png, gif, webp, heic, heif).
    Image,
    /// PDF document.
    Pdf,
    /// Video clip.
    Video,
}

impl AttachmentKind {
    /// Classify a MIME type into a supported kind.
    pub fn from_mime(mime: &str) -> Option<Self> {
        let mime = mime.trim().to_ascii_lowercase();
        if mime == "application/pdf" {
            Some(AttachmentKind::Pdf)
        } else if mime.starts_with("image/") {
            Some(AttachmentKind::Image)
        } else if mime.starts_with("video/") {
            Some(AttachmentKind::Video)
        } else {
            None
        }
    }

    /// Return the kind as a lowercase string.
    pub fn as_str(&self) -> &'static str {
        match self {
            AttachmentKind::Image => "image",
            AttachmentKind::Pdf => "pdf",
            AttachmentKind::Video => "video",
        }
    }
}

/// How the attachment bytes reach the provider.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum UploadStrategy {
    /// Bytes are base64-encoded into the request body.
    Inline,
    /// Bytes are uploaded to provider storage and referenced by URI.
    RemoteStaged,
}

/// Reference to a user-supplied file attached to a conversation turn.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AttachmentRef {
    /// Local path of the source file.
    pub path: String,
    /// Display name (usually the file name).
    pub display_name: String,
    /// Detected MIME type.
    pub mime_type: String,
    /// Media family.
    pub kind: AttachmentKind,
    /// File size in bytes.
    pub size_bytes: u64,
    /// Upload strategy chosen for the file.
    pub strategy: UploadStrategy,
    /// Provider URI for remote-staged files.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_uri: Option<String>,
    /// Provider resource name for remote-staged files (used for deletion).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_name: Option<String>,
    /// Expiry of the remote copy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    /// Provider id the attachment was prepared for.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
}

impl AttachmentRef {
    /// Whether the remote copy is past its retention window.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match (self.strategy, self.expires_at) {
            (UploadStrategy::RemoteStaged, Some(expires_at)) => expires_at <= now,
            _ => false,
        }
    }
}

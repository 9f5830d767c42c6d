//! Attachment validation, upload strategy selection, and remote staging.
//!
//! Files are checked against a MIME whitelist and the provider's
//! capabilities before any bytes are read. Files at or above the inline
//! threshold, and kinds the provider always stages, go through provider file
//! storage; everything else is base64-inlined into the request.

use crate::error::{AttachmentError, SidekickCoreError};
use crate::sessions::resolve_storage_root;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, TimeDelta, Utc};
use log::{debug, info, warn};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sidekick_rs_config::AttachmentsConfig;
use sidekick_rs_llm::{
    AttachmentPayload, ChatProvider, FileState, PreparedAttachment, ProviderCapabilities,
    StagedFile,
};
use sidekick_rs_protocol::{AttachmentKind, AttachmentRef, UploadStrategy};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Image MIME types accepted for upload.
pub const IMAGE_MIME_TYPES: &[&str] = &[
    "image/jpeg",
    "image/png",
    "image/gif",
    "image/webp",
    "image/heic",
    "image/heif",
];

/// Video MIME types accepted for upload.
pub const VIDEO_MIME_TYPES: &[&str] = &[
    "video/mp4",
    "video/mov",
    "video/mpeg",
    "video/avi",
    "video/quicktime",
    "video/x-msvideo",
    "video/webm",
];

pub const PDF_MIME_TYPE: &str = "application/pdf";

/// Whether a MIME type is on the upload whitelist.
pub fn is_allowed_mime(mime: &str) -> bool {
    mime == PDF_MIME_TYPE || IMAGE_MIME_TYPES.contains(&mime) || VIDEO_MIME_TYPES.contains(&mime)
}

/// Guess a MIME type from the file extension.
pub fn guess_mime(path: &Path) -> Option<&'static str> {
    path.extension()?;
    match mime_guess::from_path(path).first_raw()? {
        "image/pjpeg" => Some("image/jpeg"),
        mime => Some(mime),
    }
}

/// Picks upload strategies and stages files with the provider.
#[derive(Debug, Clone)]
pub struct AttachmentPlanner {
    config: AttachmentsConfig,
}

impl AttachmentPlanner {
    pub fn new(config: AttachmentsConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AttachmentsConfig {
        &self.config
    }

    /// Validate a local file and choose its upload strategy.
    ///
    /// Rejects files outside the whitelist, kinds the provider cannot take,
    /// and files above the hard size limit.
    pub fn classify(
        &self,
        path: &Path,
        provider_id: &str,
        capabilities: &ProviderCapabilities,
    ) -> Result<AttachmentRef, AttachmentError> {
        let display_name = path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());
        let mime = guess_mime(path).unwrap_or("application/octet-stream");
        let unsupported = || AttachmentError::UnsupportedMime {
            name: display_name.clone(),
            mime: mime.to_string(),
            provider: provider_id.to_string(),
        };
        if !is_allowed_mime(mime) {
            return Err(unsupported());
        }
        let kind = AttachmentKind::from_mime(mime).ok_or_else(unsupported)?;
        if !capabilities.accepts(kind) {
            return Err(unsupported());
        }

        let metadata = std::fs::metadata(path).map_err(|source| AttachmentError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let size = metadata.len();
        if size > self.config.max_file_bytes {
            return Err(AttachmentError::TooLarge {
                name: display_name,
                size,
                limit: self.config.max_file_bytes,
            });
        }

        let must_stage = size >= self.config.inline_max_bytes
            || capabilities.always_staged_kinds.contains(&kind)
            || !capabilities.inline_kinds.contains(&kind);
        let strategy = if must_stage {
            if !capabilities.staged_kinds.contains(&kind) {
                return Err(AttachmentError::StagingUnavailable {
                    name: display_name,
                    reason: format!(
                        "{provider_id} has no file storage and the file is {size} bytes (inline limit {})",
                        self.config.inline_max_bytes
                    ),
                });
            }
            UploadStrategy::RemoteStaged
        } else {
            UploadStrategy::Inline
        };
        debug!(
            "attachment classified (name={}, mime={}, bytes={}, strategy={:?})",
            display_name, mime, size, strategy
        );

        Ok(AttachmentRef {
            path: path.display().to_string(),
            display_name,
            mime_type: mime.to_string(),
            kind,
            size_bytes: size,
            strategy,
            remote_uri: None,
            remote_name: None,
            expires_at: None,
            provider: Some(provider_id.to_string()),
        })
    }

    /// Produce the request payload for a classified attachment.
    ///
    /// Remote-staged files are uploaded, waited on until active, and recorded
    /// in `cache` when one is given. The returned reference carries the
    /// remote URI and expiry.
    pub async fn prepare(
        &self,
        provider: &dyn ChatProvider,
        attachment: AttachmentRef,
        cache: Option<&StagedFileCache>,
    ) -> Result<(AttachmentRef, PreparedAttachment), AttachmentError> {
        match attachment.strategy {
            UploadStrategy::Inline => {
                let bytes = tokio::fs::read(&attachment.path).await.map_err(|source| {
                    AttachmentError::Io {
                        path: attachment.path.clone(),
                        source,
                    }
                })?;
                let prepared = PreparedAttachment {
                    display_name: attachment.display_name.clone(),
                    mime_type: attachment.mime_type.clone(),
                    kind: attachment.kind,
                    payload: AttachmentPayload::Inline {
                        data: STANDARD.encode(bytes),
                    },
                };
                Ok((attachment, prepared))
            }
            UploadStrategy::RemoteStaged => {
                let staged = self.stage(provider, &attachment).await?;
                let uploaded_at = Utc::now();
                let expires_at = staged.expires_at.unwrap_or_else(|| {
                    uploaded_at + TimeDelta::hours(self.config.retention_hours as i64)
                });
                let mut attachment = attachment;
                attachment.remote_uri = Some(staged.uri.clone());
                attachment.remote_name = Some(staged.name.clone());
                attachment.expires_at = Some(expires_at);

                if let Some(cache) = cache {
                    cache.record(StagedEntry {
                        name: staged.name.clone(),
                        uri: staged.uri.clone(),
                        provider: provider.id().to_string(),
                        display_name: attachment.display_name.clone(),
                        mime_type: attachment.mime_type.clone(),
                        local_path: attachment.path.clone(),
                        uploaded_at,
                        expires_at,
                    });
                }
                let prepared = PreparedAttachment {
                    display_name: attachment.display_name.clone(),
                    mime_type: attachment.mime_type.clone(),
                    kind: attachment.kind,
                    payload: AttachmentPayload::Remote { uri: staged.uri },
                };
                Ok((attachment, prepared))
            }
        }
    }

    async fn stage(
        &self,
        provider: &dyn ChatProvider,
        attachment: &AttachmentRef,
    ) -> Result<StagedFile, AttachmentError> {
        let staging_error = |reason: String| AttachmentError::StagingUnavailable {
            name: attachment.display_name.clone(),
            reason,
        };
        info!(
            "staging attachment (provider={}, name={}, bytes={})",
            provider.id(),
            attachment.display_name,
            attachment.size_bytes
        );
        let mut staged = provider
            .stage_file(
                Path::new(&attachment.path),
                &attachment.display_name,
                &attachment.mime_type,
            )
            .await
            .map_err(|err| staging_error(err.to_string()))?;

        let interval = Duration::from_millis(self.config.poll_interval_ms.max(1));
        let deadline = Instant::now() + Duration::from_secs(self.config.poll_timeout_secs);
        loop {
            match staged.state {
                FileState::Active | FileState::Unknown => return Ok(staged),
                FileState::Failed => {
                    return Err(staging_error(format!(
                        "provider failed to process {}",
                        staged.name
                    )));
                }
                FileState::Processing => {}
            }
            if Instant::now() >= deadline {
                warn!(
                    "staged file still processing after {}s, continuing (name={})",
                    self.config.poll_timeout_secs, staged.name
                );
                return Ok(staged);
            }
            tokio::time::sleep(interval).await;
            staged = provider
                .file_status(&staged.name)
                .await
                .map_err(|err| staging_error(err.to_string()))?;
            debug!(
                "staged file state (name={}, state={:?})",
                staged.name, staged.state
            );
        }
    }
}

/// Rebuild the payload of an attachment from an earlier turn.
///
/// Only unexpired remote copies staged with `provider_id` itself can be
/// referenced again, and only while that provider still takes staged files
/// of the attachment's kind. Inline bytes are not persisted.
pub fn history_attachment(
    attachment: &AttachmentRef,
    provider_id: &str,
    capabilities: &ProviderCapabilities,
    now: DateTime<Utc>,
) -> Option<PreparedAttachment> {
    if attachment.strategy != UploadStrategy::RemoteStaged || attachment.is_expired(now) {
        return None;
    }
    if attachment.provider.as_deref() != Some(provider_id)
        || !capabilities.staged_kinds.contains(&attachment.kind)
    {
        return None;
    }
    let uri = attachment.remote_uri.clone()?;
    Some(PreparedAttachment {
        display_name: attachment.display_name.clone(),
        mime_type: attachment.mime_type.clone(),
        kind: attachment.kind,
        payload: AttachmentPayload::Remote { uri },
    })
}

/// A file uploaded to provider storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StagedEntry {
    /// Provider resource name, used for deletion.
    pub name: String,
    pub uri: String,
    /// Provider id that holds the file.
    pub provider: String,
    pub display_name: String,
    pub mime_type: String,
    pub local_path: String,
    pub uploaded_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Local record of staged files, persisted as JSON.
pub struct StagedFileCache {
    path: Option<PathBuf>,
    entries: Mutex<Vec<StagedEntry>>,
}

impl StagedFileCache {
    /// Cache that is never written to disk.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            entries: Mutex::new(Vec::new()),
        }
    }

    /// Load the cache from the configured file, or `~/.sidekick/files/staged_files.json`.
    pub fn from_config(config: &AttachmentsConfig) -> Result<Self, SidekickCoreError> {
        let path = match config.cache_path.as_deref() {
            Some(path) => resolve_storage_root(Some(path), "files")?,
            None => resolve_storage_root(None, "files")?.join("staged_files.json"),
        };
        debug!("staged file cache (path={})", path.display());
        Ok(Self::load(path))
    }

    /// Load the cache from `path`; a missing or unreadable file starts empty.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = match std::fs::read_to_string(&path) {
            Ok(text) => serde_json::from_str(&text).unwrap_or_else(|err| {
                warn!("ignoring corrupt staged file cache (path={}): {err}", path.display());
                Vec::new()
            }),
            Err(_) => Vec::new(),
        };
        Self {
            path: Some(path),
            entries: Mutex::new(entries),
        }
    }

    pub fn entries(&self) -> Vec<StagedEntry> {
        self.entries.lock().clone()
    }

    /// Add or replace an entry by name.
    pub fn record(&self, entry: StagedEntry) {
        let mut entries = self.entries.lock();
        entries.retain(|existing| existing.name != entry.name);
        entries.push(entry);
        self.persist(&entries);
    }

    /// Drop an entry by name.
    pub fn remove(&self, name: &str) -> Option<StagedEntry> {
        let mut entries = self.entries.lock();
        let index = entries.iter().position(|entry| entry.name == name)?;
        let removed = entries.remove(index);
        self.persist(&entries);
        Some(removed)
    }

    /// Drop entries expired at `now`, deleting their remote copies through
    /// `provider` when it is the provider that holds them.
    pub async fn cleanup_expired(
        &self,
        provider: Option<&dyn ChatProvider>,
        now: DateTime<Utc>,
    ) -> Vec<StagedEntry> {
        let expired: Vec<StagedEntry> = {
            let mut entries = self.entries.lock();
            let (expired, kept): (Vec<_>, Vec<_>) =
                entries.drain(..).partition(|entry| entry.expires_at <= now);
            *entries = kept;
            self.persist(&entries);
            expired
        };

        if let Some(provider) = provider {
            for entry in expired.iter().filter(|entry| entry.provider == provider.id()) {
                if let Err(err) = provider.delete_staged_file(&entry.name).await {
                    // Expired files are usually already gone remotely.
                    debug!("remote delete skipped (name={}): {err}", entry.name);
                }
            }
        }
        info!("cleaned up staged files (expired={})", expired.len());
        expired
    }

    fn persist(&self, entries: &[StagedEntry]) {
        let Some(path) = &self.path else {
            return;
        };
        if let Some(parent) = path.parent()
            && let Err(err) = std::fs::create_dir_all(parent)
        {
            warn!("cannot create cache dir (path={}): {err}", parent.display());
            return;
        }
        match serde_json::to_string_pretty(entries) {
            Ok(text) => {
                if let Err(err) = std::fs::write(path, text) {
                    warn!("cannot write staged file cache (path={}): {err}", path.display());
                }
            }
            Err(err) => warn!("cannot serialize staged file cache: {err}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{
        AttachmentPlanner, StagedEntry, StagedFileCache, guess_mime, history_attachment,
        is_allowed_mime,
    };
    use crate::error::AttachmentError;
    use chrono::{Duration, Utc};
    use pretty_assertions::assert_eq;
    use sidekick_rs_config::AttachmentsConfig;
    use sidekick_rs_llm::ProviderCapabilities;
    use sidekick_rs_protocol::{AttachmentKind, UploadStrategy};
    use std::path::Path;
    use tempfile::tempdir;

    fn gemini_caps() -> ProviderCapabilities {
        ProviderCapabilities {
            inline_kinds: vec![AttachmentKind::Image, AttachmentKind::Pdf],
            staged_kinds: vec![
                AttachmentKind::Image,
                AttachmentKind::Pdf,
                AttachmentKind::Video,
            ],
            always_staged_kinds: vec![AttachmentKind::Video],
            ..ProviderCapabilities::text_only()
        }
    }

    fn planner(inline_max_bytes: u64) -> AttachmentPlanner {
        AttachmentPlanner::new(AttachmentsConfig {
            inline_max_bytes,
            max_file_bytes: 1024,
            ..AttachmentsConfig::default()
        })
    }

    #[test]
    fn mime_whitelist_covers_images_pdf_and_video() {
        assert_eq!(guess_mime(Path::new("a/B.JPG")), Some("image/jpeg"));
        assert_eq!(guess_mime(Path::new("clip.mov")), Some("video/quicktime"));
        assert_eq!(guess_mime(Path::new("noext")), None);
        assert_eq!(guess_mime(Path::new("shot.jpe")), Some("image/jpeg"));
        assert_eq!(guess_mime(Path::new("scan.jfif")), Some("image/jpeg"));
        assert_eq!(guess_mime(Path::new("clip.qt")), Some("video/quicktime"));
        assert_eq!(guess_mime(Path::new("clip.mpe")), Some("video/mpeg"));
        assert_eq!(guess_mime(Path::new("notes.txt")), Some("text/plain"));
        assert!(is_allowed_mime("application/pdf"));
        assert!(!is_allowed_mime("text/plain"));
    }

    #[test]
    fn extension_aliases_pass_the_whitelist() {
        let dir = tempdir().expect("tempdir");
        let planner = planner(100);
        let caps = gemini_caps();
        for (name, kind) in [
            ("photo.jpe", AttachmentKind::Image),
            ("scan.jfif", AttachmentKind::Image),
            ("clip.qt", AttachmentKind::Video),
            ("clip.mpe", AttachmentKind::Video),
        ] {
            let path = dir.path().join(name);
            std::fs::write(&path, b"tiny").expect("write");
            let attachment = planner.classify(&path, "gemini", &caps).expect(name);
            assert_eq!(attachment.kind, kind);
        }
    }

    #[test]
    fn files_at_threshold_are_staged_remotely() {
        let dir = tempdir().expect("tempdir");
        let small = dir.path().join("small.png");
        let large = dir.path().join("large.png");
        std::fs::write(&small, vec![0u8; 99]).expect("small");
        std::fs::write(&large, vec![0u8; 100]).expect("large");

        let planner = planner(100);
        let caps = gemini_caps();
        let small = planner.classify(&small, "gemini", &caps).expect("small");
        let large = planner.classify(&large, "gemini", &caps).expect("large");
        assert_eq!(small.strategy, UploadStrategy::Inline);
        assert_eq!(large.strategy, UploadStrategy::RemoteStaged);
        assert_eq!(large.kind, AttachmentKind::Image);
    }

    #[test]
    fn videos_are_always_staged() {
        let dir = tempdir().expect("tempdir");
        let clip = dir.path().join("clip.mp4");
        std::fs::write(&clip, b"tiny").expect("clip");
        let attachment = planner(100)
            .classify(&clip, "gemini", &gemini_caps())
            .expect("clip");
        assert_eq!(attachment.strategy, UploadStrategy::RemoteStaged);
    }

    #[test]
    fn rejects_unsupported_types_for_every_provider() {
        let dir = tempdir().expect("tempdir");
        let notes = dir.path().join("notes.txt");
        std::fs::write(&notes, b"hello").expect("notes");
        let planner = planner(100);
        for caps in [gemini_caps(), ProviderCapabilities::text_only()] {
            let err = planner.classify(&notes, "any", &caps).expect_err("rejected");
            assert!(matches!(err, AttachmentError::UnsupportedMime { .. }));
        }

        let image = dir.path().join("cat.png");
        std::fs::write(&image, b"png").expect("image");
        let err = planner
            .classify(&image, "deepseek", &ProviderCapabilities::text_only())
            .expect_err("text only");
        assert!(err.to_string().contains("deepseek"));
    }

    #[test]
    fn oversize_and_unstageable_files_are_rejected() {
        let dir = tempdir().expect("tempdir");
        let huge = dir.path().join("huge.pdf");
        std::fs::write(&huge, vec![0u8; 2048]).expect("huge");
        let err = planner(100)
            .classify(&huge, "gemini", &gemini_caps())
            .expect_err("too large");
        assert!(matches!(err, AttachmentError::TooLarge { size: 2048, .. }));

        let big_image = dir.path().join("big.png");
        std::fs::write(&big_image, vec![0u8; 200]).expect("big");
        let inline_only = ProviderCapabilities {
            inline_kinds: vec![AttachmentKind::Image],
            ..ProviderCapabilities::text_only()
        };
        let err = planner(100)
            .classify(&big_image, "local", &inline_only)
            .expect_err("no staging");
        assert!(matches!(err, AttachmentError::StagingUnavailable { .. }));
    }

    #[test]
    fn history_reuses_only_live_remote_copies() {
        let dir = tempdir().expect("tempdir");
        let clip = dir.path().join("clip.mp4");
        std::fs::write(&clip, b"tiny").expect("clip");
        let mut attachment = planner(100)
            .classify(&clip, "gemini", &gemini_caps())
            .expect("clip");
        let now = Utc::now();
        attachment.remote_uri = Some("https://files/abc".to_string());
        attachment.expires_at = Some(now + Duration::hours(1));
        let caps = gemini_caps();
        assert!(history_attachment(&attachment, "gemini", &caps, now).is_some());
        assert!(
            history_attachment(&attachment, "gemini", &caps, now + Duration::hours(2)).is_none()
        );
    }

    #[test]
    fn history_drops_copies_staged_elsewhere() {
        let dir = tempdir().expect("tempdir");
        let clip = dir.path().join("clip.mp4");
        std::fs::write(&clip, b"tiny").expect("clip");
        let mut attachment = planner(100)
            .classify(&clip, "gemini", &gemini_caps())
            .expect("clip");
        let now = Utc::now();
        attachment.remote_uri = Some("https://files/abc".to_string());
        attachment.expires_at = Some(now + Duration::hours(1));
        assert_eq!(attachment.provider.as_deref(), Some("gemini"));

        let text_only = ProviderCapabilities::text_only();
        assert!(history_attachment(&attachment, "deepseek", &text_only, now).is_none());
        assert!(history_attachment(&attachment, "gemini-pro", &gemini_caps(), now).is_none());

        let inline_only = ProviderCapabilities {
            inline_kinds: vec![AttachmentKind::Image, AttachmentKind::Video],
            ..ProviderCapabilities::text_only()
        };
        assert!(history_attachment(&attachment, "gemini", &inline_only, now).is_none());

        attachment.provider = None;
        assert!(history_attachment(&attachment, "gemini", &gemini_caps(), now).is_none());
    }

    #[test]
    fn cache_persists_and_expires_entries() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("cache").join("files.json");
        let cache = StagedFileCache::load(&path);
        let now = Utc::now();
        let entry = |name: &str, expires_at| StagedEntry {
            name: name.to_string(),
            uri: format!("https://files/{name}"),
            provider: "gemini".to_string(),
            display_name: "clip.mp4".to_string(),
            mime_type: "video/mp4".to_string(),
            local_path: "/tmp/clip.mp4".to_string(),
            uploaded_at: now - Duration::hours(49),
            expires_at,
        };
        cache.record(entry("files/old", now - Duration::hours(1)));
        cache.record(entry("files/new", now + Duration::hours(47)));

        let reloaded = StagedFileCache::load(&path);
        assert_eq!(reloaded.entries().len(), 2);

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("runtime");
        let expired = runtime.block_on(reloaded.cleanup_expired(None, now));
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].name, "files/old");
        assert_eq!(
            StagedFileCache::load(&path)
                .entries()
                .into_iter()
                .map(|entry| entry.name)
                .collect::<Vec<_>>(),
            vec!["files/new".to_string()]
        );
    }
}

//! Conversation persistence using one JSONL rollout file per session.
//!
//! Rollouts are append-only: renames and message deletions are recorded as
//! events and applied when the file is replayed.

use crate::error::StateError;
use crate::types::{Message, Session, SessionId, SessionSummary};
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use uuid::Uuid;

const SCHEMA_VERSION: u32 = 1;

/// Persistent store abstraction for conversations.
pub trait StateStore: Send + Sync {
    /// Record a new session creation.
    fn record_session(
        &self,
        session_id: SessionId,
        title: &str,
        created_at: DateTime<Utc>,
    ) -> Result<(), StateError>;
    /// Append a message to a session.
    fn append_message(&self, session_id: SessionId, message: &Message) -> Result<(), StateError>;
    /// Change the session title.
    fn rename_session(&self, session_id: SessionId, title: &str) -> Result<(), StateError>;
    /// Remove the message at `index`.
    fn delete_message(&self, session_id: SessionId, index: usize) -> Result<(), StateError>;
    /// Load a session by id.
    fn load_session(&self, session_id: SessionId) -> Result<Option<Session>, StateError>;
    /// List session summaries, newest activity first.
    fn list_sessions(&self) -> Result<Vec<SessionSummary>, StateError>;
    /// Delete a session and its backing storage.
    fn delete_session(&self, session_id: SessionId) -> Result<bool, StateError>;
    /// Delete every session, returning how many were removed.
    fn clear(&self) -> Result<usize, StateError>;
}

/// Internal JSONL event representation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum RolloutEvent {
    SchemaVersion {
        version: u32,
    },
    SessionCreated {
        session_id: SessionId,
        #[serde(default)]
        title: String,
        created_at: DateTime<Utc>,
    },
    Message {
        session_id: SessionId,
        message: Message,
    },
    TitleChanged {
        session_id: SessionId,
        title: String,
    },
    MessageDeleted {
        session_id: SessionId,
        index: usize,
    },
}

#[derive(Default)]
struct RolloutState {
    version: Option<u32>,
    title: String,
    created_at: Option<DateTime<Utc>>,
    messages: Vec<Message>,
}

impl RolloutState {
    fn apply(&mut self, event: RolloutEvent) -> Result<(), StateError> {
        match event {
            RolloutEvent::SchemaVersion { version } => {
                self.version = Some(version);
                if version > SCHEMA_VERSION {
                    return Err(StateError::UnsupportedSchema(version));
                }
            }
            RolloutEvent::SessionCreated {
                title, created_at, ..
            } => {
                self.title = title;
                self.created_at = Some(created_at);
            }
            RolloutEvent::Message { message, .. } => self.messages.push(message),
            RolloutEvent::TitleChanged { title, .. } => self.title = title,
            RolloutEvent::MessageDeleted { index, .. } => {
                if index < self.messages.len() {
                    self.messages.remove(index);
                } else {
                    warn!("ignoring out-of-range message deletion (index={index})");
                }
            }
        }
        Ok(())
    }

    fn finish(self, session_id: SessionId) -> Result<Session, StateError> {
        let _ = self.version.ok_or(StateError::MissingMetadata)?;
        let created_at = self.created_at.ok_or(StateError::MissingMetadata)?;
        Ok(Session {
            id: session_id,
            title: self.title,
            messages: self.messages,
            created_at,
        })
    }
}

/// JSONL-backed state store implementation.
pub struct JsonlStateStore {
    /// Root directory for session rollouts.
    root: PathBuf,
    /// Serialize write access to rollout files.
    write_lock: Mutex<()>,
}

impl JsonlStateStore {
    /// Create a new JSONL store under the given root.
    pub fn new(root: impl AsRef<Path>) -> Result<Self, StateError> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        info!("initialized JSONL state store (root={})", root.display());
        Ok(Self {
            root,
            write_lock: Mutex::new(()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn rollout_path(&self, session_id: SessionId) -> PathBuf {
        self.root.join(format!("{session_id}.jsonl"))
    }

    /// Append an event to an existing rollout file.
    fn write_event(&self, session_id: SessionId, event: &RolloutEvent) -> Result<(), StateError> {
        let _guard = self.write_lock.lock();
        let path = self.rollout_path(session_id);
        if !path.exists() {
            return Err(StateError::MissingMetadata);
        }
        let mut file = OpenOptions::new().append(true).open(path)?;
        let line = serde_json::to_string(event)?;
        writeln!(file, "{line}")?;
        Ok(())
    }

    /// Create a new rollout file and write the initial event.
    fn write_new_rollout(
        &self,
        session_id: SessionId,
        event: &RolloutEvent,
    ) -> Result<(), StateError> {
        let _guard = self.write_lock.lock();
        let path = self.rollout_path(session_id);
        if path.exists() {
            return Err(StateError::SessionExists(session_id));
        }
        let mut file = OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(&path)?;
        let header = serde_json::to_string(&RolloutEvent::SchemaVersion {
            version: SCHEMA_VERSION,
        })?;
        writeln!(file, "{header}")?;
        let line = serde_json::to_string(event)?;
        writeln!(file, "{line}")?;
        Ok(())
    }

    /// Read and reconstruct a session from its rollout file.
    fn read_rollout(&self, session_id: SessionId) -> Result<Option<Session>, StateError> {
        let path = self.rollout_path(session_id);
        if !path.exists() {
            return Ok(None);
        }
        let file = OpenOptions::new().read(true).open(&path)?;
        let reader = BufReader::new(file);
        let mut rollout = RolloutState::default();

        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let event: RolloutEvent = serde_json::from_str(&line)?;
            rollout.apply(event)?;
        }
        Ok(Some(rollout.finish(session_id)?))
    }

    fn session_ids(&self) -> Result<Vec<SessionId>, StateError> {
        let mut ids = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let path = entry?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("jsonl") {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) else {
                continue;
            };
            if let Ok(id) = Uuid::parse_str(stem) {
                ids.push(id);
            }
        }
        Ok(ids)
    }
}

impl StateStore for JsonlStateStore {
    fn record_session(
        &self,
        session_id: SessionId,
        title: &str,
        created_at: DateTime<Utc>,
    ) -> Result<(), StateError> {
        info!("recording session creation (session_id={session_id})");
        let event = RolloutEvent::SessionCreated {
            session_id,
            title: title.to_string(),
            created_at,
        };
        self.write_new_rollout(session_id, &event)
    }

    fn append_message(&self, session_id: SessionId, message: &Message) -> Result<(), StateError> {
        debug!(
            "appending message event (session_id={}, role={}, content_len={})",
            session_id,
            message.role.as_str(),
            message.content.len()
        );
        let event = RolloutEvent::Message {
            session_id,
            message: message.clone(),
        };
        self.write_event(session_id, &event)
    }

    fn rename_session(&self, session_id: SessionId, title: &str) -> Result<(), StateError> {
        debug!("recording title change (session_id={session_id})");
        let event = RolloutEvent::TitleChanged {
            session_id,
            title: title.to_string(),
        };
        self.write_event(session_id, &event)
    }

    fn delete_message(&self, session_id: SessionId, index: usize) -> Result<(), StateError> {
        debug!("recording message deletion (session_id={session_id}, index={index})");
        self.write_event(session_id, &RolloutEvent::MessageDeleted { session_id, index })
    }

    fn load_session(&self, session_id: SessionId) -> Result<Option<Session>, StateError> {
        self.read_rollout(session_id)
    }

    fn list_sessions(&self) -> Result<Vec<SessionSummary>, StateError> {
        let mut summaries = Vec::new();
        for session_id in self.session_ids()? {
            match self.read_rollout(session_id) {
                Ok(Some(session)) => summaries.push(session.summary()),
                Ok(None) => {}
                Err(err) => warn!("skipping unreadable rollout (session_id={session_id}): {err}"),
            }
        }
        summaries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(summaries)
    }

    fn delete_session(&self, session_id: SessionId) -> Result<bool, StateError> {
        let _guard = self.write_lock.lock();
        let path = self.rollout_path(session_id);
        if path.exists() {
            info!("deleting session rollout (session_id={session_id})");
            fs::remove_file(path)?;
            Ok(true)
        } else {
            warn!("session rollout not found (session_id={session_id})");
            Ok(false)
        }
    }

    fn clear(&self) -> Result<usize, StateError> {
        let ids = self.session_ids()?;
        let _guard = self.write_lock.lock();
        for session_id in &ids {
            fs::remove_file(self.rollout_path(*session_id))?;
        }
        info!("cleared session rollouts (count={})", ids.len());
        Ok(ids.len())
    }
}

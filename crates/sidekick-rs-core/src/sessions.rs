//! In-memory session store with optional persistence via [`StateStore`].

use crate::error::SidekickCoreError;
use crate::state::{JsonlStateStore, StateStore};
use crate::types::{Message, Session, SessionId, SessionSummary};
use chrono::{DateTime, TimeDelta, Utc};
use directories::BaseDirs;
use log::{debug, info};
use parking_lot::RwLock;
use sidekick_rs_config::SessionsConfig;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use uuid::Uuid;

/// Conversation storage facade used by the chat engine and the CLI.
#[derive(Clone)]
pub struct SessionStore {
    /// In-memory session cache.
    sessions: Arc<RwLock<HashMap<SessionId, Session>>>,
    /// Optional persistent store for sessions.
    state_store: Option<Arc<dyn StateStore>>,
}

impl SessionStore {
    /// Create a new session store with an optional backing store.
    pub fn new(state_store: Option<Arc<dyn StateStore>>) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            state_store,
        }
    }

    /// Build a store from config, persisting under the configured root when enabled.
    pub fn from_config(config: &SessionsConfig) -> Result<Self, SidekickCoreError> {
        if !config.enabled {
            info!("session persistence disabled");
            return Ok(Self::new(None));
        }
        let root = resolve_storage_root(config.path.as_deref(), "sessions")?;
        let store = JsonlStateStore::new(root)?;
        Ok(Self::new(Some(Arc::new(store))))
    }

    /// Create a new session and persist it if configured.
    pub fn create_session(&self, title: Option<&str>) -> Result<SessionId, SidekickCoreError> {
        let session = Session {
            id: Uuid::new_v4(),
            title: title.unwrap_or_default().trim().to_string(),
            messages: Vec::new(),
            created_at: Utc::now(),
        };
        info!("created session (session_id={})", session.id);

        if let Some(store) = &self.state_store {
            store.record_session(session.id, &session.title, session.created_at)?;
        }

        let session_id = session.id;
        self.sessions.write().insert(session.id, session);
        Ok(session_id)
    }

    /// Resume a session from cache or persistent store.
    pub fn resume_session(&self, session_id: SessionId) -> Result<Session, SidekickCoreError> {
        if let Some(session) = self.sessions.read().get(&session_id).cloned() {
            return Ok(session);
        }

        if let Some(store) = &self.state_store
            && let Some(session) = store.load_session(session_id)?
        {
            debug!("loaded session from store (session_id={session_id})");
            self.sessions.write().insert(session_id, session.clone());
            return Ok(session);
        }

        Err(SidekickCoreError::UnknownSession(session_id))
    }

    /// List all sessions, newest activity first.
    pub fn list_sessions(&self) -> Result<Vec<SessionSummary>, SidekickCoreError> {
        if let Some(store) = &self.state_store {
            return Ok(store.list_sessions()?);
        }

        let mut summaries: Vec<SessionSummary> = self
            .sessions
            .read()
            .values()
            .map(Session::summary)
            .collect();
        summaries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(summaries)
    }

    /// Most recently active session, if any.
    pub fn latest_session(&self) -> Result<Option<Session>, SidekickCoreError> {
        match self.list_sessions()?.first() {
            Some(summary) => self.resume_session(summary.id).map(Some),
            None => Ok(None),
        }
    }

    /// Append a message, stamping it after the previous one, and persist it.
    pub fn append_message(
        &self,
        session_id: SessionId,
        message: Message,
    ) -> Result<Message, SidekickCoreError> {
        self.ensure_loaded(session_id)?;
        let mut sessions = self.sessions.write();
        let session = sessions
            .get_mut(&session_id)
            .ok_or(SidekickCoreError::UnknownSession(session_id))?;

        let mut message = message;
        let floor = session
            .messages
            .last()
            .map(|last| last.created_at)
            .unwrap_or(session.created_at);
        message.created_at = next_timestamp(floor, message.created_at);
        debug!(
            "appending message (session_id={}, role={}, content_len={})",
            session_id,
            message.role.as_str(),
            message.content.len()
        );

        if let Some(store) = &self.state_store {
            store.append_message(session_id, &message)?;
        }
        session.messages.push(message.clone());
        Ok(message)
    }

    /// Change a session title.
    pub fn rename_session(&self, session_id: SessionId, title: &str) -> Result<(), SidekickCoreError> {
        self.ensure_loaded(session_id)?;
        let title = title.trim();
        if let Some(store) = &self.state_store {
            store.rename_session(session_id, title)?;
        }
        if let Some(session) = self.sessions.write().get_mut(&session_id) {
            session.title = title.to_string();
        }
        info!("renamed session (session_id={session_id})");
        Ok(())
    }

    /// Remove a single message by index, returning it.
    pub fn delete_message(
        &self,
        session_id: SessionId,
        index: usize,
    ) -> Result<Message, SidekickCoreError> {
        self.ensure_loaded(session_id)?;
        let mut sessions = self.sessions.write();
        let session = sessions
            .get_mut(&session_id)
            .ok_or(SidekickCoreError::UnknownSession(session_id))?;
        let len = session.messages.len();
        if index >= len {
            return Err(SidekickCoreError::MessageOutOfRange { index, len });
        }
        if let Some(store) = &self.state_store {
            store.delete_message(session_id, index)?;
        }
        info!("deleted message (session_id={session_id}, index={index})");
        Ok(session.messages.remove(index))
    }

    /// Delete a session from cache and persistence.
    pub fn delete_session(&self, session_id: SessionId) -> Result<bool, SidekickCoreError> {
        info!("deleting session (session_id={session_id})");
        let mut removed = self.sessions.write().remove(&session_id).is_some();
        if let Some(store) = &self.state_store {
            removed = store.delete_session(session_id)? || removed;
        }
        Ok(removed)
    }

    /// Delete every session.
    pub fn clear(&self) -> Result<usize, SidekickCoreError> {
        let cached = {
            let mut sessions = self.sessions.write();
            let count = sessions.len();
            sessions.clear();
            count
        };
        match &self.state_store {
            Some(store) => Ok(store.clear()?),
            None => Ok(cached),
        }
    }

    fn ensure_loaded(&self, session_id: SessionId) -> Result<(), SidekickCoreError> {
        self.resume_session(session_id).map(|_| ())
    }
}

/// Choose a timestamp strictly after `floor`, preferring `candidate`.
fn next_timestamp(floor: DateTime<Utc>, candidate: DateTime<Utc>) -> DateTime<Utc> {
    if candidate > floor {
        candidate
    } else {
        floor + TimeDelta::microseconds(1)
    }
}

/// Resolve a storage directory from config, falling back to `~/.sidekick/<dir>`.
pub fn resolve_storage_root(
    path: Option<&str>,
    fallback_dir: &str,
) -> Result<PathBuf, SidekickCoreError> {
    let cwd = std::env::current_dir()?;
    if let Some(path) = path {
        let path = PathBuf::from(path);
        if path.is_absolute() {
            debug!("using absolute storage root: {}", path.display());
            return Ok(path);
        }
        return Ok(cwd.join(path));
    }

    if let Some(home) = BaseDirs::new().map(|dirs| dirs.home_dir().to_path_buf()) {
        return Ok(home.join(".sidekick").join(fallback_dir));
    }

    Ok(cwd.join(".sidekick").join(fallback_dir))
}

#[cfg(test)]
mod tests {
    use super::{SessionStore, next_timestamp, resolve_storage_root};
    use crate::error::SidekickCoreError;
    use crate::state::JsonlStateStore;
    use crate::types::Message;
    use chrono::{Duration, Utc};
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;
    use std::sync::Arc;
    use tempfile::tempdir;

    #[test]
    fn timestamps_never_go_backwards() {
        let now = Utc::now();
        assert_eq!(next_timestamp(now, now + Duration::seconds(1)), now + Duration::seconds(1));
        assert!(next_timestamp(now, now - Duration::seconds(5)) > now);
        assert!(next_timestamp(now, now) > now);
    }

    #[test]
    fn in_memory_store_orders_messages_monotonically() {
        let store = SessionStore::new(None);
        let session_id = store.create_session(None).expect("create");
        let mut stale = Message::user("first");
        stale.created_at = Utc::now() - Duration::days(1);
        let first = store.append_message(session_id, stale).expect("append");
        let second = store
            .append_message(session_id, Message::assistant("second"))
            .expect("append");
        assert!(second.created_at > first.created_at);

        let session = store.resume_session(session_id).expect("resume");
        assert!(session.messages[0].created_at > session.created_at);
        assert_eq!(store.list_sessions().expect("list").len(), 1);
    }

    #[test]
    fn persists_and_resumes_sessions() {
        let root = tempdir().expect("root");
        let state = JsonlStateStore::new(root.path()).expect("state");
        let store = SessionStore::new(Some(Arc::new(state)));

        let session_id = store.create_session(Some("Trip")).expect("create");
        let message = store
            .append_message(session_id, Message::user("hello"))
            .expect("append");
        store
            .append_message(session_id, Message::assistant("hi"))
            .expect("append");
        store.rename_session(session_id, " Weekend trip ").expect("rename");
        let removed = store.delete_message(session_id, 1).expect("delete message");
        assert_eq!(removed.content, "hi");

        let store = SessionStore::new(Some(Arc::new(
            JsonlStateStore::new(root.path()).expect("state"),
        )));
        let session = store.resume_session(session_id).expect("resume");
        assert_eq!(session.title, "Weekend trip");
        assert_eq!(session.messages, vec![message]);
        assert_eq!(
            store.latest_session().expect("latest").map(|session| session.id),
            Some(session_id)
        );

        let err = store.delete_message(session_id, 5).expect_err("out of range");
        assert!(matches!(
            err,
            SidekickCoreError::MessageOutOfRange { index: 5, len: 1 }
        ));

        assert_eq!(store.delete_session(session_id).expect("delete"), true);
        let err = store.resume_session(session_id).expect_err("missing");
        match err {
            SidekickCoreError::UnknownSession(id) => assert_eq!(id, session_id),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn clear_removes_everything() {
        let root = tempdir().expect("root");
        let store = SessionStore::new(Some(Arc::new(
            JsonlStateStore::new(root.path()).expect("state"),
        )));
        store.create_session(None).expect("one");
        store.create_session(None).expect("two");
        assert_eq!(store.clear().expect("clear"), 2);
        assert!(store.latest_session().expect("latest").is_none());
    }

    #[test]
    fn storage_root_respects_absolute_paths() {
        let temp = tempdir().expect("tempdir");
        let absolute = temp.path().to_string_lossy().to_string();
        assert_eq!(
            resolve_storage_root(Some(&absolute), "sessions").expect("root"),
            PathBuf::from(&absolute)
        );
        let fallback = resolve_storage_root(None, "sessions").expect("fallback");
        assert!(fallback.ends_with(".sidekick/sessions"));
    }
}

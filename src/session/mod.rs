
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;
use uuid::Uuid;

use crate::config::SessionConfig;
use crate::document::DocumentMetadata;
use crate::index::IndexHandle;
use crate::{QaError, Result};

const MAX_SESSION_ID_LEN: usize = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    #[inline]
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// The indexed document a session answers questions about
#[derive(Debug, Clone, PartialEq)]
pub struct SessionDocument {
    pub handle: IndexHandle,
    pub metadata: DocumentMetadata,
}

#[derive(Debug, Clone)]
pub struct Session {
    id: String,
    history: Vec<ChatMessage>,
    document: Option<SessionDocument>,
    created_at: DateTime<Utc>,
    last_access: Instant,
}

impl Session {
    fn new(id: String, document: Option<SessionDocument>) -> Self {
        Self {
            id,
            history: Vec::new(),
            document,
            created_at: Utc::now(),
            last_access: Instant::now(),
        }
    }

    #[inline]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Prior turns, oldest first; always whole user/assistant pairs
    #[inline]
    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }

    #[inline]
    pub fn document(&self) -> Option<&SessionDocument> {
        self.document.as_ref()
    }

    #[inline]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn is_expired(&self, ttl: Duration) -> bool {
        self.last_access.elapsed() > ttl
    }
}

/// In-memory sessions keyed by id, evicted after `ttl` without access
#[derive(Debug, Clone)]
pub struct SessionStore {
    sessions: Arc<DashMap<String, Session>>,
    ttl: Duration,
    max_history_messages: usize,
}

impl SessionStore {
    /// `max_history_messages` of 0 keeps everything; odd limits round up to whole exchanges
    #[inline]
    pub fn new(ttl: Duration, max_history_messages: usize) -> Self {
        Self {
            sessions: Arc::new(DashMap::new()),
            ttl,
            max_history_messages: max_history_messages.next_multiple_of(2),
        }
    }

    #[inline]
    pub fn from_config(config: &SessionConfig) -> Self {
        Self::new(
            Duration::from_secs(config.ttl_seconds),
            config.max_history_messages,
        )
    }

    /// Start a fresh session, replacing any previous one with the same id
    #[inline]
    pub fn create(&self, session_id: &str, document: Option<SessionDocument>) -> Result<Session> {
        validate_session_id(session_id)?;
        self.evict_expired();

        let session = Session::new(session_id.to_string(), document);
        self.sessions
            .insert(session_id.to_string(), session.clone());

        debug!("Created session {}", session_id);
        Ok(session)
    }

    /// Record one completed exchange. The user message and the reply land together, so a
    /// failed completion never leaves a dangling question in the history.
    #[inline]
    pub fn append(&self, session_id: &str, user: ChatMessage, assistant: ChatMessage) -> Result<()> {
        validate_session_id(session_id)?;
        self.evict_expired();

        let mut entry = self
            .sessions
            .entry(session_id.to_string())
            .or_insert_with(|| Session::new(session_id.to_string(), None));

        entry.history.push(user);
        entry.history.push(assistant);
        entry.last_access = Instant::now();

        if self.max_history_messages > 0 {
            while entry.history.len() > self.max_history_messages && entry.history.len() >= 2 {
                entry.history.drain(..2);
            }
        }

        Ok(())
    }

    /// Snapshot of a live session, refreshing its expiry
    #[inline]
    pub fn get(&self, session_id: &str) -> Option<Session> {
        self.evict_expired();

        let mut entry = self.sessions.get_mut(session_id)?;
        entry.last_access = Instant::now();
        Some(entry.clone())
    }

    /// Forget a session. Returns the removed session, if any.
    #[inline]
    pub fn clear(&self, session_id: &str) -> Option<Session> {
        self.sessions.remove(session_id).map(|(_, session)| {
            debug!("Cleared session {}", session_id);
            session
        })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    fn evict_expired(&self) {
        let ttl = self.ttl;
        self.sessions.retain(|id, session| {
            let keep = !session.is_expired(ttl);
            if !keep {
                debug!("Session {} expired", id);
            }
            keep
        });
    }
}

impl Default for SessionStore {
    #[inline]
    fn default() -> Self {
        Self::from_config(&SessionConfig::default())
    }
}

/// Session ids double as index table and file names
#[inline]
pub fn validate_session_id(session_id: &str) -> Result<()> {
    let valid = !session_id.is_empty()
        && session_id.len() <= MAX_SESSION_ID_LEN
        && session_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');

    if valid {
        Ok(())
    } else {
        Err(QaError::Input(format!(
            "Session id must be 1-{} characters of letters, digits, '_' or '-', got '{}'",
            MAX_SESSION_ID_LEN, session_id
        )))
    }
}

/// Fresh random session id, valid for `validate_session_id`
#[inline]
pub fn generate_session_id() -> String {
    Uuid::new_v4().simple().to_string()
}

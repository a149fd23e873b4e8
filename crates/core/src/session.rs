//! Session Store
//!
//! Per-conversation, append-only turn history. The store is the only shared
//! mutable state in the agent; it sits behind the [`SessionStore`] trait so a
//! persistent key-value backend can replace the in-memory default.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use tokio::sync::RwLock;

/// Identifies one planning conversation.
///
/// Derived from the sender's address, optionally narrowed by a
/// conversation identifier supplied by the transport.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionKey {
    pub sender: String,
    pub conversation: Option<String>,
}

impl SessionKey {
    pub fn new(sender: impl Into<String>, conversation: Option<String>) -> Self {
        Self {
            sender: sender.into(),
            conversation: conversation.filter(|c| !c.is_empty()),
        }
    }

    pub fn for_sender(sender: impl Into<String>) -> Self {
        Self::new(sender, None)
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.conversation {
            Some(conversation) => write!(f, "session:{}:{}", self.sender, conversation),
            None => write!(f, "session:{}", self.sender),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

/// One message within a session's history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl Turn {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Ordered turns of a session, oldest first.
pub type History = Vec<Turn>;

#[derive(Debug, Clone)]
pub struct Session {
    pub key: SessionKey,
    pub history: History,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    fn new(key: SessionKey) -> Self {
        let now = Utc::now();
        Self {
            key,
            history: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SessionError {
    /// A turn was appended to a session that was never created.
    #[error("Session '{0}' does not exist")]
    InvalidSession(String),
}

/// Key-value capability over session histories.
///
/// Implementations must never reorder or deduplicate turns.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Returns the history of `key`, registering an empty session if absent.
    async fn get_or_create(&self, key: &SessionKey) -> History;

    /// Returns the history of `key` without registering it.
    async fn get(&self, key: &SessionKey) -> Option<History>;

    /// Appends one turn to an existing session.
    async fn append(&self, key: &SessionKey, role: Role, text: &str) -> Result<(), SessionError>;

    /// Number of registered sessions.
    async fn len(&self) -> usize;

    async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

/// Process-lifetime store. Sessions are never evicted.
#[derive(Default)]
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<SessionKey, Session>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn get_or_create(&self, key: &SessionKey) -> History {
        if let Some(session) = self.sessions.read().await.get(key) {
            tracing::debug!(session = %key, turns = session.history.len(), "Loaded session");
            return session.history.clone();
        }

        let mut sessions = self.sessions.write().await;
        let session = sessions.entry(key.clone()).or_insert_with(|| {
            tracing::info!(session = %key, "Creating new session");
            Session::new(key.clone())
        });
        session.history.clone()
    }

    async fn get(&self, key: &SessionKey) -> Option<History> {
        self.sessions
            .read()
            .await
            .get(key)
            .map(|session| session.history.clone())
    }

    async fn append(&self, key: &SessionKey, role: Role, text: &str) -> Result<(), SessionError> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(key)
            .ok_or_else(|| SessionError::InvalidSession(key.to_string()))?;
        let turn = Turn::new(role, text);
        session.updated_at = turn.timestamp;
        session.history.push(turn);
        Ok(())
    }

    async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }
}

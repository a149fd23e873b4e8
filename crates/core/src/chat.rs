//! Chat Wire Types
//!
//! The message shapes exchanged with the surrounding agent transport: content
//! items tagged by `type`, acknowledgements keyed by message id, and the
//! classification of an inbound message into something the conversation
//! manager can act on.

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use uuid::Uuid;

// Agent addresses (`@agent1q...`) that transports prepend when routing.
static AGENT_MENTION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"@agent1q\w+\s*").unwrap());

/// Removes agent-address mentions and surrounding whitespace from user text.
pub fn strip_mentions(text: &str) -> String {
    AGENT_MENTION_RE.replace_all(text, "").trim().to_string()
}

/// One item of a chat message's content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ChatContent {
    Text { text: String },
    StartSession,
    EndSession,
}

/// A chat message as carried by the transport, in either direction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub msg_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub content: Vec<ChatContent>,
}

impl ChatMessage {
    /// Builds a fresh outbound message with a single text item.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            msg_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            content: vec![ChatContent::Text { text: text.into() }],
        }
    }

    /// Builds a text message that also tells the peer the session is over.
    pub fn closing(text: impl Into<String>) -> Self {
        let mut msg = Self::text(text);
        msg.content.push(ChatContent::EndSession);
        msg
    }

    /// Returns the first text item, if any.
    pub fn first_text(&self) -> Option<&str> {
        self.content.iter().find_map(|item| match item {
            ChatContent::Text { text } => Some(text.as_str()),
            _ => None,
        })
    }

    pub fn ends_session(&self) -> bool {
        self.content.contains(&ChatContent::EndSession)
    }
}

/// Confirms receipt of a message, independent of any reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatAcknowledgement {
    pub acknowledged_msg_id: Uuid,
    pub timestamp: DateTime<Utc>,
}

impl ChatAcknowledgement {
    pub fn for_message(msg_id: Uuid) -> Self {
        Self {
            acknowledged_msg_id: msg_id,
            timestamp: Utc::now(),
        }
    }
}

/// What an inbound message asks the agent to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// A planning turn carrying user text.
    Text(String),
    StartSession,
    EndSession,
}

impl Inbound {
    /// Classifies a chat message. Returns `None` when the message carries
    /// neither non-blank text nor a session marker.
    ///
    /// Text has agent mentions stripped, so a message that only addresses the
    /// agent counts as blank.
    pub fn from_chat(msg: &ChatMessage) -> Option<Self> {
        if let Some(text) = msg.first_text() {
            let text = strip_mentions(text);
            if !text.is_empty() {
                return Some(Inbound::Text(text));
            }
        }
        msg.content.iter().find_map(|item| match item {
            ChatContent::StartSession => Some(Inbound::StartSession),
            ChatContent::EndSession => Some(Inbound::EndSession),
            ChatContent::Text { .. } => None,
        })
    }
}

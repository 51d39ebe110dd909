//! Chat session, message, and live-stream state types for Carelog.
//!
//! These types model conversations between a patient and the AI backend:
//! persisted sessions and messages, plus the in-memory `StreamState` that
//! tracks one conversation while tokens are still arriving.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use std::fmt;
use std::str::FromStr;

/// Author of a chat message.
///
/// Stored lowercase; maps to the CHECK constraint in the SQLite schema:
/// `CHECK (role IN ('user', 'ai', 'system'))`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Ai,
    System,
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageRole::User => write!(f, "user"),
            MessageRole::Ai => write!(f, "ai"),
            MessageRole::System => write!(f, "system"),
        }
    }
}

impl FromStr for MessageRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "user" => Ok(MessageRole::User),
            "ai" => Ok(MessageRole::Ai),
            "system" => Ok(MessageRole::System),
            other => Err(format!("invalid message role: '{other}'")),
        }
    }
}

/// Key under which a live conversation is tracked by the coordinator.
///
/// A conversation started without a session id is keyed by a client-generated
/// `Pending` placeholder until the backend assigns the real id, at which point
/// the coordinator relocates it to `Assigned`. Keeping the two forms as enum
/// variants (rather than a string prefix convention) makes the distinction
/// impossible to miss at call sites.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SessionKey {
    /// Client-generated placeholder, used before the backend has responded.
    Pending(Uuid),
    /// Backend-assigned session id.
    Assigned(String),
}

impl SessionKey {
    /// Generate a fresh placeholder key for a not-yet-created session.
    pub fn pending() -> Self {
        SessionKey::Pending(Uuid::now_v7())
    }

    /// Wrap a backend-assigned session id.
    pub fn assigned(id: impl Into<String>) -> Self {
        SessionKey::Assigned(id.into())
    }

    /// The real session id, if the backend has assigned one.
    pub fn assigned_id(&self) -> Option<&str> {
        match self {
            SessionKey::Assigned(id) => Some(id),
            SessionKey::Pending(_) => None,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, SessionKey::Pending(_))
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionKey::Pending(uuid) => write!(f, "temp-{uuid}"),
            SessionKey::Assigned(id) => write!(f, "{id}"),
        }
    }
}

/// A single message within a chat session.
///
/// `content` is plaintext in memory and ciphertext at rest. Messages are
/// immutable once persisted; the only in-place mutation is content growth on
/// an AI message while its stream is still running (pre-persistence).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: Uuid,
    /// Session the message belongs to. While a conversation is still waiting
    /// for its backend-assigned id this holds the pending key's string form;
    /// the coordinator rewrites it before anything is persisted.
    pub session_id: String,
    pub user_id: String,
    pub role: MessageRole,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// A persistent conversation thread between one user and the AI backend.
///
/// `title` is plaintext in memory and ciphertext at rest. `updated_at` is
/// bumped on every new message in the session. The id is a `String` because
/// the backend assigns it and its format is opaque to this crate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatSession {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Live state of one conversation, in memory only -- never persisted.
///
/// One instance exists per active or most-recently-active conversation,
/// keyed in the coordinator's map by [`SessionKey`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StreamState {
    /// Backend-assigned session id, once known.
    pub session_id: Option<String>,
    /// Conversation history plus the in-flight user message and AI reply.
    pub messages: Vec<ChatMessage>,
    /// True exactly while a network operation for this stream is outstanding.
    pub is_typing: bool,
    /// Progress text from the backend ("Thinking...", "Analyzing records...").
    /// Cleared as soon as the first content fragment lands.
    pub status: Option<String>,
    /// Terminal failure description, if the stream ended in an error.
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_role_roundtrip() {
        for role in [MessageRole::User, MessageRole::Ai, MessageRole::System] {
            let s = role.to_string();
            let parsed: MessageRole = s.parse().unwrap();
            assert_eq!(role, parsed);
        }
    }

    #[test]
    fn test_message_role_serde() {
        let json = serde_json::to_string(&MessageRole::Ai).unwrap();
        assert_eq!(json, "\"ai\"");
        let parsed: MessageRole = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, MessageRole::Ai);
    }

    #[test]
    fn test_message_role_rejects_unknown() {
        assert!("assistant".parse::<MessageRole>().is_err());
    }

    #[test]
    fn test_session_key_pending_display_is_prefixed() {
        let key = SessionKey::pending();
        assert!(key.to_string().starts_with("temp-"));
        assert!(key.is_pending());
        assert_eq!(key.assigned_id(), None);
    }

    #[test]
    fn test_session_key_assigned_display_is_raw_id() {
        let key = SessionKey::assigned("s1");
        assert_eq!(key.to_string(), "s1");
        assert!(!key.is_pending());
        assert_eq!(key.assigned_id(), Some("s1"));
    }

    #[test]
    fn test_session_key_pending_keys_are_unique() {
        let a = SessionKey::pending();
        let b = SessionKey::pending();
        assert_ne!(a, b);
    }

    #[test]
    fn test_chat_message_serialize() {
        let msg = ChatMessage {
            id: Uuid::now_v7(),
            session_id: "s1".to_string(),
            user_id: "u1".to_string(),
            role: MessageRole::User,
            content: "What's my cholesterol?".to_string(),
            created_at: Utc::now(),
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"role\":\"user\""));
        assert!(json.contains("\"session_id\":\"s1\""));
    }

    #[test]
    fn test_stream_state_default_is_idle() {
        let state = StreamState::default();
        assert!(!state.is_typing);
        assert!(state.messages.is_empty());
        assert!(state.status.is_none());
        assert!(state.error.is_none());
        assert!(state.session_id.is_none());
    }
}

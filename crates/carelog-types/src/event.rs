//! Server event types for the Carelog streaming transport.
//!
//! `ServerEvent` is the decoded form of one server-sent-event frame from the
//! chat backend. The transport decodes every frame into this tagged union
//! exactly once, at the wire boundary; nothing downstream ever inspects raw
//! payload shapes.

use serde::{Deserialize, Serialize};

/// One decoded event from the streaming chat endpoint.
///
/// The backend's typed envelope (`{"type": "session_created", ...}`,
/// `{"type": "status", ...}`) deserializes into this directly; older payload
/// shapes are normalized into it by the transport's frame decoder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    /// The backend created (or confirmed) the session handling this call.
    ///
    /// For calls made without a session id this arrives before any content
    /// fragments.
    SessionCreated { session_id: String },

    /// Progress text to show while the model works. May fire zero or more
    /// times; each one supersedes the previous.
    Status {
        #[serde(alias = "status", alias = "message")]
        text: String,
    },

    /// One increment of AI-generated text.
    Fragment { text: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_created_deserializes_from_typed_envelope() {
        let event: ServerEvent =
            serde_json::from_str(r#"{"type": "session_created", "session_id": "s1"}"#).unwrap();
        assert_eq!(
            event,
            ServerEvent::SessionCreated {
                session_id: "s1".to_string()
            }
        );
    }

    #[test]
    fn test_status_deserializes_from_status_field() {
        let event: ServerEvent =
            serde_json::from_str(r#"{"type": "status", "status": "Analyzing records..."}"#)
                .unwrap();
        assert_eq!(
            event,
            ServerEvent::Status {
                text: "Analyzing records...".to_string()
            }
        );
    }

    #[test]
    fn test_status_deserializes_from_message_field() {
        let event: ServerEvent =
            serde_json::from_str(r#"{"type": "status", "message": "Working"}"#).unwrap();
        assert_eq!(
            event,
            ServerEvent::Status {
                text: "Working".to_string()
            }
        );
    }

    #[test]
    fn test_serialize_uses_snake_case_tag() {
        let json = serde_json::to_string(&ServerEvent::Fragment {
            text: "hi".to_string(),
        })
        .unwrap();
        assert!(json.contains("\"type\":\"fragment\""));
    }
}

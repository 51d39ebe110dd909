//! Multi-session activity view-model.
//!
//! Derives the "other conversations still working" indicator from a stream
//! snapshot: one entry per stream that is typing under a backend-assigned
//! session id, sorted for stable rendering.

use carelog_core::broadcast::StreamSnapshot;

/// One in-flight conversation, as shown in the activity indicator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveStream {
    /// Backend-assigned session id.
    pub session_id: String,
    /// Current progress text, if the backend has sent one.
    pub status: Option<String>,
}

impl ActiveStream {
    /// Badge label: the first 8 characters of the session id.
    pub fn short_id(&self) -> &str {
        match self.session_id.char_indices().nth(8) {
            Some((idx, _)) => &self.session_id[..idx],
            None => &self.session_id,
        }
    }
}

/// All streams currently typing under an assigned session id, sorted by id.
///
/// Streams still waiting for their backend id are excluded: they have no
/// stable identity to render a badge for, and they become visible here the
/// moment the session-created event relocates them.
pub fn active_streams(snapshot: &StreamSnapshot) -> Vec<ActiveStream> {
    let mut streams: Vec<ActiveStream> = snapshot
        .iter()
        .filter(|(_, state)| state.is_typing)
        .filter_map(|(key, state)| {
            key.assigned_id().map(|id| ActiveStream {
                session_id: id.to_string(),
                status: state.status.clone(),
            })
        })
        .collect();

    streams.sort_by(|a, b| a.session_id.cmp(&b.session_id));
    streams
}

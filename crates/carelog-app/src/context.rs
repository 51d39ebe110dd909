//! UI-facing chat handle.
//!
//! `ChatContext` is what a chat page or sidebar holds: the coordinator's
//! streaming surface, the store's read paths, and the one piece of state
//! owned by presentation rather than by the coordinator -- which session is
//! currently selected on screen.

use std::sync::{Arc, Mutex, MutexGuard};

use tokio_util::sync::CancellationToken;

use carelog_core::broadcast::{StreamSnapshot, StreamSubscription};
use carelog_core::coordinator::ChatCoordinator;
use carelog_core::store::ChatStore;
use carelog_core::transport::ChatTransport;
use carelog_types::chat::{ChatMessage, ChatSession, SessionKey, StreamState};
use carelog_types::error::{CoordinatorError, StoreError};

/// Handle UI components use to drive chat.
///
/// Thin by design: streaming behavior belongs to the coordinator and
/// persistence to the store; this type only adds the active-session
/// selection and clones cheaply alongside the `Arc` it wraps.
pub struct ChatContext<S: ChatStore, T: ChatTransport> {
    coordinator: Arc<ChatCoordinator<S, T>>,
    active: Mutex<Option<SessionKey>>,
}

impl<S: ChatStore, T: ChatTransport> ChatContext<S, T> {
    /// Create a handle onto a shared coordinator.
    pub fn new(coordinator: Arc<ChatCoordinator<S, T>>) -> Self {
        Self {
            coordinator,
            active: Mutex::new(None),
        }
    }

    /// Subscribe to stream snapshots (initial state plus every update).
    pub fn subscribe(&self) -> StreamSubscription {
        self.coordinator.subscribe()
    }

    /// Set or clear the signed-in user.
    pub fn set_user_id(&self, user_id: Option<String>) {
        self.coordinator.set_user_id(user_id);
    }

    /// The signed-in user, if any.
    pub fn user_id(&self) -> Option<String> {
        self.coordinator.user_id()
    }

    /// Send a message and run its stream to completion.
    ///
    /// See [`ChatCoordinator::send_message`] for the containment contract:
    /// the only synchronous error is a missing user id.
    pub async fn send_message(
        &self,
        session_id: Option<String>,
        content: String,
        history: Vec<ChatMessage>,
    ) -> Result<(), CoordinatorError> {
        self.coordinator
            .send_message(session_id, content, history)
            .await
    }

    /// [`send_message`](Self::send_message) with an explicit cancellation
    /// handle, for hosts that surface a stop button.
    pub async fn send_message_with_cancellation(
        &self,
        session_id: Option<String>,
        content: String,
        history: Vec<ChatMessage>,
        cancel: CancellationToken,
    ) -> Result<(), CoordinatorError> {
        self.coordinator
            .send_message_with_cancellation(session_id, content, history, cancel)
            .await
    }

    /// Snapshot of every live stream.
    pub fn streams(&self) -> StreamSnapshot {
        self.coordinator.snapshot()
    }

    /// The session currently selected on screen, if any.
    pub fn active_session(&self) -> Option<SessionKey> {
        self.lock_active().clone()
    }

    /// Select (or deselect) the on-screen session.
    pub fn set_active_session(&self, key: Option<SessionKey>) {
        *self.lock_active() = key;
    }

    /// Live state of the selected session's stream, if one exists.
    pub fn active_stream(&self) -> Option<StreamState> {
        let key = self.lock_active().clone()?;
        self.coordinator.stream(&key)
    }

    /// The user's sessions, most recently updated first.
    pub async fn sessions(&self, user_id: &str) -> Result<Vec<ChatSession>, StoreError> {
        self.coordinator.store().sessions_for_user(user_id).await
    }

    /// A session's persisted messages, oldest first.
    pub async fn messages(&self, session_id: &str) -> Result<Vec<ChatMessage>, StoreError> {
        self.coordinator.store().messages_for_session(session_id).await
    }

    /// Delete a session and its messages.
    ///
    /// Clears the active selection if it pointed at the deleted session.
    pub async fn delete_session(&self, session_id: &str) -> Result<(), StoreError> {
        self.coordinator.store().delete_session(session_id).await?;

        let mut active = self.lock_active();
        if active.as_ref().and_then(SessionKey::assigned_id) == Some(session_id) {
            *active = None;
        }
        Ok(())
    }

    fn lock_active(&self) -> MutexGuard<'_, Option<SessionKey>> {
        self.active
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

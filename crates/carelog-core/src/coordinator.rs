//! The chat coordinator: one state machine multiplexing every live
//! conversation stream.
//!
//! The coordinator owns an in-memory map of [`StreamState`] keyed by
//! [`SessionKey`], drives the transport for each send, applies incoming
//! fragments to the right stream, persists messages and sessions through the
//! store at fixed checkpoints, and publishes a copy-on-notify snapshot to
//! subscribers after every mutation.
//!
//! Construct one per application and inject it (see `carelog-app`); there is
//! no global instance.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use futures_util::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use carelog_types::chat::{ChatMessage, ChatSession, MessageRole, SessionKey, StreamState};
use carelog_types::config::CoordinatorConfig;
use carelog_types::error::{CoordinatorError, StoreError};
use carelog_types::event::ServerEvent;

use crate::broadcast::{StreamBroadcaster, StreamSnapshot, StreamSubscription};
use crate::store::ChatStore;
use crate::transport::ChatTransport;

/// Status shown from the moment a message is sent until the backend says
/// anything else.
const INITIAL_STATUS: &str = "Thinking...";

/// New sessions are titled with a prefix of their first message.
const TITLE_MAX_CHARS: usize = 50;

/// Mutable coordinator state, guarded by one lock.
struct CoordinatorState {
    streams: HashMap<SessionKey, StreamState>,
    user_id: Option<String>,
}

/// Everything one in-flight send tracks across transport events.
///
/// `key` starts as the caller-provided session id (or a fresh pending key)
/// and is rewritten when the backend assigns the real id; every later event
/// is applied under whichever key is authoritative at that moment.
struct StreamFlight {
    key: SessionKey,
    user_id: String,
    content: String,
    user_msg: ChatMessage,
    ai_msg_id: Uuid,
    accumulator: String,
    began_with_session: bool,
}

/// Multiplexes every live chat stream for one application.
///
/// Generic over the store and transport ports to maintain clean layering
/// (carelog-core never depends on carelog-infra). All methods take `&self`;
/// the internal lock is never held across an await, and every mutation is
/// published as one snapshot before the lock is released, so concurrent
/// sends can never observe -- or broadcast -- a half-applied change.
pub struct ChatCoordinator<S: ChatStore, T: ChatTransport> {
    state: Mutex<CoordinatorState>,
    broadcaster: StreamBroadcaster,
    store: S,
    transport: T,
    config: CoordinatorConfig,
}

impl<S: ChatStore, T: ChatTransport> ChatCoordinator<S, T> {
    /// Create a coordinator over the given store and transport.
    pub fn new(store: S, transport: T, config: CoordinatorConfig) -> Self {
        let broadcaster = StreamBroadcaster::new(config.channel_capacity);
        Self {
            state: Mutex::new(CoordinatorState {
                streams: HashMap::new(),
                user_id: None,
            }),
            broadcaster,
            store,
            transport,
            config,
        }
    }

    /// Access the underlying store (for read paths that bypass streaming,
    /// e.g. loading a session list).
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Set or clear the active user.
    ///
    /// Must be called with `Some` before [`send_message`](Self::send_message).
    /// With `flush_on_user_change` enabled, switching users purges all
    /// in-memory streams and publishes the now-empty snapshot; otherwise
    /// prior streams remain associated with whichever user was active when
    /// they were created.
    pub fn set_user_id(&self, user_id: Option<String>) {
        let mut state = self.lock_state();
        let changed = state.user_id != user_id;
        state.user_id = user_id;

        if changed && self.config.flush_on_user_change && !state.streams.is_empty() {
            let flushed = state.streams.len();
            state.streams.clear();
            info!(flushed, "Purged in-memory streams on user change");
            self.broadcaster.publish(Arc::new(state.streams.clone()));
        }
    }

    /// The currently active user id, if any.
    pub fn user_id(&self) -> Option<String> {
        self.lock_state().user_id.clone()
    }

    /// Subscribe to coordinator state.
    ///
    /// The receiver is created while the state lock is held, so the returned
    /// `initial` snapshot and the update stream are gapless: every snapshot
    /// published after `initial` will be observed.
    pub fn subscribe(&self) -> StreamSubscription {
        let state = self.lock_state();
        let updates = self.broadcaster.subscribe();
        StreamSubscription {
            initial: Arc::new(state.streams.clone()),
            updates,
        }
    }

    /// The live state of one stream, if it exists.
    pub fn stream(&self, key: &SessionKey) -> Option<StreamState> {
        self.lock_state().streams.get(key).cloned()
    }

    /// A snapshot of all streams.
    pub fn snapshot(&self) -> StreamSnapshot {
        Arc::new(self.lock_state().streams.clone())
    }

    /// Send a chat message and run its stream to completion.
    ///
    /// `session_id = None` starts a new session; `history` is the prior
    /// conversation to keep visible above the new exchange. The only error
    /// this returns is [`CoordinatorError::UserNotSet`], raised before any
    /// state is created. Every later failure -- transport, decode,
    /// persistence -- is contained into the affected stream's `error` field
    /// and observed through snapshots, never through this `Result`.
    pub async fn send_message(
        &self,
        session_id: Option<String>,
        content: String,
        history: Vec<ChatMessage>,
    ) -> Result<(), CoordinatorError> {
        self.send_message_with_cancellation(session_id, content, history, CancellationToken::new())
            .await
    }

    /// [`send_message`](Self::send_message) with an explicit cancellation
    /// handle.
    ///
    /// Cancelling ends the stream early: the entry stays in the map with
    /// `is_typing = false`, nothing is persisted, and the future returns
    /// promptly. The default path passes a token that never fires, which
    /// preserves run-to-completion behavior.
    pub async fn send_message_with_cancellation(
        &self,
        session_id: Option<String>,
        content: String,
        history: Vec<ChatMessage>,
        cancel: CancellationToken,
    ) -> Result<(), CoordinatorError> {
        let user_id = self
            .lock_state()
            .user_id
            .clone()
            .ok_or(CoordinatorError::UserNotSet)?;

        let key = match session_id {
            Some(id) => SessionKey::assigned(id),
            None => SessionKey::pending(),
        };

        let user_msg = ChatMessage {
            id: Uuid::now_v7(),
            session_id: key.to_string(),
            user_id: user_id.clone(),
            role: MessageRole::User,
            content: content.clone(),
            created_at: Utc::now(),
        };
        let ai_msg_id = Uuid::now_v7();
        let ai_placeholder = ChatMessage {
            id: ai_msg_id,
            session_id: key.to_string(),
            user_id: user_id.clone(),
            role: MessageRole::Ai,
            content: String::new(),
            created_at: Utc::now(),
        };

        let mut messages = history;
        messages.push(user_msg.clone());
        messages.push(ai_placeholder);

        // Seed the stream and publish before any network I/O. A stream
        // already at this key (a superseded conversation) is replaced
        // wholesale.
        self.mutate_and_publish(|state| {
            state.streams.insert(
                key.clone(),
                StreamState {
                    session_id: key.assigned_id().map(str::to_string),
                    messages,
                    is_typing: true,
                    status: Some(INITIAL_STATUS.to_string()),
                    error: None,
                },
            );
        });
        info!(session_key = %key, user_id = %user_id, "Chat stream started");

        let mut flight = StreamFlight {
            began_with_session: key.assigned_id().is_some(),
            key,
            user_id,
            content,
            user_msg,
            ai_msg_id,
            accumulator: String::new(),
        };

        if let Err(err) = self.drive(&mut flight, cancel).await {
            error!(session_key = %flight.key, error = %err, "Chat stream failed; error recorded on stream");
            self.update_stream(&flight.key, |stream| {
                stream.error = Some(err.to_string());
                stream.is_typing = false;
                stream.status = None;
            });
        }

        Ok(())
    }

    /// Consume the transport stream for one send, applying each event and
    /// finalizing persistence. Store errors propagate to the caller's
    /// top-level containment.
    async fn drive(
        &self,
        flight: &mut StreamFlight,
        cancel: CancellationToken,
    ) -> Result<(), StoreError> {
        let mut events = self
            .transport
            .stream_chat(&flight.content, flight.key.assigned_id());

        loop {
            let event = tokio::select! {
                _ = cancel.cancelled() => {
                    info!(session_key = %flight.key, "Chat stream cancelled");
                    self.update_stream(&flight.key, |stream| {
                        stream.is_typing = false;
                        stream.status = None;
                    });
                    return Ok(());
                }
                event = events.next() => event,
            };

            let Some(event) = event else { break };

            match event {
                Ok(ServerEvent::SessionCreated { session_id }) => {
                    self.on_session_created(flight, session_id).await?;
                }
                Ok(ServerEvent::Status { text }) => {
                    self.update_stream(&flight.key, |stream| {
                        stream.status = Some(text);
                    });
                }
                Ok(ServerEvent::Fragment { text }) => {
                    flight.accumulator.push_str(&text);
                    let content = flight.accumulator.clone();
                    let ai_msg_id = flight.ai_msg_id;
                    self.update_stream(&flight.key, |stream| {
                        stream.status = None;
                        if let Some(msg) = stream.messages.iter_mut().find(|m| m.id == ai_msg_id) {
                            msg.content = content;
                        }
                    });
                }
                Err(err) => {
                    // Transport errors are terminal for the stream; partial
                    // content already applied stays visible.
                    warn!(session_key = %flight.key, error = %err, "Chat stream transport error");
                    self.update_stream(&flight.key, |stream| {
                        stream.error = Some(err.to_string());
                        stream.is_typing = false;
                    });
                    break;
                }
            }
        }

        self.finalize(flight).await
    }

    /// Handle the backend's session-created event.
    ///
    /// This is the user-message persistence checkpoint. For a call that
    /// began without a session id it also relocates the stream from its
    /// pending key to the assigned id -- published as exactly one snapshot,
    /// so subscribers see the conversation under the old key or the new
    /// one, never both and never neither -- and creates the session row.
    async fn on_session_created(
        &self,
        flight: &mut StreamFlight,
        session_id: String,
    ) -> Result<(), StoreError> {
        let new_key = SessionKey::assigned(session_id.clone());

        if flight.key != new_key {
            let old_key = flight.key.clone();
            let old_id = old_key.to_string();
            self.mutate_and_publish(|state| {
                if let Some(mut stream) = state.streams.remove(&old_key) {
                    stream.session_id = Some(session_id.clone());
                    for msg in &mut stream.messages {
                        if msg.session_id == old_id {
                            msg.session_id = session_id.clone();
                        }
                    }
                    state.streams.insert(new_key.clone(), stream);
                }
            });
            info!(old_key = %old_key, session_id = %new_key, "Session id assigned; stream relocated");
            flight.key = new_key;
        }

        flight.user_msg.session_id = flight.key.to_string();

        if flight.began_with_session {
            // Continuing an existing session: bump activity ahead of the
            // message, never rewriting the stored title.
            self.touch_session(flight).await?;
            self.store.save_message(&flight.user_msg).await?;
        } else {
            let now = Utc::now();
            let session = ChatSession {
                id: flight.user_msg.session_id.clone(),
                user_id: flight.user_id.clone(),
                title: session_title(&flight.content),
                created_at: now,
                updated_at: now,
            };
            // Session row first so the message never references a session
            // that has not been written yet.
            self.store.save_session(&session).await?;
            self.store.save_message(&flight.user_msg).await?;
            info!(session_id = %session.id, "New session persisted");
        }

        Ok(())
    }

    /// Persist the finished AI message (when a real session id is known) and
    /// settle the stream into its idle state.
    async fn finalize(&self, flight: &mut StreamFlight) -> Result<(), StoreError> {
        if let Some(session_id) = flight.key.assigned_id() {
            let ai_msg = ChatMessage {
                id: flight.ai_msg_id,
                session_id: session_id.to_string(),
                user_id: flight.user_id.clone(),
                role: MessageRole::Ai,
                content: flight.accumulator.clone(),
                created_at: Utc::now(),
            };
            // Runs even after a transport error: whatever partial content
            // subscribers already saw is what gets stored, not rolled back.
            self.touch_session(flight).await?;
            self.store.save_message(&ai_msg).await?;
        }

        self.update_stream(&flight.key, |stream| {
            stream.is_typing = false;
            stream.status = None;
        });
        info!(session_key = %flight.key, "Chat stream settled");
        Ok(())
    }

    /// Bump the session's `updated_at`, recreating the row when the session
    /// was deleted locally mid-conversation. Every message this flight
    /// persists has a parent session row.
    async fn touch_session(&self, flight: &StreamFlight) -> Result<(), StoreError> {
        let Some(session_id) = flight.key.assigned_id() else {
            return Ok(());
        };
        let sessions = self.store.sessions_for_user(&flight.user_id).await?;
        match sessions.into_iter().find(|s| s.id == session_id) {
            Some(mut session) => {
                session.updated_at = Utc::now();
                self.store.save_session(&session).await
            }
            None => {
                warn!(session_id = %session_id, "Session row missing for continuing chat; recreating");
                let now = Utc::now();
                self.store
                    .save_session(&ChatSession {
                        id: session_id.to_string(),
                        user_id: flight.user_id.clone(),
                        title: session_title(&flight.content),
                        created_at: now,
                        updated_at: now,
                    })
                    .await
            }
        }
    }

    /// Apply one mutation and publish the resulting snapshot before the
    /// state lock is released. Every write to `streams` publishes under the
    /// same lock acquisition.
    fn mutate_and_publish(&self, mutate: impl FnOnce(&mut CoordinatorState)) {
        let mut state = self.lock_state();
        mutate(&mut state);
        self.broadcaster.publish(Arc::new(state.streams.clone()));
    }

    /// Mutate one stream and publish. A key absent from the map was purged
    /// by a user switch; events still arriving for it from an in-flight
    /// send are dropped without publishing, so a purged stream never
    /// reappears in a snapshot.
    fn update_stream(&self, key: &SessionKey, mutate: impl FnOnce(&mut StreamState)) {
        let mut state = self.lock_state();
        let Some(stream) = state.streams.get_mut(key) else {
            return;
        };
        mutate(stream);
        self.broadcaster.publish(Arc::new(state.streams.clone()));
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, CoordinatorState> {
        // A poisoned lock only means another send panicked mid-mutation;
        // the map itself is still structurally sound, so recover it.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// First `TITLE_MAX_CHARS` characters of the message, on char boundaries.
fn session_title(content: &str) -> String {
    content.chars().take(TITLE_MAX_CHARS).collect()
}

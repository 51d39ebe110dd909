//! ChatStore trait definition.
//!
//! Durable CRUD for chat sessions and messages. Field-level encryption is an
//! implementation concern: callers hand over and receive plaintext.

use carelog_types::chat::{ChatMessage, ChatSession};
use carelog_types::error::StoreError;

/// Port for encrypted chat persistence.
///
/// Implementations live in carelog-infra (e.g., `SqliteChatStore`). They
/// encrypt `title`/`content` at write time and substitute a visible sentinel
/// for any record that fails to decrypt at read time, so one corrupt row
/// never fails a listing.
///
/// Uses native async fn in traits (RPITIT, Rust 2024 edition).
pub trait ChatStore: Send + Sync {
    /// Upsert a session by id, encrypting `title` before write.
    fn save_session(
        &self,
        session: &ChatSession,
    ) -> impl std::future::Future<Output = Result<(), StoreError>> + Send;

    /// All sessions for a user, most recent activity first.
    fn sessions_for_user(
        &self,
        user_id: &str,
    ) -> impl std::future::Future<Output = Result<Vec<ChatSession>, StoreError>> + Send;

    /// Delete a session and, in the same transaction, every message in it.
    ///
    /// Readers never observe an intermediate state where messages outlive
    /// their session.
    fn delete_session(
        &self,
        session_id: &str,
    ) -> impl std::future::Future<Output = Result<(), StoreError>> + Send;

    /// Upsert a message by id, encrypting `content` before write.
    fn save_message(
        &self,
        message: &ChatMessage,
    ) -> impl std::future::Future<Output = Result<(), StoreError>> + Send;

    /// All messages in a session, oldest first.
    fn messages_for_session(
        &self,
        session_id: &str,
    ) -> impl std::future::Future<Output = Result<Vec<ChatMessage>, StoreError>> + Send;
}

//! SQLite chat store with per-user encryption at rest.
//!
//! Implements `ChatStore` from `carelog-core` using sqlx with split
//! read/write pools. `title` and `content` columns hold ciphertext produced
//! by [`RecordCipher`]; encryption happens on the way in, decryption on the
//! way out, and a record that fails to decrypt renders as the sentinel
//! instead of failing the query that found it.

use std::sync::Arc;

use carelog_core::store::ChatStore;
use carelog_types::chat::{ChatMessage, ChatSession, MessageRole};
use carelog_types::error::StoreError;
use chrono::{DateTime, Utc};
use sqlx::Row;
use uuid::Uuid;

use super::pool::DatabasePool;
use crate::crypto::RecordCipher;

/// SQLite-backed implementation of `ChatStore`.
///
/// Clones share the pool and the cipher (including its derived-key cache),
/// so handing one to the coordinator and keeping another for direct reads
/// is cheap.
#[derive(Clone)]
pub struct SqliteChatStore {
    pool: DatabasePool,
    cipher: Arc<RecordCipher>,
}

impl SqliteChatStore {
    /// Create a new store backed by the given database pool and cipher.
    pub fn new(pool: DatabasePool, cipher: Arc<RecordCipher>) -> Self {
        Self { pool, cipher }
    }
}

// ---------------------------------------------------------------------------
// Private Row types for SQLite-to-domain mapping
// ---------------------------------------------------------------------------

/// Internal row type for mapping SQLite rows to domain ChatSession.
struct ChatSessionRow {
    id: String,
    user_id: String,
    title: String,
    created_at: String,
    updated_at: String,
}

impl ChatSessionRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            title: row.try_get("title")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn into_session(self, cipher: &RecordCipher) -> Result<ChatSession, StoreError> {
        let created_at = parse_datetime(&self.created_at)?;
        let updated_at = parse_datetime(&self.updated_at)?;
        let title = cipher.decrypt_or_sentinel(&self.user_id, &self.title);

        Ok(ChatSession {
            id: self.id,
            user_id: self.user_id,
            title,
            created_at,
            updated_at,
        })
    }
}

/// Internal row type for mapping SQLite rows to domain ChatMessage.
struct ChatMessageRow {
    id: String,
    session_id: String,
    user_id: String,
    role: String,
    content: String,
    created_at: String,
}

impl ChatMessageRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            session_id: row.try_get("session_id")?,
            user_id: row.try_get("user_id")?,
            role: row.try_get("role")?,
            content: row.try_get("content")?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn into_message(self, cipher: &RecordCipher) -> Result<ChatMessage, StoreError> {
        let id = Uuid::parse_str(&self.id)
            .map_err(|e| StoreError::Query(format!("invalid message id: {e}")))?;
        let role: MessageRole = self
            .role
            .parse()
            .map_err(|e: String| StoreError::Query(e))?;
        let created_at = parse_datetime(&self.created_at)?;
        let content = cipher.decrypt_or_sentinel(&self.user_id, &self.content);

        Ok(ChatMessage {
            id,
            session_id: self.session_id,
            user_id: self.user_id,
            role,
            content,
            created_at,
        })
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn parse_datetime(s: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::Query(format!("invalid datetime: {e}")))
}

fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

// ---------------------------------------------------------------------------
// ChatStore implementation
// ---------------------------------------------------------------------------

impl ChatStore for SqliteChatStore {
    async fn save_session(&self, session: &ChatSession) -> Result<(), StoreError> {
        let title = self.cipher.encrypt(&session.user_id, &session.title)?;

        sqlx::query(
            r#"INSERT INTO chat_sessions (id, user_id, title, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?)
               ON CONFLICT(id) DO UPDATE SET title = excluded.title, updated_at = excluded.updated_at"#,
        )
        .bind(&session.id)
        .bind(&session.user_id)
        .bind(title)
        .bind(format_datetime(&session.created_at))
        .bind(format_datetime(&session.updated_at))
        .execute(&self.pool.writer)
        .await
        .map_err(|e| StoreError::Query(e.to_string()))?;

        Ok(())
    }

    async fn sessions_for_user(&self, user_id: &str) -> Result<Vec<ChatSession>, StoreError> {
        let rows = sqlx::query(
            "SELECT * FROM chat_sessions WHERE user_id = ? ORDER BY updated_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool.reader)
        .await
        .map_err(|e| StoreError::Query(e.to_string()))?;

        let mut sessions = Vec::with_capacity(rows.len());
        for row in &rows {
            let session_row = ChatSessionRow::from_row(row)
                .map_err(|e| StoreError::Query(e.to_string()))?;
            sessions.push(session_row.into_session(&self.cipher)?);
        }

        Ok(sessions)
    }

    async fn delete_session(&self, session_id: &str) -> Result<(), StoreError> {
        // Messages and session go in one transaction, so a reader never sees
        // messages whose session is already gone.
        let mut tx = self
            .pool
            .writer
            .begin()
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;

        sqlx::query("DELETE FROM chat_messages WHERE session_id = ?")
            .bind(session_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;

        sqlx::query("DELETE FROM chat_sessions WHERE id = ?")
            .bind(session_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;

        tx.commit()
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;

        Ok(())
    }

    async fn save_message(&self, message: &ChatMessage) -> Result<(), StoreError> {
        let content = self.cipher.encrypt(&message.user_id, &message.content)?;

        sqlx::query(
            r#"INSERT INTO chat_messages (id, session_id, user_id, role, content, created_at)
               VALUES (?, ?, ?, ?, ?, ?)
               ON CONFLICT(id) DO UPDATE SET content = excluded.content"#,
        )
        .bind(message.id.to_string())
        .bind(&message.session_id)
        .bind(&message.user_id)
        .bind(message.role.to_string())
        .bind(content)
        .bind(format_datetime(&message.created_at))
        .execute(&self.pool.writer)
        .await
        .map_err(|e| StoreError::Query(e.to_string()))?;

        Ok(())
    }

    async fn messages_for_session(
        &self,
        session_id: &str,
    ) -> Result<Vec<ChatMessage>, StoreError> {
        let rows = sqlx::query(
            "SELECT * FROM chat_messages WHERE session_id = ? ORDER BY created_at ASC",
        )
        .bind(session_id)
        .fetch_all(&self.pool.reader)
        .await
        .map_err(|e| StoreError::Query(e.to_string()))?;

        let mut messages = Vec::with_capacity(rows.len());
        for row in &rows {
            let msg_row = ChatMessageRow::from_row(row)
                .map_err(|e| StoreError::Query(e.to_string()))?;
            messages.push(msg_row.into_message(&self.cipher)?);
        }

        Ok(messages)
    }
}

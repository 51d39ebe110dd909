//! Application state wiring all services together.
//!
//! `AppState` pins the generic coordinator to the concrete infra
//! implementations and owns the startup sequence: resolve the data
//! directory, load configuration, open the database, derive nothing --
//! the cipher derives keys lazily -- and hand out shared handles.

use std::path::PathBuf;
use std::sync::Arc;

use secrecy::SecretString;

use carelog_core::coordinator::ChatCoordinator;
use carelog_infra::config::load_app_config;
use carelog_infra::crypto::RecordCipher;
use carelog_infra::sqlite::pool::{DatabasePool, database_url};
use carelog_infra::sqlite::SqliteChatStore;
use carelog_infra::transport::SseChatTransport;
use carelog_types::config::AppConfig;

use crate::context::ChatContext;

/// The coordinator pinned to the concrete store and transport.
pub type Coordinator = ChatCoordinator<SqliteChatStore, SseChatTransport>;

/// The UI-facing chat handle pinned to the concrete stack.
pub type AppChatContext = ChatContext<SqliteChatStore, SseChatTransport>;

/// Shared application state.
///
/// Cloning is cheap; all clones share the coordinator, the store, and the
/// underlying connection pools.
#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<Coordinator>,
    pub store: SqliteChatStore,
    pub data_dir: PathBuf,
}

impl AppState {
    /// Initialize from the default data directory and its `config.toml`.
    pub async fn init() -> anyhow::Result<Self> {
        let data_dir = resolve_data_dir();
        tokio::fs::create_dir_all(&data_dir).await?;
        let config = load_app_config(&data_dir).await;
        Self::init_at(data_dir, config).await
    }

    /// Initialize against an explicit data directory and configuration.
    pub async fn init_at(data_dir: PathBuf, config: AppConfig) -> anyhow::Result<Self> {
        Self::init_with_client(reqwest::Client::new(), data_dir, config).await
    }

    /// Initialize with a pre-configured HTTP client.
    ///
    /// The client carries the authenticated backend session (cookies,
    /// default headers); everything this crate sends rides on it.
    pub async fn init_with_client(
        client: reqwest::Client,
        data_dir: PathBuf,
        config: AppConfig,
    ) -> anyhow::Result<Self> {
        tokio::fs::create_dir_all(&data_dir).await?;

        let pool = DatabasePool::new(&database_url(&data_dir)).await?;
        let cipher = Arc::new(RecordCipher::new(SecretString::from(
            config.encryption_salt.clone(),
        )));
        let store = SqliteChatStore::new(pool, cipher);
        let transport = SseChatTransport::with_client(client, config.api_base_url.clone());
        let coordinator = Arc::new(ChatCoordinator::new(
            store.clone(),
            transport,
            config.coordinator(),
        ));

        tracing::info!(data_dir = %data_dir.display(), api = %config.api_base_url, "Carelog initialized");

        Ok(Self {
            coordinator,
            store,
            data_dir,
        })
    }

    /// A fresh UI-facing handle onto the shared coordinator.
    pub fn chat_context(&self) -> AppChatContext {
        ChatContext::new(self.coordinator.clone())
    }
}

/// Resolve the data directory: `CARELOG_DATA_DIR` env var, then
/// `~/.carelog`, then `./.carelog` as a last resort.
pub fn resolve_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("CARELOG_DATA_DIR") {
        return PathBuf::from(dir);
    }

    if let Some(home) = dirs::home_dir() {
        return home.join(".carelog");
    }

    PathBuf::from(".carelog")
}

#[cfg(test)]
mod tests {
    use super::*;
    use carelog_core::store::ChatStore;
    use carelog_types::chat::ChatSession;
    use chrono::Utc;

    #[tokio::test]
    async fn test_init_at_wires_store_and_cipher() {
        let dir = tempfile::tempdir().unwrap();
        let state = AppState::init_at(dir.path().to_path_buf(), AppConfig::default())
            .await
            .unwrap();

        assert!(dir.path().join("carelog.db").exists());

        // Writing through the store and reading back proves the pool,
        // migrations, and cipher are wired together.
        let now = Utc::now();
        state
            .store
            .save_session(&ChatSession {
                id: "s1".to_string(),
                user_id: "u1".to_string(),
                title: "Wiring check".to_string(),
                created_at: now,
                updated_at: now,
            })
            .await
            .unwrap();

        let sessions = state.store.sessions_for_user("u1").await.unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].title, "Wiring check");
    }

    #[tokio::test]
    async fn test_fresh_state_has_no_streams() {
        let dir = tempfile::tempdir().unwrap();
        let state = AppState::init_at(dir.path().to_path_buf(), AppConfig::default())
            .await
            .unwrap();

        let context = state.chat_context();
        assert!(context.streams().is_empty());
        assert_eq!(context.user_id(), None);
    }

    #[test]
    fn test_resolve_data_dir_from_env() {
        // SAFETY: This test is the only reader of this env var and restores
        // it immediately.
        unsafe {
            std::env::set_var("CARELOG_DATA_DIR", "/tmp/test-carelog");
        }
        let dir = resolve_data_dir();
        unsafe {
            std::env::remove_var("CARELOG_DATA_DIR");
        }
        assert_eq!(dir, PathBuf::from("/tmp/test-carelog"));
    }
}

//! Configuration types for Carelog.
//!
//! `AppConfig` represents the top-level `config.toml` that controls the
//! backend endpoint, the key-derivation salt, and coordinator policy.

use serde::{Deserialize, Serialize};

/// Top-level configuration for the Carelog chat core.
///
/// Loaded from `{data_dir}/config.toml`. All fields have sensible defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Base URL of the AI chat backend.
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// Salt mixed into per-user encryption key derivation. The default is a
    /// development value; deployments override it and must then never change
    /// it, or previously stored records become undecryptable.
    #[serde(default = "default_encryption_salt")]
    pub encryption_salt: String,

    /// Purge all in-memory streams when the active user changes.
    ///
    /// Off by default: prior streams stay visible across a user switch, and
    /// the UI is expected to re-key what it shows by session.
    #[serde(default)]
    pub flush_on_user_change: bool,

    /// Capacity of the snapshot broadcast channel.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

fn default_api_base_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_encryption_salt() -> String {
    "carelog-records-v1".to_string()
}

fn default_channel_capacity() -> usize {
    256
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            encryption_salt: default_encryption_salt(),
            flush_on_user_change: false,
            channel_capacity: default_channel_capacity(),
        }
    }
}

impl AppConfig {
    /// The subset of settings the coordinator itself consumes.
    pub fn coordinator(&self) -> CoordinatorConfig {
        CoordinatorConfig {
            flush_on_user_change: self.flush_on_user_change,
            channel_capacity: self.channel_capacity,
        }
    }
}

/// Policy knobs for the chat coordinator.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Purge all in-memory streams when the active user changes.
    pub flush_on_user_change: bool,
    /// Capacity of the snapshot broadcast channel.
    pub channel_capacity: usize,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        AppConfig::default().coordinator()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_config_default_values() {
        let config = AppConfig::default();
        assert_eq!(config.api_base_url, "http://localhost:8000");
        assert_eq!(config.encryption_salt, "carelog-records-v1");
        assert!(!config.flush_on_user_change);
        assert_eq!(config.channel_capacity, 256);
    }

    #[test]
    fn test_app_config_deserialize_with_defaults() {
        let config: AppConfig = toml::from_str("").unwrap();
        assert_eq!(config.api_base_url, "http://localhost:8000");
        assert!(!config.flush_on_user_change);
    }

    #[test]
    fn test_app_config_deserialize_with_values() {
        let config: AppConfig = toml::from_str(
            r#"
api_base_url = "https://records.example.net"
encryption_salt = "prod-salt-2024"
flush_on_user_change = true
"#,
        )
        .unwrap();
        assert_eq!(config.api_base_url, "https://records.example.net");
        assert_eq!(config.encryption_salt, "prod-salt-2024");
        assert!(config.flush_on_user_change);
        assert_eq!(config.channel_capacity, 256);
    }

    #[test]
    fn test_coordinator_config_mirrors_app_config() {
        let mut app = AppConfig::default();
        app.flush_on_user_change = true;
        app.channel_capacity = 8;
        let coord = app.coordinator();
        assert!(coord.flush_on_user_change);
        assert_eq!(coord.channel_capacity, 8);
    }
}

//! SQLite pool with split reader/writer connections.
//!
//! SQLite permits one writer at a time, so `DatabasePool` keeps a
//! single-connection writer pool for serialized mutations alongside a
//! multi-connection reader pool for concurrent queries. WAL journal mode
//! lets readers proceed while a write is in flight.

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;

/// Paired read/write pools over one SQLite database file.
///
/// `reader` holds up to 8 read-only connections; `writer` holds exactly one.
#[derive(Clone)]
pub struct DatabasePool {
    pub reader: SqlitePool,
    pub writer: SqlitePool,
}

impl DatabasePool {
    /// Open (creating if missing) the database at `database_url` and run
    /// embedded migrations.
    ///
    /// The writer pool opens first so migrations have completed before any
    /// read-only connection exists. Both pools use WAL mode and a 5 second
    /// busy timeout.
    pub async fn new(database_url: &str) -> Result<Self, sqlx::Error> {
        let opts = SqliteConnectOptions::from_str(database_url)?
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true)
            .busy_timeout(std::time::Duration::from_secs(5))
            .create_if_missing(true);

        let writer = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(opts.clone())
            .await?;

        sqlx::migrate!("../../migrations").run(&writer).await?;

        let reader = SqlitePoolOptions::new()
            .max_connections(8)
            .connect_with(opts.read_only(true))
            .await?;

        Ok(Self { reader, writer })
    }
}

/// Returns the database URL for the given data directory.
///
/// `CARELOG_DB_PATH` overrides the file location outright (useful for tests
/// and portable installs); otherwise the database lives at
/// `{data_dir}/carelog.db`.
pub fn database_url(data_dir: &Path) -> String {
    match std::env::var("CARELOG_DB_PATH") {
        Ok(path) => format!("sqlite://{path}"),
        Err(_) => format!("sqlite://{}/carelog.db", data_dir.display()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_pool_creates_tables() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let url = format!("sqlite://{}?mode=rwc", db_path.display());

        let pool = DatabasePool::new(&url).await.unwrap();

        // Verify tables exist by querying sqlite_master
        let tables: Vec<(String,)> = sqlx::query_as(
            "SELECT name FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%' AND name != '_sqlx_migrations' ORDER BY name",
        )
        .fetch_all(&pool.reader)
        .await
        .unwrap();

        let table_names: Vec<&str> = tables.iter().map(|t| t.0.as_str()).collect();
        assert!(table_names.contains(&"chat_sessions"), "chat_sessions table missing");
        assert!(table_names.contains(&"chat_messages"), "chat_messages table missing");
    }

    #[tokio::test]
    async fn test_pool_wal_mode() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("test_wal.db");
        let url = format!("sqlite://{}?mode=rwc", db_path.display());

        let pool = DatabasePool::new(&url).await.unwrap();

        let result: (String,) =
            sqlx::query_as("PRAGMA journal_mode")
                .fetch_one(&pool.writer)
                .await
                .unwrap();

        assert_eq!(result.0.to_lowercase(), "wal");
    }

    #[tokio::test]
    async fn test_database_url_falls_back_to_data_dir() {
        let url = database_url(Path::new("/tmp/carelog-test"));
        assert!(url.starts_with("sqlite://"));
    }
}

//! SQLite storage layer.
//!
//! Chat store implementation backed by SQLite with WAL mode, split
//! read/write connection pools, and per-user record encryption.

pub mod chat;
pub mod pool;

pub use chat::SqliteChatStore;
pub use pool::DatabasePool;

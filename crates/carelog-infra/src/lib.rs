//! Infrastructure layer for Carelog.
//!
//! Contains implementations of the ports defined in `carelog-core`:
//! SQLite storage with per-user record encryption, the SSE chat transport,
//! and configuration loading.

pub mod config;
pub mod crypto;
pub mod sqlite;
pub mod transport;

//! Cryptographic operations for Carelog.
//!
//! - `cipher`: per-user AES-256-GCM encryption for chat records at rest

pub mod cipher;

pub use cipher::{DECRYPTION_SENTINEL, RecordCipher};

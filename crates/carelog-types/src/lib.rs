//! Shared domain types for Carelog.
//!
//! This crate contains the core domain types used across the Carelog chat
//! subsystem: sessions, messages, stream state, server events, and their
//! associated error types.
//!
//! Zero infrastructure dependencies -- only serde, uuid, chrono, thiserror.

pub mod chat;
pub mod config;
pub mod error;
pub mod event;

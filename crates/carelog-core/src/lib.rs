//! Chat coordination logic and port definitions for Carelog.
//!
//! This crate defines the "ports" (store and transport traits) that the
//! infrastructure layer implements, the `ChatCoordinator` state machine
//! that drives them, and the snapshot broadcaster UI surfaces subscribe to.
//! It depends only on `carelog-types` -- never on `carelog-infra` or any
//! database/HTTP crate.

pub mod broadcast;
pub mod coordinator;
pub mod store;
pub mod transport;

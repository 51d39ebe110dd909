//! Application wiring and UI-facing adapters for Carelog.
//!
//! `AppState` assembles the concrete stack (SQLite store, record cipher,
//! SSE transport, coordinator); `ChatContext` is the handle UI components
//! hold; `indicator` provides the multi-session activity view-model.

pub mod context;
pub mod indicator;
pub mod state;
pub mod telemetry;

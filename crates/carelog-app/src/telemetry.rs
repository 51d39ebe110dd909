//! Tracing subscriber bootstrap.
//!
//! For hosts that don't install their own subscriber. Call once at startup;
//! embedding applications with an existing tracing setup should skip this.

use tracing_subscriber::EnvFilter;

/// Initialize the global tracing subscriber.
///
/// `RUST_LOG` takes precedence; otherwise `default_filter` applies
/// (e.g. `"warn,carelog=info"`).
///
/// # Panics
///
/// Panics if a global subscriber is already installed.
pub fn init_tracing(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

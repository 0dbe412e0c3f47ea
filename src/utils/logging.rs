//! Structured logging configuration.
//!
//! The core emits `tracing` events everywhere; this helper wires up a
//! `tracing-subscriber` fmt layer for binaries and simulation harnesses.
//! Library users who install their own subscriber can ignore this module.
//!
//! Enabled with the `logging` cargo feature.

use tracing_subscriber::{fmt, EnvFilter};

/// Install a global fmt subscriber.
///
/// The filter honours `RUST_LOG`, falling back to `default_directive`
/// (e.g. `"cluster_protocol=debug"`). Returns quietly if a subscriber is
/// already installed so tests can call it repeatedly.
pub fn init(default_directive: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));

    let _ = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}

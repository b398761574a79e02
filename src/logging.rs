//! Structured logging setup.
//!
//! The teacher crate has no logging story of its own; this follows the
//! pattern common across the retrieval pack's service-shaped crates
//! (`tracing` + `tracing_subscriber::EnvFilter`) rather than `log` or
//! hand-rolled `eprintln!`.

use tracing_subscriber::EnvFilter;

/// Installs a global `tracing` subscriber reading its filter from
/// `RUST_LOG`, defaulting to `info` when unset. Intended to be called
/// once by the binary embedding this crate; safe to call more than
/// once (later calls are ignored).
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}

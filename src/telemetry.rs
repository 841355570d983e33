//! Tracing/logging initialization, matching the teacher's universal
//! `tracing` + `tracing-subscriber` ambient stack.

use tracing_subscriber::{fmt, EnvFilter};

/// Initializes a global `tracing` subscriber reading its filter from
/// `RUST_LOG`, defaulting to `info` when unset.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    fmt().with_env_filter(filter).with_target(true).init();
}

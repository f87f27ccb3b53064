//! Tracing subscriber initialization.
//!
//! Filter resolution order: explicit argument, then `RUST_LOG`, then the
//! compiled default. Safe to call once per process; subsequent calls are
//! no-ops.

use tracing_subscriber::EnvFilter;

/// Default filter when neither an argument nor `RUST_LOG` is provided.
pub const DEFAULT_FILTER: &str = "info,hazsync_store=info,hazsync_engine=info";

/// Initialize the global tracing subscriber.
///
/// Returns `false` if a subscriber was already installed (the call is
/// then a no-op, which keeps test binaries that race on init harmless).
pub fn init_logging(filter: Option<&str>) -> bool {
    let env_filter = match filter {
        Some(f) => EnvFilter::new(f),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER)),
    };

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .try_init()
        .is_ok()
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

//! # Logging Setup
//!
//! The crate logs through the `tracing` facade; this module provides an
//! opt-in subscriber installation for binaries and tests that do not bring
//! their own. Filtering follows `RUST_LOG` with an `info` default.

use std::sync::Once;

use tracing_subscriber::EnvFilter;

static INIT: Once = Once::new();

/// Installs a formatting `tracing` subscriber once per process.
///
/// Safe to call repeatedly; later calls are no-ops, and an already
/// installed global subscriber is left in place.
pub fn init() {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .try_init();
    });
}

//! Subscriber setup for binaries and tests

use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "drivelog=info";

/// Install a formatting subscriber honoring `RUST_LOG`.
///
/// Safe to call repeatedly; returns `false` when a global subscriber was
/// already installed.
pub fn init() -> bool {
    init_with_default(DEFAULT_FILTER)
}

/// Like [`init`], with a custom fallback filter.
pub fn init_with_default(default_filter: &str) -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt().with_env_filter(filter).try_init().is_ok()
}

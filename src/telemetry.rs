//! Structured logging setup.

use tracing_subscriber::EnvFilter;

/// Initialize tracing. `RUST_LOG` controls the filter, defaulting to `info`.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

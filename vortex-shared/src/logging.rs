//! Tracing initialization: env-filter driven, with an optional JSON
//! formatter for production deployments.

use tracing_subscriber::{fmt, EnvFilter};

/// Initialize the global tracing subscriber from `RUST_LOG` (defaulting to
/// `info`). Safe to call more than once; subsequent calls are no-ops.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).try_init();
}

/// Initialize tracing with JSON-formatted output, for production deployments
/// that ship logs to a collector.
pub fn init_tracing_json() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).json().try_init();
}

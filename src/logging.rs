//! Structured logging initialization.
//!
//! The `RUST_LOG` environment variable takes precedence over the level passed in by the caller.

use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

/// Install a global `tracing` subscriber writing to stderr.
///
/// Calling this more than once is harmless: later calls leave the first subscriber in place.
///
/// # Arguments
/// * `default_level` - Filter directive used when `RUST_LOG` is unset (e.g. `"info"`)
pub fn init(default_level: &str) {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        EnvFilter::new(default_level)
    };

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(true))
        .try_init();
}

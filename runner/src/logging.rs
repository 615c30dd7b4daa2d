//! Tracing setup for the `measure-runner` binary.
//!
//! Everything the runner reports (bundler checks, fix-up outcomes, failed
//! commands with their captured streams) goes through `tracing`, so
//! `RUST_LOG` controls how much of it reaches stderr.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the tracing subscriber.
///
/// Reads `RUST_LOG` env var. Defaults to `warn` if unset, which still shows
/// failed commands together with their stdout/stderr.
/// Output: stderr, compact format.
///
/// # Example
/// ```bash
/// RUST_LOG=measure_runner=debug measure-runner test-measures .
/// ```
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}

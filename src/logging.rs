//! Diagnostic tracing for the pipeline.
//!
//! Human-facing progress (file counts, per-file status) is printed by the CLI
//! from pipeline events and does not go through here.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the tracing subscriber.
///
/// `RUST_LOG` wins when set. Otherwise the level is `warn`, or `ava=debug`
/// with `verbose`. Output: stderr, compact format.
pub fn init(verbose: bool) {
    let default_directive = if verbose { "warn,ava=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}

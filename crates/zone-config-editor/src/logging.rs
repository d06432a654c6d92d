//! Logging initialization for the editor binary.
//!
//! `RUST_LOG` wins when it is set. Otherwise a default filter is installed:
//! `debug` for debug builds or `--verbose`, `info` for release builds.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;

/// Default filter directive when `RUST_LOG` is unset
pub fn default_directive(verbose: bool) -> &'static str {
    if verbose || cfg!(debug_assertions) {
        "debug"
    } else {
        "info"
    }
}

/// Install the global subscriber. Later calls are ignored.
pub fn setup_logging(verbose: bool) {
    let directives = match std::env::var("RUST_LOG") {
        Ok(directives) if !verbose => directives,
        _ => default_directive(verbose).to_string(),
    };
    let filter = EnvFilter::new(&directives);

    let fmt_layer = fmt::layer().with_target(false).with_filter(filter);
    if tracing_subscriber::registry().with(fmt_layer).try_init().is_err() {
        return;
    }
    tracing::debug!("Tracing initialized with filter {directives}");
}

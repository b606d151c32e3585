//! Command-line entry points
//!
//! `server` runs the HTTP service; `resolve` answers a single video and exits.

pub mod resolve;
pub mod server;

use crate::config::LoggingSettings;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Build the log filter
///
/// Precedence: `--verbose` (debug) > `RUST_LOG` > `fallback`.
pub fn env_filter(verbose: bool, fallback: &str) -> EnvFilter {
    if verbose {
        EnvFilter::new("debug")
    } else if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        EnvFilter::new(fallback)
    }
}

/// Install the global subscriber
///
/// A second installation in the same process is ignored.
pub(crate) fn init_logging(filter: EnvFilter, logging: &LoggingSettings, to_stderr: bool) {
    let compact = logging.format.eq_ignore_ascii_case("compact");
    let registry = tracing_subscriber::registry().with(filter);

    let installed = match (compact, to_stderr) {
        (true, true) => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .compact()
                    .with_writer(std::io::stderr),
            )
            .try_init(),
        (true, false) => registry
            .with(tracing_subscriber::fmt::layer().compact())
            .try_init(),
        (false, true) => registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .try_init(),
        (false, false) => registry.with(tracing_subscriber::fmt::layer()).try_init(),
    };

    if installed.is_err() {
        tracing::debug!("Logging already initialized");
    }
}

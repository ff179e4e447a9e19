//! Subscriber setup for the binary.
//!
//! Library code logs through `log` and `tracing`; `LogTracer` forwards the
//! `log` records so both end up in the same `fmt` layer.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::LogFormat;

/// Filter directive for `level`, raised to debug for this crate when
/// `verbose` is set. `RUST_LOG` wins over both.
pub fn filter_directive(level: &str, verbose: bool) -> String {
    if verbose {
        format!("{},pdfrag=debug", level)
    } else {
        level.to_string()
    }
}

/// Installs the global subscriber. Calling it twice is harmless: the second
/// call leaves the first subscriber in place and returns false.
pub fn init_logging(level: &str, format: LogFormat, verbose: bool) -> bool {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directive(level, verbose)));

    if tracing_log::LogTracer::init().is_err() {
        return false;
    }

    let result = match format {
        LogFormat::Json => tracing::subscriber::set_global_default(
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json().with_target(true)),
        ),
        LogFormat::Pretty => tracing::subscriber::set_global_default(
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().with_target(false)),
        ),
    };
    result.is_ok()
}

//! Tracing setup for the CLI.
//!
//! Console output goes to stderr, filtered by `RUST_LOG` (default
//! `waypoint=info`, or `waypoint=debug` with `--verbose`). Set
//! `LOG_FORMAT=json` for structured output. When the project is initialized,
//! a plain-text copy at info level is appended to `.waypoint/logs/waypoint.log`.

use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt};

pub const LOG_FILE: &str = "waypoint.log";

fn console_filter(verbose: bool) -> EnvFilter {
    let default = if verbose { "waypoint=debug" } else { "waypoint=info" };
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default))
}

/// Install the global subscriber. Keep the returned guard alive until exit so
/// buffered file output is flushed. Calling this twice is a no-op.
pub fn init_tracing(log_dir: &Path, verbose: bool) -> Option<WorkerGuard> {
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let (file_layer, guard) = if log_dir.is_dir() {
        let appender = tracing_appender::rolling::never(log_dir, LOG_FILE);
        let (writer, guard) = tracing_appender::non_blocking(appender);
        let level = if verbose { "waypoint=debug" } else { "waypoint=info" };
        let layer = tracing_subscriber::fmt::layer()
            .with_writer(writer)
            .with_ansi(false)
            .with_filter(EnvFilter::new(level));
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    let registry = tracing_subscriber::registry().with(file_layer);

    let result = if use_json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_filter(console_filter(verbose)),
            )
            .try_init()
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(false)
                    .with_filter(console_filter(verbose)),
            )
            .try_init()
    };
    if result.is_err() {
        return None;
    }
    guard
}

//! Tracing subscriber setup.

use std::io;

use ptd_core::defaults::DEFAULT_LOG_LEVEL;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::LoggingConfig;

/// Build the `EnvFilter` directive string from the base level and
/// per-module filters.
pub fn filter_directives(config: &LoggingConfig) -> String {
    let base_level = config.level.as_deref().unwrap_or(DEFAULT_LOG_LEVEL);
    let mut filter_str = base_level.to_string();

    let mut modules: Vec<_> = config.filters.iter().collect();
    modules.sort();
    for (module, level) in modules {
        filter_str.push(',');
        filter_str.push_str(module);
        filter_str.push('=');
        filter_str.push_str(level);
    }
    filter_str
}

/// Initialize tracing subscriber with the given logging configuration.
///
/// Supports:
/// - `level`: Base log level (trace, debug, info, warn, error)
/// - `format`: Output format (json, pretty, compact). Default: pretty
/// - `output`: Output target (stdout, stderr). Default: stderr
/// - `filters`: Per-module log level overrides
///
/// A second call is a no-op.
pub fn init_tracing(config: &LoggingConfig) {
    let filter = EnvFilter::try_new(filter_directives(config))
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_LEVEL));

    let format = config.format.as_deref().unwrap_or("pretty");
    let output = config.output.as_deref().unwrap_or("stderr");

    let registry = tracing_subscriber::registry().with(filter);
    let _ = match (format, output) {
        ("json", "stdout") => registry
            .with(fmt::layer().json().with_writer(io::stdout))
            .try_init(),
        ("json", _) => registry
            .with(fmt::layer().json().with_writer(io::stderr))
            .try_init(),
        ("compact", "stdout") => registry
            .with(fmt::layer().compact().with_writer(io::stdout))
            .try_init(),
        ("compact", _) => registry
            .with(fmt::layer().compact().with_writer(io::stderr))
            .try_init(),
        (_, "stdout") => registry
            .with(fmt::layer().with_writer(io::stdout))
            .try_init(),
        _ => registry
            .with(fmt::layer().with_writer(io::stderr))
            .try_init(),
    };
}

use std::path::Path;
use tracing::level_filters::LevelFilter;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::LoggingConfig;

/// Sends all tracing output to a daily rolling file as set up in `config`.
///
/// `RUST_LOG` directives still apply on top of the configured level.
/// Keep the returned guard alive for as long as logs should be flushed.
pub fn initialize_logging(config: &LoggingConfig) -> WorkerGuard {
    let directory = Path::new(&config.directory);
    // Create the log directory if it doesn't exist
    let _ = std::fs::create_dir_all(directory);

    let file_appender = tracing_appender::rolling::daily(directory, &config.file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let level = level_filter(&config.level);
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive(level.into()))
        .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
        .init();

    tracing::info!("Logging initialized at {} in {}.", level, directory.display());
    guard
}

/// The configured level, INFO when it is not one `tracing` knows.
fn level_filter(level: &str) -> LevelFilter {
    level.trim().parse().unwrap_or(LevelFilter::INFO)
}

use std::path::Path;
use tracing::debug;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

pub const DEFAULT_FILTER: &str = "info,quotes_storage=debug";

/// Install the global subscriber: human-readable console output plus a
/// daily-rotated JSON file under `log_dir` named `<service>.log`.
///
/// The returned guard flushes the file writer on drop, so hold it for the
/// lifetime of the process.
pub fn init(service: &str, log_dir: &Path) -> WorkerGuard {
    // Console logging still works if the directory can't be created
    std::fs::create_dir_all(log_dir).unwrap_or_else(|e| {
        eprintln!(
            "Warning: Could not create log directory {}: {}",
            log_dir.display(),
            e
        );
    });

    let file_appender =
        RollingFileAppender::new(Rotation::DAILY, log_dir, format!("{}.log", service));
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let installed = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER)))
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .with(
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_ansi(false)
                .json()
                .with_writer(non_blocking),
        )
        .try_init();

    if installed.is_ok() {
        debug!("Logging initialized - log directory: {}", log_dir.display());
    }

    guard
}

/// Console-only logging on stderr for short-lived CLI tools whose stdout
/// carries machine-readable output
pub fn init_stderr() {
    let _ = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .try_init();
}

//! Logging infrastructure for sitepulse
//!
//! Logs are written to `~/.local/state/sitepulse/sitepulse.log` following XDG
//! standards, rotated daily, pruned to `logging.max_files`. Telemetry failure
//! modes terminate in log lines here, never in errors surfaced to the host
//! application.

use crate::config::{Config, LoggingConfig};
use crate::error::Error;
use std::path::{Path, PathBuf};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

/// Initialize the logging system.
///
/// File output goes to the XDG state directory with daily rotation and a
/// bounded retention window. `RUST_LOG` overrides the configured level.
/// The returned guard flushes pending writes on drop; hold it for the
/// pipeline's lifetime.
pub fn init(config: &LoggingConfig) -> crate::error::Result<LoggingGuard> {
    let log_dir = Config::state_dir();
    std::fs::create_dir_all(&log_dir)?;

    let (non_blocking, guard) =
        tracing_appender::non_blocking(file_appender(&log_dir, config.max_files)?);

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let file_layer = fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true);

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .init();

    tracing::info!(
        log_dir = %log_dir.display(),
        level = %config.level,
        max_files = config.max_files,
        "logging initialized"
    );

    Ok(LoggingGuard { _guard: guard })
}

/// Daily-rotated appender that prunes itself down to `max_files` old logs.
fn file_appender(log_dir: &Path, max_files: usize) -> crate::error::Result<RollingFileAppender> {
    RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix("sitepulse.log")
        .max_log_files(max_files.max(1))
        .build(log_dir)
        .map_err(|e| Error::Config(format!("failed to create log appender: {}", e)))
}

/// Initialize logging for tests (logs to stdout)
pub fn init_test() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .with_span_events(FmtSpan::CLOSE)
        .try_init();
}

/// Guard that keeps the logging system alive
///
/// When dropped, flushes any pending log writes.
pub struct LoggingGuard {
    _guard: tracing_appender::non_blocking::WorkerGuard,
}

/// Returns the log file path
pub fn log_file_path() -> PathBuf {
    Config::log_path()
}

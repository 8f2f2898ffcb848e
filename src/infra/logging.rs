//! Usage: Tracing subscriber setup (stderr + optional daily-rolling file).

use crate::infra::settings::LogSettings;
use crate::shared::error::AppResult;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

pub const LOG_FILTER_ENV: &str = "FORUM_CLIENT_LOG";

/// Keeps the file writer flushing; drop it only on shutdown.
#[must_use = "dropping the guard stops the background log writer"]
pub struct LoggingGuard {
    _file_guard: Option<WorkerGuard>,
}

fn build_filter(settings: &LogSettings) -> EnvFilter {
    EnvFilter::try_from_env(LOG_FILTER_ENV)
        .or_else(|_| EnvFilter::try_new(settings.filter.trim()))
        .unwrap_or_else(|err| {
            eprintln!("invalid log filter {:?}: {err}; falling back to info", settings.filter);
            EnvFilter::new("info")
        })
}

pub fn init(settings: &LogSettings) -> AppResult<LoggingGuard> {
    // `log` records from dependencies are forwarded into tracing. A second init
    // (e.g. from tests) only means the bridge is already installed.
    let _ = tracing_log::LogTracer::init();

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(settings.ansi)
        .with_target(true);

    let (file_layer, file_guard) = match settings.directory.as_ref() {
        Some(dir) => {
            std::fs::create_dir_all(dir).map_err(|e| {
                format!("SYSTEM_ERROR: failed to create log dir {}: {e}", dir.display())
            })?;
            let appender = tracing_appender::rolling::daily(dir, &settings.file_prefix);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(true)
                .boxed();
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(build_filter(settings))
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| format!("SYSTEM_ERROR: tracing subscriber already installed: {e}"))?;

    Ok(LoggingGuard {
        _file_guard: file_guard,
    })
}

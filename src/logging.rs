use crate::config::{Config, LOG_FILE_NAME};
use crate::error::{Result, WingetauError};
use std::fs;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

/// Console output plus an append-only, timestamped log file in `config.log_dir`.
///
/// The returned guard must stay alive until exit so buffered lines reach the file.
/// When the file cannot be opened, logging continues on the console only.
pub fn init(config: &Config) -> Option<WorkerGuard> {
    match file_writer(config) {
        Ok((writer, guard)) => {
            tracing_subscriber::registry()
                .with(env_filter())
                .with(fmt::layer().with_target(false))
                .with(
                    fmt::layer()
                        .with_writer(writer)
                        .with_ansi(false)
                        .with_target(false),
                )
                .init();
            Some(guard)
        }
        Err(err) => {
            tracing_subscriber::registry()
                .with(env_filter())
                .with(fmt::layer().with_target(false))
                .init();
            tracing::warn!("File logging disabled: {err}");
            None
        }
    }
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

fn file_writer(
    config: &Config,
) -> Result<(tracing_appender::non_blocking::NonBlocking, WorkerGuard)> {
    fs::create_dir_all(&config.log_dir).map_err(|e| {
        WingetauError::Logging(format!(
            "cannot create log directory {}: {e}",
            config.log_dir.display()
        ))
    })?;

    let appender = tracing_appender::rolling::RollingFileAppender::builder()
        .rotation(tracing_appender::rolling::Rotation::NEVER)
        .filename_prefix(LOG_FILE_NAME)
        .build(&config.log_dir)
        .map_err(|e| {
            WingetauError::Logging(format!(
                "cannot open {}: {e}",
                config.log_file().display()
            ))
        })?;

    Ok(tracing_appender::non_blocking(appender))
}

//! Tracing setup: human-readable stderr plus optional JSON file logging.

use crate::config::{LoggingConfig, project_dirs};
use crate::error::{ConfigError, Result};
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Base name of the rolling JSON log file.
pub const LOG_FILE_NAME: &str = "scrivener.log";

/// Install the global subscriber.
///
/// `RUST_LOG` wins over `config.filter`. When `json_file` is set, the returned
/// guard must be held for the life of the process or buffered lines are lost.
pub fn init_tracing(config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.filter));
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(filter);

    let (json_layer, guard) = if config.json_file {
        let dir = resolve_log_dir(config);
        std::fs::create_dir_all(&dir)?;
        let appender = tracing_appender::rolling::daily(&dir, LOG_FILE_NAME);
        let (writer, guard) = tracing_appender::non_blocking(appender);
        let layer = tracing_subscriber::fmt::layer()
            .json()
            .with_writer(writer)
            .with_filter(EnvFilter::new("debug"));
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .try_init()
        .map_err(|e| ConfigError::Invalid {
            message: format!("tracing subscriber already installed: {e}"),
        })?;
    Ok(guard)
}

/// Where JSON logs go: the configured directory, else `<data dir>/logs`, else `./logs`.
pub fn resolve_log_dir(config: &LoggingConfig) -> PathBuf {
    if let Some(dir) = &config.log_dir {
        return dir.clone();
    }
    project_dirs()
        .map(|d| d.data_dir().join("logs"))
        .unwrap_or_else(|| PathBuf::from("logs"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configured_log_dir_wins() {
        let config = LoggingConfig {
            log_dir: Some(PathBuf::from("/tmp/scrivener-logs")),
            ..Default::default()
        };
        assert_eq!(resolve_log_dir(&config), PathBuf::from("/tmp/scrivener-logs"));
    }

    #[test]
    fn test_default_log_dir_ends_in_logs() {
        let dir = resolve_log_dir(&LoggingConfig::default());
        assert!(dir.ends_with("logs"));
    }
}

//! Tracing subscriber setup.
//!
//! Installs one process-wide subscriber composed of an [`EnvFilter`], a
//! console `fmt` layer, and an optional daily-rolling file layer:
//!
//! ```text
//! registry
//!   ├─ EnvFilter ("info,cosign=debug", or RUST_LOG)
//!   ├─ fmt layer → stdout (pretty | compact)
//!   └─ fmt layer → tracing-appender (non-blocking, daily files)
//! ```

use serde::Deserialize;
use std::path::PathBuf;
use thiserror::Error;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Errors installing the subscriber.
#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("Invalid log filter {filter:?}: {message}")]
    InvalidFilter { filter: String, message: String },

    #[error("A global tracing subscriber is already installed")]
    AlreadyInitialized,
}

/// Console output style.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    #[default]
    Compact,
}

/// Daily-rolling log files.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileLogConfig {
    pub directory: PathBuf,
    pub prefix: String,
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TelemetryConfig {
    /// Filter directives, used when `RUST_LOG` is unset.
    pub filter: String,
    pub format: LogFormat,
    pub file: Option<FileLogConfig>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            filter: "info,cosign=debug".to_string(),
            format: LogFormat::default(),
            file: None,
        }
    }
}

impl TelemetryConfig {
    /// Also write logs to daily files under `directory`.
    pub fn with_file(mut self, directory: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        self.file = Some(FileLogConfig {
            directory: directory.into(),
            prefix: prefix.into(),
        });
        self
    }
}

/// Keeps the non-blocking file writer alive. Dropping it flushes the file.
#[must_use = "dropping the guard stops file logging"]
pub struct TelemetryGuard {
    _file_guard: Option<WorkerGuard>,
}

/// Install the global subscriber.
///
/// `RUST_LOG` takes precedence over the configured filter.
pub fn init_tracing(config: &TelemetryConfig) -> Result<TelemetryGuard, TelemetryError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.filter).map_err(|err| TelemetryError::InvalidFilter {
            filter: config.filter.clone(),
            message: err.to_string(),
        })?,
    };

    let (file_layer, file_guard) = match &config.file {
        Some(file) => {
            let appender = tracing_appender::rolling::daily(&file.directory, &file.prefix);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_ansi(false).with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let registry = tracing_subscriber::registry().with(filter).with(file_layer);
    let installed = match config.format {
        LogFormat::Pretty => registry.with(fmt::layer().pretty()).try_init(),
        LogFormat::Compact => registry.with(fmt::layer().compact()).try_init(),
    };
    installed.map_err(|_| TelemetryError::AlreadyInitialized)?;

    Ok(TelemetryGuard {
        _file_guard: file_guard,
    })
}

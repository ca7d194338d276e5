//! Runner configuration.
//!
//! Every section of the TOML file is optional and every key falls back to
//! its default. Durations are integer milliseconds (`*_ms` keys).
//!
//! ```toml
//! [broadcast]
//! grace_ms = 3000
//!
//! [sync]
//! page_size = 20
//! max_pages = 500
//! fetch_timeout_ms = 30000
//!
//! [coordinator]
//! remote_timeout_ms = 30000
//! backend_timeout_ms = 30000
//! server_event_refresh_delay_ms = 2000
//!
//! [dedup]
//! retention_ms = 604800000
//! gc_interval_ms = 3600000
//!
//! [telemetry]
//! filter = "info,cosign=debug"
//! format = "compact"
//! file = { directory = "logs", prefix = "cosign.log" }
//! ```

use crate::dedup::DedupConfig;
use crate::telemetry::TelemetryConfig;
use cosign_broadcast::BroadcastConfig;
use cosign_sync::SyncConfig;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Errors loading a configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Configuration of a session.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    pub broadcast: BroadcastConfig,
    pub sync: SyncConfig,

    /// Timeout for each remote wallet service call.
    pub remote_timeout: Duration,

    /// Timeout for each signing backend call.
    pub backend_timeout: Duration,

    /// Wait before refreshing after a server transaction push.
    pub server_event_refresh_delay: Duration,

    pub dedup: DedupConfig,
    pub telemetry: TelemetryConfig,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            broadcast: BroadcastConfig::default(),
            sync: SyncConfig::default(),
            remote_timeout: Duration::from_secs(30),
            backend_timeout: Duration::from_secs(30),
            server_event_refresh_delay: Duration::from_secs(2),
            dedup: DedupConfig::default(),
            telemetry: TelemetryConfig::default(),
        }
    }
}

impl CoordinatorConfig {
    /// Set both collaborator timeouts.
    pub fn with_timeouts(mut self, remote: Duration, backend: Duration) -> Self {
        self.remote_timeout = remote;
        self.backend_timeout = backend;
        self
    }

    /// Set the broadcast grace period.
    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.broadcast = BroadcastConfig::with_grace(grace);
        self
    }

    /// Set the sync configuration.
    pub fn with_sync(mut self, sync: SyncConfig) -> Self {
        self.sync = sync;
        self
    }

    /// Set the dedup configuration.
    pub fn with_dedup(mut self, dedup: DedupConfig) -> Self {
        self.dedup = dedup;
        self
    }

    /// Set the server event refresh delay.
    pub fn with_server_event_refresh_delay(mut self, delay: Duration) -> Self {
        self.server_event_refresh_delay = delay;
        self
    }

    /// Parse a TOML document.
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let file: ConfigFile = toml::from_str(source)?;
        let config = file.into_config();
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&source)
    }

    /// Reject values the runner cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sync.page_size == 0 {
            return Err(ConfigError::Invalid("sync.page_size must be positive".into()));
        }
        if self.sync.max_pages == 0 {
            return Err(ConfigError::Invalid("sync.max_pages must be positive".into()));
        }
        let timeouts = [
            ("sync.fetch_timeout_ms", self.sync.fetch_timeout),
            ("coordinator.remote_timeout_ms", self.remote_timeout),
            ("coordinator.backend_timeout_ms", self.backend_timeout),
            ("dedup.gc_interval_ms", self.dedup.gc_interval),
        ];
        for (key, value) in timeouts {
            if value.is_zero() {
                return Err(ConfigError::Invalid(format!("{key} must be positive")));
            }
        }
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// File format
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ConfigFile {
    broadcast: BroadcastSection,
    sync: SyncSection,
    coordinator: CoordinatorSection,
    dedup: DedupSection,
    telemetry: TelemetryConfig,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct BroadcastSection {
    grace_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct SyncSection {
    page_size: Option<usize>,
    max_pages: Option<usize>,
    fetch_timeout_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct CoordinatorSection {
    remote_timeout_ms: Option<u64>,
    backend_timeout_ms: Option<u64>,
    server_event_refresh_delay_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct DedupSection {
    retention_ms: Option<u64>,
    gc_interval_ms: Option<u64>,
}

impl ConfigFile {
    fn into_config(self) -> CoordinatorConfig {
        let defaults = CoordinatorConfig::default();
        let millis = |value: Option<u64>, default: Duration| {
            value.map(Duration::from_millis).unwrap_or(default)
        };

        CoordinatorConfig {
            broadcast: BroadcastConfig {
                grace: millis(self.broadcast.grace_ms, defaults.broadcast.grace),
            },
            sync: SyncConfig {
                page_size: self.sync.page_size.unwrap_or(defaults.sync.page_size),
                max_pages: self.sync.max_pages.unwrap_or(defaults.sync.max_pages),
                fetch_timeout: millis(self.sync.fetch_timeout_ms, defaults.sync.fetch_timeout),
            },
            remote_timeout: millis(self.coordinator.remote_timeout_ms, defaults.remote_timeout),
            backend_timeout: millis(self.coordinator.backend_timeout_ms, defaults.backend_timeout),
            server_event_refresh_delay: millis(
                self.coordinator.server_event_refresh_delay_ms,
                defaults.server_event_refresh_delay,
            ),
            dedup: DedupConfig {
                retention: millis(self.dedup.retention_ms, defaults.dedup.retention),
                gc_interval: millis(self.dedup.gc_interval_ms, defaults.dedup.gc_interval),
            },
            telemetry: self.telemetry,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::LogFormat;

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = CoordinatorConfig::from_toml_str("").unwrap();
        assert_eq!(config.broadcast.grace, Duration::from_secs(3));
        assert_eq!(config.sync.page_size, 20);
        assert_eq!(config.server_event_refresh_delay, Duration::from_secs(2));
        assert_eq!(config.dedup.retention, Duration::from_secs(7 * 24 * 60 * 60));
    }

    #[test]
    fn test_partial_sections_override_only_given_keys() {
        let config = CoordinatorConfig::from_toml_str(
            r#"
            [broadcast]
            grace_ms = 500

            [sync]
            page_size = 100

            [telemetry]
            format = "pretty"
            "#,
        )
        .unwrap();

        assert_eq!(config.broadcast.grace, Duration::from_millis(500));
        assert_eq!(config.sync.page_size, 100);
        assert_eq!(config.sync.max_pages, 500);
        assert_eq!(config.remote_timeout, Duration::from_secs(30));
        assert_eq!(config.telemetry.format, LogFormat::Pretty);
    }

    #[test]
    fn test_zero_page_size_is_invalid() {
        let err = CoordinatorConfig::from_toml_str("[sync]\npage_size = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_zero_timeout_is_invalid() {
        let err =
            CoordinatorConfig::from_toml_str("[coordinator]\nremote_timeout_ms = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(msg) if msg.contains("remote_timeout_ms")));
    }

    #[test]
    fn test_unknown_key_is_a_parse_error() {
        let err = CoordinatorConfig::from_toml_str("[sync]\npagesize = 10\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cosign.toml");
        std::fs::write(
            &path,
            "[dedup]\nretention_ms = 1000\n\n[telemetry]\nfile = { directory = \"logs\", prefix = \"cosign.log\" }\n",
        )
        .unwrap();

        let config = CoordinatorConfig::load(&path).unwrap();
        assert_eq!(config.dedup.retention, Duration::from_secs(1));
        let file = config.telemetry.file.unwrap();
        assert_eq!(file.directory, PathBuf::from("logs"));
        assert_eq!(file.prefix, "cosign.log");
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = CoordinatorConfig::load(dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}

//! Configuration loading for passthru-relay.
//!
//! Configuration is loaded from a TOML file (default: `passthru.toml`).
//! Every section and field is optional.

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration for passthru-relay.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Session configuration.
    #[serde(default)]
    pub session: SessionConfig,
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Bind address for the HTTP listener (default: 0.0.0.0:8000).
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    /// Host shown to users in download links. Only used for display.
    pub public_host: Option<String>,
    /// Scheme shown to users in download links (default: http).
    pub public_scheme: Option<String>,
    /// Take client addresses from `X-Forwarded-For` when logging.
    #[serde(default)]
    pub trust_forwarded_for: bool,
    /// Enable metrics endpoint (default: true).
    #[serde(default = "default_metrics_enabled")]
    pub metrics_enabled: bool,
}

/// Session configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// How long an uploader waits for a downloader, in seconds (default: 3600).
    #[serde(default = "default_wait_timeout_secs")]
    pub wait_timeout_secs: u64,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log file path. Logs go to stderr when unset.
    pub file: Option<PathBuf>,
    /// Rotate the log file once it grows past this many bytes (default: 1MB).
    #[serde(default = "default_log_max_bytes")]
    pub max_bytes: u64,
    /// Number of rotated generations to keep (default: 10).
    #[serde(default = "default_log_keep_files")]
    pub keep_files: usize,
    /// Default tracing filter when `RUST_LOG` is unset (default: info).
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

// Default value functions
fn default_bind_address() -> String {
    "0.0.0.0:8000".to_string()
}

fn default_metrics_enabled() -> bool {
    true
}

fn default_wait_timeout_secs() -> u64 {
    60 * 60 // 60 minutes
}

fn default_log_max_bytes() -> u64 {
    1024 * 1024 // 1MB
}

fn default_log_keep_files() -> usize {
    10
}

fn default_log_filter() -> String {
    "info".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            public_host: None,
            public_scheme: None,
            trust_forwarded_for: false,
            metrics_enabled: default_metrics_enabled(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            wait_timeout_secs: default_wait_timeout_secs(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            file: None,
            max_bytes: default_log_max_bytes(),
            keep_files: default_log_keep_files(),
            filter: default_log_filter(),
        }
    }
}

impl SessionConfig {
    /// The peer wait bound as a [`Duration`].
    pub fn wait_timeout(&self) -> Duration {
        Duration::from_secs(self.wait_timeout_secs)
    }
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Failed to parse configuration file.
    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying TOML parse error.
        source: toml::de::Error,
    },
}

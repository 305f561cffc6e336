//! Configuration loading and management.
//!
//! The server reads an optional TOML file; command-line arguments override
//! whatever the file sets. Every section may be omitted.
//!
//! ```toml
//! [server]
//! socket_path = "./tmp/msgsock"
//! users_file = "users.txt"
//! log_file = "deliveries.log"
//!
//! [writer]
//! flush_interval_ms = 2000
//!
//! [limits]
//! max_frame_len = 65536
//! ```

mod defaults;

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use defaults::*;

/// Configuration loading error.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("missing required setting: {0}")]
    Missing(&'static str),
    #[error("invalid setting {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// Server configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Socket and file locations.
    #[serde(default)]
    pub server: ServerConfig,
    /// Delivery log writer settings.
    #[serde(default)]
    pub writer: WriterConfig,
    /// Protocol limits.
    #[serde(default)]
    pub limits: LimitsConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse configuration from TOML text.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check values that serde cannot reject on its own.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.writer.flush_interval_ms == 0 {
            return Err(ConfigError::Invalid {
                key: "writer.flush_interval_ms",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.limits.max_frame_len < 2 {
            return Err(ConfigError::Invalid {
                key: "limits.max_frame_len",
                reason: "must leave room for a tag and a payload byte".to_string(),
            });
        }
        if self.server.socket_path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid {
                key: "server.socket_path",
                reason: "must not be empty".to_string(),
            });
        }
        Ok(())
    }
}

/// Socket and file locations.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Path of the listening Unix socket.
    #[serde(default = "default_socket_path")]
    pub socket_path: PathBuf,
    /// Allow-list of usernames, one per line.
    #[serde(default)]
    pub users_file: Option<PathBuf>,
    /// Delivery log, truncated at start-up.
    #[serde(default)]
    pub log_file: Option<PathBuf>,
}

impl ServerConfig {
    /// The allow-list path, which has no default.
    pub fn users_file(&self) -> Result<&Path, ConfigError> {
        self.users_file
            .as_deref()
            .ok_or(ConfigError::Missing("server.users_file"))
    }

    /// The delivery log path, which has no default.
    pub fn log_file(&self) -> Result<&Path, ConfigError> {
        self.log_file
            .as_deref()
            .ok_or(ConfigError::Missing("server.log_file"))
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            socket_path: default_socket_path(),
            users_file: None,
            log_file: None,
        }
    }
}

/// Delivery log writer settings.
#[derive(Debug, Clone, Deserialize)]
pub struct WriterConfig {
    /// Milliseconds between two flushes of the delivery log.
    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,
}

impl WriterConfig {
    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            flush_interval_ms: default_flush_interval_ms(),
        }
    }
}

/// Protocol limits.
#[derive(Debug, Clone, Deserialize)]
pub struct LimitsConfig {
    /// Largest accepted value of a frame's `length` field.
    #[serde(default = "default_max_frame_len")]
    pub max_frame_len: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_frame_len: default_max_frame_len(),
        }
    }
}

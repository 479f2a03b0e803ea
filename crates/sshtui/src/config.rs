//! Configuration management for sshtui.
//!
//! This module provides TOML-based configuration file loading and saving.
//! The default configuration path is `~/.config/sshtui/config.toml`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("connect_timeout_secs must be between 1 and 300 seconds, got {0}")]
    InvalidConnectTimeout(u64),

    #[error("scrollback_limit must be greater than 0, got {0}")]
    InvalidScrollbackLimit(usize),

    #[error("replay_bytes ({replay}) must not exceed scrollback_limit ({limit})")]
    InvalidReplayBytes { replay: usize, limit: usize },

    #[error("page_size must be between 1 and 500, got {0}")]
    InvalidPageSize(usize),

    #[error("ssh program does not exist: {0}")]
    InvalidSshProgram(String),

    #[error("log_level must be one of: trace, debug, info, warn, error; got {0}")]
    InvalidLogLevel(String),
}

/// Valid log level values for tracing configuration.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Default scrollback ceiling per session (1 MiB).
pub const DEFAULT_SCROLLBACK_LIMIT: usize = 1024 * 1024;

/// Default number of scrollback bytes replayed on attach.
pub const DEFAULT_REPLAY_BYTES: usize = 4096;

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    /// General settings.
    pub general: GeneralConfig,

    /// Remote-shell client settings.
    pub ssh: SshConfig,

    /// Session settings.
    pub session: SessionConfig,

    /// Scrollback pager settings.
    pub pager: PagerConfig,
}

/// General settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GeneralConfig {
    /// Directory for the log file.
    pub data_dir: PathBuf,

    /// Logging level (trace, debug, info, warn, error).
    pub log_level: String,
}

/// Remote-shell client settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SshConfig {
    /// Program spawned for every session and multi-host command.
    pub program: String,

    /// OpenSSH client configuration the host list is read from.
    pub config_path: PathBuf,

    /// Bounded wait for a session's pseudo-terminal to come up.
    pub connect_timeout_secs: u64,
}

/// Session settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SessionConfig {
    /// Scrollback ceiling per session in bytes.
    pub scrollback_limit: usize,

    /// Bytes of scrollback replayed when reattaching.
    pub replay_bytes: usize,

    /// How long a close waits for the child to exit after SIGTERM.
    pub close_grace_secs: u64,
}

/// Scrollback pager settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PagerConfig {
    /// Lines per page.
    pub page_size: usize,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            log_level: "info".to_string(),
        }
    }
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            program: "ssh".to_string(),
            config_path: hosts::default_ssh_config_path(),
            connect_timeout_secs: 10,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            scrollback_limit: DEFAULT_SCROLLBACK_LIMIT,
            replay_bytes: DEFAULT_REPLAY_BYTES,
            close_grace_secs: 5,
        }
    }
}

impl Default for PagerConfig {
    fn default() -> Self {
        Self { page_size: 20 }
    }
}

impl SshConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

impl SessionConfig {
    pub fn close_grace(&self) -> Duration {
        Duration::from_secs(self.close_grace_secs)
    }
}

/// Returns the default configuration file path.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("sshtui")
        .join("config.toml")
}

/// Returns the default data directory path.
fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("sshtui")
}

impl Config {
    /// Apply environment variable overrides to the configuration.
    ///
    /// Environment variables take precedence over config file values.
    /// Supported variables:
    /// - SSHTUI_LOG_LEVEL: Override log level (trace, debug, info, warn, error)
    /// - SSHTUI_SSH_PROGRAM: Override the remote-shell client program
    /// - SSHTUI_SSH_CONFIG: Override the OpenSSH client config path
    pub fn apply_env_overrides(&mut self) {
        if let Ok(level) = std::env::var("SSHTUI_LOG_LEVEL") {
            if !level.is_empty() {
                tracing::info!("Overriding log_level from environment: {}", level);
                self.general.log_level = level;
            }
        }

        if let Ok(program) = std::env::var("SSHTUI_SSH_PROGRAM") {
            if !program.is_empty() {
                tracing::info!("Overriding ssh program from environment: {}", program);
                self.ssh.program = program;
            }
        }

        if let Ok(path) = std::env::var("SSHTUI_SSH_CONFIG") {
            if !path.is_empty() {
                tracing::info!("Overriding ssh config path from environment: {}", path);
                self.ssh.config_path = PathBuf::from(path);
            }
        }
    }

    /// Validate the configuration values.
    ///
    /// Returns an error if any configuration value is outside the valid range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let timeout = self.ssh.connect_timeout_secs;
        if !(1..=300).contains(&timeout) {
            return Err(ConfigError::InvalidConnectTimeout(timeout));
        }

        if self.session.scrollback_limit == 0 {
            return Err(ConfigError::InvalidScrollbackLimit(
                self.session.scrollback_limit,
            ));
        }

        if self.session.replay_bytes > self.session.scrollback_limit {
            return Err(ConfigError::InvalidReplayBytes {
                replay: self.session.replay_bytes,
                limit: self.session.scrollback_limit,
            });
        }

        let page_size = self.pager.page_size;
        if !(1..=500).contains(&page_size) {
            return Err(ConfigError::InvalidPageSize(page_size));
        }

        let program = Path::new(&self.ssh.program);
        let found = if program.is_absolute() {
            program.exists()
        } else {
            which::which(&self.ssh.program).is_ok()
        };
        if !found {
            return Err(ConfigError::InvalidSshProgram(self.ssh.program.clone()));
        }

        let level = self.general.log_level.to_lowercase();
        if !VALID_LOG_LEVELS.contains(&level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(self.general.log_level.clone()));
        }

        Ok(())
    }

    /// Load configuration from a file.
    ///
    /// If the file does not exist, returns the default configuration.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            tracing::debug!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_toml(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Load configuration from the default path.
    pub fn load_default() -> Result<Self> {
        Self::load(default_config_path())
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str)
            .map_err(|e| anyhow::anyhow!("Invalid TOML configuration: {}", format_toml_error(&e)))
    }

    /// Save configuration to a file.
    ///
    /// Creates parent directories if they don't exist.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let contents = self.to_toml()?;
        fs::write(path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        tracing::debug!("Configuration saved to {:?}", path);
        Ok(())
    }

    /// Serialize configuration to a TOML string.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")
    }

    /// Path of the log file inside the data directory.
    pub fn log_file(&self) -> PathBuf {
        self.general.data_dir.join("sshtui.log")
    }
}

/// Format a TOML deserialization error for user-friendly display.
fn format_toml_error(error: &toml::de::Error) -> String {
    let mut msg = error.message().to_string();

    if let Some(span) = error.span() {
        msg.push_str(&format!(" (at position {}..{})", span.start, span.end));
    }

    msg
}

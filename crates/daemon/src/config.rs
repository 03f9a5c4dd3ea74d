//! Configuration management for the RootView daemon.
//!
//! This module provides TOML-based configuration file loading and saving.
//! The default configuration path is `~/.config/rootview/config.toml`.
//! Environment variables override file values, and [`Config::validate`]
//! must pass before the daemon serves anything.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::files::{AllowedExtensionSet, ExtensionError, FileScope, ScanLimits};

/// Environment variable overriding `files.root`.
pub const ENV_ROOT: &str = "MONITORING_BASE_DIR";
/// Environment variable overriding `files.allowed_extensions` (comma-separated).
pub const ENV_ALLOWED_EXTENSIONS: &str = "ALLOWED_EXTENSIONS";
/// Environment variable overriding `server.port`.
pub const ENV_PORT: &str = "PORT";
/// Environment variable overriding `daemon.log_level`.
pub const ENV_LOG_LEVEL: &str = "ROOTVIEW_LOG_LEVEL";

/// Largest accepted `files.max_depth`.
const MAX_SCAN_DEPTH: usize = 256;

/// Configuration validation errors.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("files.root is required (set it in the config file or via MONITORING_BASE_DIR)")]
    MissingRoot,

    #[error("files.root must be an absolute path, got {0}")]
    RelativeRoot(PathBuf),

    #[error("files.allowed_extensions is required (set it in the config file or via ALLOWED_EXTENSIONS)")]
    MissingExtensions,

    #[error("invalid entry in files.allowed_extensions: {0}")]
    InvalidExtension(String),

    #[error("log_level must be one of: trace, debug, info, warn, error; got {0}")]
    InvalidLogLevel(String),

    #[error("base_path must start with '/' and must not end with '/', got {0:?}")]
    InvalidBasePath(String),

    #[error("{name} is out of range: {value}")]
    InvalidScanLimit { name: &'static str, value: usize },
}

/// Valid log level values for tracing configuration.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Main configuration structure for the RootView daemon.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    /// General daemon configuration.
    pub daemon: DaemonConfig,

    /// HTTP server configuration.
    pub server: ServerConfig,

    /// What is served.
    pub files: FileConfig,
}

/// General daemon configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DaemonConfig {
    /// Logging level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Directory for daily rolling log files. Logs go to stderr only when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_dir: Option<PathBuf>,
}

/// HTTP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind.
    pub bind_address: String,

    /// Port to listen on (0 picks an ephemeral port).
    pub port: u16,

    /// Prefix under which the API routes are mounted.
    pub base_path: String,

    /// Allow cross-origin requests from any origin.
    pub cors_permissive: bool,

    /// `max-age` in seconds sent with previews.
    pub cache_max_age: u64,
}

/// Served files configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FileConfig {
    /// Absolute path of the directory to expose.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub root: Option<PathBuf>,

    /// Extensions that may be listed and opened, e.g. `[".pdf", ".png"]`.
    pub allowed_extensions: Vec<String>,

    /// Maximum directory nesting a listing descends into.
    pub max_depth: usize,

    /// Maximum number of entries in one listing.
    pub max_entries: usize,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_dir: None,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 3000,
            base_path: "/v1".to_string(),
            cors_permissive: true,
            cache_max_age: 3600,
        }
    }
}

impl Default for FileConfig {
    fn default() -> Self {
        let limits = ScanLimits::default();
        Self {
            root: None,
            allowed_extensions: Vec::new(),
            max_depth: limits.max_depth,
            max_entries: limits.max_entries,
        }
    }
}

/// Returns the default configuration file path.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("rootview")
        .join("config.toml")
}

impl ServerConfig {
    /// `bind_address:port` as passed to the listener.
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }
}

impl Config {
    /// Apply environment variable overrides to the configuration.
    ///
    /// Environment variables take precedence over config file values; empty
    /// values are ignored.
    /// Supported variables:
    /// - MONITORING_BASE_DIR: Override the root directory
    /// - ALLOWED_EXTENSIONS: Override allowed extensions (comma-separated)
    /// - PORT: Override the listening port
    /// - ROOTVIEW_LOG_LEVEL: Override log level (trace, debug, info, warn, error)
    pub fn apply_env_overrides(&mut self) {
        if let Some(root) = non_empty_env(ENV_ROOT) {
            tracing::info!("Overriding files.root from environment: {}", root);
            self.files.root = Some(PathBuf::from(root));
        }

        if let Some(list) = non_empty_env(ENV_ALLOWED_EXTENSIONS) {
            tracing::info!("Overriding files.allowed_extensions from environment: {}", list);
            self.files.allowed_extensions = list
                .split(',')
                .map(str::trim)
                .filter(|ext| !ext.is_empty())
                .map(str::to_string)
                .collect();
        }

        if let Some(port) = non_empty_env(ENV_PORT) {
            match port.trim().parse::<u16>() {
                Ok(port) => {
                    tracing::info!("Overriding server.port from environment: {}", port);
                    self.server.port = port;
                }
                Err(_) => {
                    tracing::warn!("Ignoring invalid {} value: {:?}", ENV_PORT, port);
                }
            }
        }

        if let Some(level) = non_empty_env(ENV_LOG_LEVEL) {
            tracing::info!("Overriding log_level from environment: {}", level);
            self.daemon.log_level = level;
        }
    }

    /// Validate the configuration values.
    ///
    /// Returns an error if a required value is missing or any value is
    /// outside its valid range. The root is not required to exist yet.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let level = self.daemon.log_level.to_lowercase();
        if !VALID_LOG_LEVELS.contains(&level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(self.daemon.log_level.clone()));
        }

        let base = &self.server.base_path;
        if !base.starts_with('/') || (base.len() > 1 && base.ends_with('/')) {
            return Err(ConfigError::InvalidBasePath(base.clone()));
        }

        if self.files.max_depth > MAX_SCAN_DEPTH {
            return Err(ConfigError::InvalidScanLimit {
                name: "files.max_depth",
                value: self.files.max_depth,
            });
        }
        if self.files.max_entries == 0 {
            return Err(ConfigError::InvalidScanLimit {
                name: "files.max_entries",
                value: self.files.max_entries,
            });
        }

        self.root()?;
        self.allowed_extensions()?;
        Ok(())
    }

    /// Build the immutable [`FileScope`] shared by all request handlers.
    pub fn file_scope(&self) -> Result<FileScope, ConfigError> {
        self.validate()?;
        let limits = ScanLimits {
            max_depth: self.files.max_depth,
            max_entries: self.files.max_entries,
        };
        Ok(FileScope::new(
            self.root()?,
            self.allowed_extensions()?,
            limits,
        ))
    }

    fn root(&self) -> Result<PathBuf, ConfigError> {
        let root = self.files.root.as_ref().ok_or(ConfigError::MissingRoot)?;
        if root.as_os_str().is_empty() {
            return Err(ConfigError::MissingRoot);
        }
        if !root.is_absolute() {
            return Err(ConfigError::RelativeRoot(root.clone()));
        }
        Ok(root.clone())
    }

    fn allowed_extensions(&self) -> Result<AllowedExtensionSet, ConfigError> {
        AllowedExtensionSet::new(&self.files.allowed_extensions).map_err(|e| match e {
            ExtensionError::Empty => ConfigError::MissingExtensions,
            ExtensionError::Malformed(ext) => ConfigError::InvalidExtension(ext),
        })
    }

    /// Load configuration from a file.
    ///
    /// If the file does not exist, returns the default configuration.
    /// If the file exists but is invalid TOML, returns an error with
    /// a helpful message.
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
    ///
    /// The default path is `~/.config/rootview/config.toml`.
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
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|value| !value.is_empty())
}

/// Format a TOML deserialization error for user-friendly display.
fn format_toml_error(error: &toml::de::Error) -> String {
    let mut msg = error.message().to_string();

    if let Some(span) = error.span() {
        msg.push_str(&format!(" (at position {}..{})", span.start, span.end));
    }

    msg
}

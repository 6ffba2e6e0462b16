//! Configuration management for relaymls
//!
//! Defaults, `RELAYMLS_*` environment overrides, TOML files and
//! validation.

use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

mod error;

pub use error::ConfigError;

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Session configuration
    pub session: SessionConfig,

    /// Logging configuration
    pub logging: LoggingConfig,

    /// Metrics configuration
    pub metrics: MetricsConfig,
}

/// Where session state is persisted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// One SQLite file per identity under `data_dir`
    Sqlite,
    /// Process memory only
    Memory,
}

impl FromStr for StorageBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sqlite" => Ok(Self::Sqlite),
            "memory" => Ok(Self::Memory),
            other => Err(format!("unknown storage backend '{}'", other)),
        }
    }
}

/// Session configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Directory holding `<identity>mls.db`
    pub data_dir: PathBuf,

    pub storage: StorageBackend,

    /// How long issued key packages stay valid
    #[serde(with = "humantime_serde")]
    pub key_package_lifetime: Duration,

    /// Upper bound on roster size, creator included
    pub max_group_size: usize,

    /// Relays advertised in issued key packages
    pub relays: Vec<String>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Enable JSON formatting
    pub json_format: bool,

    /// Include timestamps
    pub with_timestamp: bool,

    /// Include target module
    pub with_target: bool,
}

/// Metrics configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Register metric descriptions at startup
    pub enabled: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            storage: StorageBackend::Sqlite,
            key_package_lifetime: Duration::from_secs(90 * 24 * 60 * 60),
            max_group_size: 1000,
            relays: vec![],
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
            with_timestamp: true,
            with_target: true,
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

fn parse_var<T>(var: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(var) {
        Ok(raw) => raw
            .parse()
            .map(Some)
            .map_err(|e: T::Err| ConfigError::InvalidValue { var, reason: e.to_string() }),
        Err(_) => Ok(None),
    }
}

impl Config {
    /// Load configuration from environment variables
    ///
    /// Environment variables follow the pattern: RELAYMLS_<SECTION>_<KEY>
    /// Example: RELAYMLS_SESSION_DATA_DIR=/var/lib/relaymls
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Overlay `RELAYMLS_*` variables onto this configuration
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Some(dir) = parse_var::<PathBuf>("RELAYMLS_SESSION_DATA_DIR")? {
            self.session.data_dir = dir;
        }
        if let Some(backend) = parse_var("RELAYMLS_SESSION_STORAGE")? {
            self.session.storage = backend;
        }
        if let Ok(lifetime) = env::var("RELAYMLS_SESSION_KEY_PACKAGE_LIFETIME") {
            self.session.key_package_lifetime =
                humantime_serde::re::humantime::parse_duration(&lifetime).map_err(|e| ConfigError::InvalidValue {
                    var: "RELAYMLS_SESSION_KEY_PACKAGE_LIFETIME",
                    reason: e.to_string(),
                })?;
        }
        if let Some(size) = parse_var("RELAYMLS_SESSION_MAX_GROUP_SIZE")? {
            self.session.max_group_size = size;
        }
        if let Ok(relays) = env::var("RELAYMLS_SESSION_RELAYS") {
            self.session.relays = relays
                .split(',')
                .map(str::trim)
                .filter(|r| !r.is_empty())
                .map(String::from)
                .collect();
        }

        if let Ok(level) = env::var("RELAYMLS_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(json) = parse_var("RELAYMLS_LOG_JSON")? {
            self.logging.json_format = json;
        }

        if let Some(enabled) = parse_var("RELAYMLS_METRICS_ENABLED")? {
            self.metrics.enabled = enabled;
        }

        Ok(())
    }

    /// Load configuration from file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::FileReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self =
            toml::from_str(&contents).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.session.max_group_size < 2 {
            return Err(ConfigError::ValidationFailed(
                "max_group_size must allow at least two members".to_string(),
            ));
        }

        if self.session.key_package_lifetime.is_zero() {
            return Err(ConfigError::ValidationFailed(
                "key_package_lifetime must be greater than 0".to_string(),
            ));
        }

        if let Some(relay) = self
            .session
            .relays
            .iter()
            .find(|r| !(r.starts_with("wss://") || r.starts_with("ws://")))
        {
            return Err(ConfigError::ValidationFailed(format!("Invalid relay url: {}", relay)));
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(ConfigError::ValidationFailed(format!(
                "Invalid log level: {}",
                self.logging.level
            )));
        }

        Ok(())
    }

    /// Save configuration to file
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let contents =
            toml::to_string_pretty(self).map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(path, contents).map_err(|e| ConfigError::FileWriteError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        Ok(())
    }
}

//! Configuration error types

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read configuration file {path}: {reason}")]
    FileReadError { path: PathBuf, reason: String },

    #[error("Failed to write configuration file {path}: {reason}")]
    FileWriteError { path: PathBuf, reason: String },

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Failed to serialize configuration: {0}")]
    SerializeError(String),

    #[error("Invalid value for {var}: {reason}")]
    InvalidValue { var: &'static str, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

//! Error types for the logging subsystem

use thiserror::Error;

/// Errors raised while configuring the subscriber
#[derive(Debug, Clone, Error)]
pub enum LoggingError {
    /// A global subscriber is already installed
    #[error("Failed to initialize logging: {0}")]
    InitializationFailed(String),

    #[error("Invalid logging configuration: {0}")]
    InvalidConfiguration(String),
}

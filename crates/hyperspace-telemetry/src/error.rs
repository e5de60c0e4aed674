//! Telemetry error types.

use thiserror::Error;

/// Errors that can occur while setting up telemetry.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// The supplied [`crate::LogConfig`] could not be turned into a
    /// working subscriber (e.g. a malformed env-filter directive).
    #[error("configuration error: {0}")]
    ConfigError(String),

    /// The global subscriber was already installed.
    #[error("initialization error: {0}")]
    InitError(String),

    /// Setting up a file appender failed.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Result type for telemetry operations.
pub type TelemetryResult<T> = Result<T, TelemetryError>;

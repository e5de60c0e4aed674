//! Configuration error types.

/// Errors that can occur while loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A config file could not be read.
    #[error("failed to read config file {path}: {source}")]
    ReadError {
        /// Path of the file that could not be read.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A config file could not be parsed as TOML, or the merged tree could
    /// not be deserialized into [`crate::types::Config`].
    #[error("failed to parse config {path}: {source}")]
    ParseError {
        /// Path of the file (or a synthetic label for embedded/merged trees).
        path: String,
        /// Underlying TOML error.
        #[source]
        source: toml::de::Error,
    },

    /// A field failed validation after the full configuration was merged.
    #[error("invalid configuration field `{field}`: {message}")]
    ValidationError {
        /// Dotted key of the offending field.
        field: String,
        /// Human-readable description of the problem.
        message: String,
    },

    /// The user's home directory could not be determined.
    #[error("could not determine home directory")]
    NoHomeDir,
}

/// Result alias for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

//! Errors that can abort the server at the transport or startup layer,
//! as opposed to [`hyperspace_core::HyperspaceError`], which is the
//! per-request error type carried in a reply payload.

use thiserror::Error;

/// Errors raised by the server's transport and startup code.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The persisted store could not be opened.
    #[error("storage error: {0}")]
    Storage(#[from] hyperspace_storage::StorageError),
    /// Configuration failed to load or validate.
    #[error("config error: {0}")]
    Config(#[from] hyperspace_config::ConfigError),
    /// An I/O error binding or accepting on a socket.
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// A startup operation against the node tree or session table failed.
    #[error("startup error: {0}")]
    Startup(#[from] hyperspace_core::HyperspaceError),
}

/// Result alias for server transport/startup code.
pub type ServerResult<T> = Result<T, ServerError>;

//! Storage-layer error type and its conversion into the service-wide
//! [`HyperspaceError`] taxonomy.

use hyperspace_core::HyperspaceError;

/// Errors from the transactional store itself, below the level of any
/// particular node/session/lock semantics.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The embedded engine reported a write-write conflict; the caller
    /// should retry the whole transaction.
    #[error("transaction conflict")]
    Conflict,

    /// The base directory could not be opened, created, or advisory-locked.
    #[error("base directory error: {0}")]
    BaseDirectory(String),

    /// The underlying engine reported an I/O or corruption error.
    #[error("engine error: {0}")]
    Engine(String),

    /// A stored value failed to (de)serialize.
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

impl From<StorageError> for HyperspaceError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Conflict => Self::StoreDeadlock,
            StorageError::BaseDirectory(msg) | StorageError::Engine(msg) => {
                Self::StoreError(msg)
            }
            StorageError::Serialization(msg) => Self::StoreError(format!("serialization: {msg}")),
        }
    }
}

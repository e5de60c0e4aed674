//! Hyperspace error taxonomy.
//!
//! Every fallible operation in the service returns a [`HyperspaceError`].
//! Each variant also classifies into one of the four [`ErrorKind`]s from
//! `spec.md` §7, which callers use to decide whether to retry, surface the
//! error verbatim, or treat it as session-fatal.

use thiserror::Error;

/// The four error classes from `spec.md` §7.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Part of the normal API contract; return verbatim, never retried.
    Precondition,
    /// The session the request was issued under is gone.
    SessionLifetime,
    /// Transient store contention; retried internally with backoff.
    Transient,
    /// Unrecoverable infrastructure failure; logged and the process exits.
    Fatal,
}

/// Errors returned by Hyperspace operations.
#[derive(Debug, Error)]
pub enum HyperspaceError {
    /// A pathname was empty, relative, or contained an empty component.
    #[error("bad pathname: {0}")]
    BadPathname(String),

    /// The named node does not exist.
    #[error("file not found: {0}")]
    FileNotFound(String),

    /// The named node already exists.
    #[error("file exists: {0}")]
    FileExists(String),

    /// `unlink` was attempted on a node with open handles.
    #[error("file open: {0}")]
    FileOpen(String),

    /// A `lock` or atomic-lock-on-open request conflicted with the
    /// current holder under `try_lock` semantics.
    #[error("lock conflict on {0}")]
    LockConflict(String),

    /// The calling handle already holds this lock in an incompatible mode.
    #[error("already locked: {0}")]
    AlreadyLocked(String),

    /// The calling handle lacks the `lock`/`write` bits required for the
    /// requested operation.
    #[error("mode restriction: {0}")]
    ModeRestriction(String),

    /// The handle id does not refer to an open handle.
    #[error("invalid handle: {0}")]
    InvalidHandle(u64),

    /// The named extended attribute does not exist on the handle's node.
    #[error("attribute not found: {0}")]
    AttrNotFound(String),

    /// `release` was called on a handle that does not hold the lock.
    #[error("not locked: handle {0}")]
    NotLocked(u64),

    /// A pending lock request was cancelled by its handle's close.
    #[error("request cancelled")]
    RequestCancelled,

    /// The session referenced by a request no longer exists.
    #[error("expired session: {0}")]
    ExpiredSession(u64),

    /// The transactional store detected a write-write conflict; retried
    /// internally with randomised backoff before being surfaced.
    #[error("store deadlock")]
    StoreDeadlock,

    /// An unrecoverable storage failure: corruption, an unlockable base
    /// directory, or an I/O error the retry loop could not absorb.
    #[error("store error: {0}")]
    StoreError(String),

    /// An inbound message used a command code outside the known set.
    #[error("protocol error: {0}")]
    ProtocolError(String),
}

impl HyperspaceError {
    /// Classify this error per `spec.md` §7.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::BadPathname(_)
            | Self::FileNotFound(_)
            | Self::FileExists(_)
            | Self::FileOpen(_)
            | Self::LockConflict(_)
            | Self::AlreadyLocked(_)
            | Self::ModeRestriction(_)
            | Self::InvalidHandle(_)
            | Self::AttrNotFound(_)
            | Self::NotLocked(_)
            | Self::RequestCancelled => ErrorKind::Precondition,
            Self::ExpiredSession(_) => ErrorKind::SessionLifetime,
            Self::StoreDeadlock => ErrorKind::Transient,
            Self::StoreError(_) | Self::ProtocolError(_) => ErrorKind::Fatal,
        }
    }

    /// Reconstruct an error from a reply's wire error code, for the
    /// client side of the protocol. `context` fills in the string detail
    /// the wire format does not carry (a path, an attribute name, ...);
    /// pass an empty string if none is available at the call site.
    ///
    /// Returns `None` for code `0` (no error) or an unrecognised code,
    /// which the caller should treat as [`HyperspaceError::ProtocolError`].
    #[must_use]
    pub fn from_wire(code: i32, context: String) -> Option<Self> {
        Some(match code {
            1 => Self::ExpiredSession(context.parse().unwrap_or(0)),
            2 => Self::BadPathname(context),
            3 => Self::FileExists(context),
            4 => Self::FileNotFound(context),
            5 => Self::FileOpen(context),
            6 => Self::LockConflict(context),
            7 => Self::ModeRestriction(context),
            8 => Self::InvalidHandle(context.parse().unwrap_or(0)),
            9 => Self::AttrNotFound(context),
            10 => Self::AlreadyLocked(context),
            11 => Self::NotLocked(context.parse().unwrap_or(0)),
            12 => Self::RequestCancelled,
            13 => Self::StoreDeadlock,
            14 => Self::StoreError(context),
            15 => Self::ProtocolError(context),
            _ => return None,
        })
    }

    /// The wire error code from `spec.md` §6, used by the protocol encoder.
    #[must_use]
    pub const fn wire_code(&self) -> i32 {
        match self {
            Self::BadPathname(_) => 2,
            Self::FileExists(_) => 3,
            Self::FileNotFound(_) => 4,
            Self::FileOpen(_) => 5,
            Self::LockConflict(_) => 6,
            Self::ModeRestriction(_) => 7,
            Self::InvalidHandle(_) => 8,
            Self::AttrNotFound(_) => 9,
            Self::AlreadyLocked(_) => 10,
            Self::NotLocked(_) => 11,
            Self::RequestCancelled => 12,
            Self::ExpiredSession(_) => 1,
            Self::StoreDeadlock => 13,
            Self::StoreError(_) => 14,
            Self::ProtocolError(_) => 15,
        }
    }
}

/// Result alias used throughout the Hyperspace workspace.
pub type HyperspaceResult<T> = Result<T, HyperspaceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expired_session_is_session_lifetime() {
        assert_eq!(HyperspaceError::ExpiredSession(1).kind(), ErrorKind::SessionLifetime);
    }

    #[test]
    fn store_deadlock_is_transient() {
        assert_eq!(HyperspaceError::StoreDeadlock.kind(), ErrorKind::Transient);
    }

    #[test]
    fn bad_pathname_is_precondition() {
        assert_eq!(
            HyperspaceError::BadPathname("x".into()).kind(),
            ErrorKind::Precondition
        );
    }

    #[test]
    fn wire_code_roundtrips_through_from_wire() {
        let error = HyperspaceError::LockConflict("/l".into());
        let rebuilt = HyperspaceError::from_wire(error.wire_code(), "/l".into()).unwrap();
        assert_eq!(rebuilt.wire_code(), error.wire_code());
    }

    #[test]
    fn unknown_wire_code_is_none() {
        assert!(HyperspaceError::from_wire(999, String::new()).is_none());
    }
}

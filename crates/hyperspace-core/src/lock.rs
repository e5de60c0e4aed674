//! Lock modes, statuses, and the sequencer third parties use to validate
//! a claimed lock.

use serde::{Deserialize, Serialize};

use crate::node::NodePath;

/// A node's lock generation: strictly increasing on every grant, and
/// persisted so it survives a server restart.
pub type LockGeneration = u64;

/// The mode a lock is held or requested in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LockMode {
    /// Any number of handles may hold the lock concurrently.
    Shared,
    /// At most one handle may hold the lock.
    Exclusive,
}

impl LockMode {
    /// Wire encoding used by `spec.md` §6 (1 = shared, 2 = exclusive,
    /// matching the original `LOCK_MODE_SHARED`/`LOCK_MODE_EXCLUSIVE`).
    #[must_use]
    pub const fn to_wire(self) -> i32 {
        match self {
            Self::Shared => 1,
            Self::Exclusive => 2,
        }
    }

    /// Decode the wire representation.
    #[must_use]
    pub const fn from_wire(value: i32) -> Option<Self> {
        match value {
            1 => Some(Self::Shared),
            2 => Some(Self::Exclusive),
            _ => None,
        }
    }
}

/// The outcome of a `lock` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LockStatus {
    /// The lock was granted immediately.
    Granted,
    /// A `try_lock` request found the node unavailable.
    Busy,
    /// A blocking request was enqueued and will be granted later.
    Pending,
    /// A pending request was cancelled (its handle closed before grant).
    Cancelled,
}

/// An (node, mode, generation) triple returned on grant, used by
/// unrelated services to validate that a client still holds the lock it
/// claims to hold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockSequencer {
    /// The node the lock was taken on.
    pub node: NodePath,
    /// The mode the lock is held in.
    pub mode: LockMode,
    /// The generation at the time of grant.
    pub generation: LockGeneration,
}

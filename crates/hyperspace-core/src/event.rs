//! Events: immutable records of state changes delivered to interested
//! handles.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::EventId;
use crate::lock::{LockGeneration, LockMode};

/// The kind-specific payload of an event.
///
/// `AttrSet`/`AttrDel` carry the attribute name; `ChildAdded`/
/// `ChildRemoved` carry the child's name within the parent; the lock
/// events carry the mode and, for `LockGranted`, the new generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    /// An extended attribute was set.
    AttrSet {
        /// Name of the attribute that changed.
        name: String,
    },
    /// An extended attribute was deleted.
    AttrDel {
        /// Name of the attribute that was removed.
        name: String,
    },
    /// A child node was created under the parent.
    ChildAdded {
        /// Name of the new child, relative to the parent.
        name: String,
    },
    /// A child node was removed from the parent.
    ChildRemoved {
        /// Name of the removed child, relative to the parent.
        name: String,
    },
    /// A lock transitioned from unheld to held.
    LockAcquired {
        /// The mode the lock was acquired in.
        mode: LockMode,
    },
    /// A lock transitioned from held to unheld.
    LockReleased,
    /// A previously pending lock request was granted.
    LockGranted {
        /// The mode the waiter was granted.
        mode: LockMode,
        /// The new lock generation as of this grant.
        generation: LockGeneration,
    },
}

impl EventKind {
    /// The `EventMask` bit this kind is gated by, or `None` for
    /// `LockGranted`, which bypasses the mask entirely (`spec.md` §6).
    #[must_use]
    pub const fn mask_bit(&self) -> Option<u32> {
        use crate::flags::EventMask;
        match self {
            Self::AttrSet { .. } => Some(EventMask::ATTR_SET),
            Self::AttrDel { .. } => Some(EventMask::ATTR_DEL),
            Self::ChildAdded { .. } => Some(EventMask::CHILD_ADDED),
            Self::ChildRemoved { .. } => Some(EventMask::CHILD_REMOVED),
            Self::LockAcquired { .. } => Some(EventMask::LOCK_ACQUIRED),
            Self::LockReleased => Some(EventMask::LOCK_RELEASED),
            Self::LockGranted { .. } => None,
        }
    }
}

/// A persisted, immutable event record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Monotonically assigned id, unique for the lifetime of the service.
    pub id: EventId,
    /// The kind-specific payload.
    pub kind: EventKind,
    /// Wall-clock creation time, for diagnostics only.
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_granted_bypasses_the_mask() {
        let kind = EventKind::LockGranted { mode: LockMode::Exclusive, generation: 3 };
        assert_eq!(kind.mask_bit(), None);
    }

    #[test]
    fn attr_set_is_gated_by_its_bit() {
        use crate::flags::EventMask;
        let kind = EventKind::AttrSet { name: "x".to_owned() };
        assert_eq!(kind.mask_bit(), Some(EventMask::ATTR_SET));
    }
}

//! Bit-mask flags carried on the wire: open flags and event masks.

use serde::{Deserialize, Serialize};

/// Flags passed to `open`, matching the wire encoding in `spec.md` §6.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenFlags(pub u32);

impl OpenFlags {
    /// Open for reading.
    pub const READ: u32 = 0x01;
    /// Open for writing.
    pub const WRITE: u32 = 0x02;
    /// Participate in locking on this node.
    pub const LOCK: u32 = 0x04;
    /// Create the node if it does not exist.
    pub const CREATE: u32 = 0x08;
    /// Combined with `CREATE`, fail if the node already exists.
    pub const EXCL: u32 = 0x10;
    /// The node is ephemeral: it is deleted when its last handle closes.
    pub const TEMP: u32 = 0x20;
    /// Atomically acquire a shared lock as part of this open. Implies `LOCK`.
    pub const LOCK_SHARED: u32 = 0x44;
    /// Atomically acquire an exclusive lock as part of this open. Implies `LOCK`.
    pub const LOCK_EXCLUSIVE: u32 = 0x84;

    /// True if the given bit(s) are set.
    #[must_use]
    pub const fn has(self, bits: u32) -> bool {
        self.0 & bits == bits
    }

    /// True if this open requests atomic lock acquisition of any mode.
    #[must_use]
    pub const fn wants_atomic_lock(self) -> bool {
        self.has(Self::LOCK_SHARED) || self.has(Self::LOCK_EXCLUSIVE)
    }
}

/// Bits identifying the kinds of events a handle wants to be notified
/// about. `lock-granted` is always delivered to the requesting handle and
/// is intentionally not representable here (see `spec.md` §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventMask(pub u32);

impl EventMask {
    /// Notify on `attr-set`.
    pub const ATTR_SET: u32 = 0x01;
    /// Notify on `attr-del`.
    pub const ATTR_DEL: u32 = 0x02;
    /// Notify on `child-added`.
    pub const CHILD_ADDED: u32 = 0x04;
    /// Notify on `child-removed`.
    pub const CHILD_REMOVED: u32 = 0x08;
    /// Notify on `lock-acquired`.
    pub const LOCK_ACQUIRED: u32 = 0x10;
    /// Notify on `lock-released`.
    pub const LOCK_RELEASED: u32 = 0x20;

    /// The empty mask: no notifications requested.
    #[must_use]
    pub const fn none() -> Self {
        Self(0)
    }

    /// True if the given bit(s) are set.
    #[must_use]
    pub const fn has(self, bits: u32) -> bool {
        self.0 & bits == bits
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_shared_implies_lock() {
        let flags = OpenFlags(OpenFlags::LOCK_SHARED);
        assert!(flags.has(OpenFlags::LOCK));
        assert!(flags.wants_atomic_lock());
    }

    #[test]
    fn lock_exclusive_implies_lock() {
        let flags = OpenFlags(OpenFlags::LOCK_EXCLUSIVE);
        assert!(flags.has(OpenFlags::LOCK));
        assert!(flags.wants_atomic_lock());
    }

    #[test]
    fn plain_write_does_not_request_a_lock() {
        let flags = OpenFlags(OpenFlags::WRITE | OpenFlags::CREATE);
        assert!(!flags.wants_atomic_lock());
    }

    #[test]
    fn event_mask_none_matches_nothing() {
        assert!(!EventMask::none().has(EventMask::ATTR_SET));
    }
}

//! The command code namespace, matching the source protocol's
//! `Protocol::COMMAND_*` constants exactly so the wire format stays
//! compatible with an unmodified `original_source` client.

/// A request command code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum CommandCode {
    /// Client keepalive datagram, also used for the server's reply.
    Keepalive = 0,
    /// First message on a new TCP connection, establishing the session.
    Handshake = 1,
    /// Open or create a node, returning a handle.
    Open = 2,
    /// Stat a node (not exposed by the CLI, kept for wire compatibility).
    Stat = 3,
    /// Cancel a pending lock request.
    Cancel = 4,
    /// Close a handle.
    Close = 5,
    /// Poison a session (force expiry), used by administrative tooling.
    Poison = 6,
    /// Create a directory node.
    Mkdir = 7,
    /// Set an extended attribute.
    AttrSet = 8,
    /// Get an extended attribute.
    AttrGet = 9,
    /// Delete an extended attribute.
    AttrDel = 10,
    /// Test whether an extended attribute exists.
    AttrExists = 11,
    /// List the extended attributes on a node.
    AttrList = 12,
    /// Test whether a node exists.
    Exists = 13,
    /// Delete (unlink) a node.
    Delete = 14,
    /// List the children of a directory node.
    Readdir = 15,
    /// Acquire a lock on a node.
    Lock = 16,
    /// Release a held or pending lock.
    Release = 17,
    /// Validate a lock sequencer against current node state.
    CheckSequencer = 18,
    /// Query server liveness and base directory generation.
    Status = 19,
}

impl CommandCode {
    /// One past the highest assigned command code.
    pub const MAX: u16 = 20;

    /// Decode a wire command id, rejecting anything outside the known set.
    #[must_use]
    pub const fn from_wire(value: u16) -> Option<Self> {
        match value {
            0 => Some(Self::Keepalive),
            1 => Some(Self::Handshake),
            2 => Some(Self::Open),
            3 => Some(Self::Stat),
            4 => Some(Self::Cancel),
            5 => Some(Self::Close),
            6 => Some(Self::Poison),
            7 => Some(Self::Mkdir),
            8 => Some(Self::AttrSet),
            9 => Some(Self::AttrGet),
            10 => Some(Self::AttrDel),
            11 => Some(Self::AttrExists),
            12 => Some(Self::AttrList),
            13 => Some(Self::Exists),
            14 => Some(Self::Delete),
            15 => Some(Self::Readdir),
            16 => Some(Self::Lock),
            17 => Some(Self::Release),
            18 => Some(Self::CheckSequencer),
            19 => Some(Self::Status),
            _ => None,
        }
    }

    /// The wire command id for this code.
    #[must_use]
    pub const fn to_wire(self) -> u16 {
        self as u16
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_code_roundtrips() {
        for raw in 0..CommandCode::MAX {
            let code = CommandCode::from_wire(raw).expect("known code");
            assert_eq!(code.to_wire(), raw);
        }
    }

    #[test]
    fn unknown_code_is_rejected() {
        assert!(CommandCode::from_wire(CommandCode::MAX).is_none());
        assert!(CommandCode::from_wire(9999).is_none());
    }
}

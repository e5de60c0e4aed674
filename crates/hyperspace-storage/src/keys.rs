//! Byte-key encoding for the node tree, handle table, session table, and
//! event table. Centralised here so every crate that touches the store
//! agrees on one layout.
//!
//! Keys sort lexicographically by design: `child_key` keys for a given
//! parent are contiguous, which lets `readdir` be a single prefix scan.

use hyperspace_core::{EventId, HandleId, NodePath, SessionId};

/// Metadata record for a node: existence, ephemeral flag, lock generation.
#[must_use]
pub fn node_key(path: &NodePath) -> Vec<u8> {
    let mut key = b"n:".to_vec();
    key.extend_from_slice(path.as_str().as_bytes());
    key
}

/// Presence marker for `child` under `parent`, used for `readdir` scans.
#[must_use]
pub fn child_key(parent: &NodePath, child: &str) -> Vec<u8> {
    let mut key = b"c:".to_vec();
    key.extend_from_slice(parent.as_str().as_bytes());
    key.push(0);
    key.extend_from_slice(child.as_bytes());
    key
}

/// Prefix matching every child marker of `parent`.
#[must_use]
pub fn child_prefix(parent: &NodePath) -> Vec<u8> {
    let mut key = b"c:".to_vec();
    key.extend_from_slice(parent.as_str().as_bytes());
    key.push(0);
    key
}

/// Extended attribute value for `name` on `path`.
#[must_use]
pub fn xattr_key(path: &NodePath, name: &str) -> Vec<u8> {
    let mut key = b"x:".to_vec();
    key.extend_from_slice(path.as_str().as_bytes());
    key.push(0);
    key.extend_from_slice(name.as_bytes());
    key
}

/// Prefix matching every attribute stored on `path`, for `attr-list`.
#[must_use]
pub fn xattr_prefix(path: &NodePath) -> Vec<u8> {
    let mut key = b"x:".to_vec();
    key.extend_from_slice(path.as_str().as_bytes());
    key.push(0);
    key
}

/// Handle record.
#[must_use]
pub fn handle_key(id: HandleId) -> Vec<u8> {
    let mut key = b"h:".to_vec();
    key.extend_from_slice(&id.get().to_be_bytes());
    key
}

/// Prefix matching every handle record, for crash-recovery scans.
pub const HANDLE_PREFIX: &[u8] = b"h:";

/// Session record.
#[must_use]
pub fn session_key(id: SessionId) -> Vec<u8> {
    let mut key = b"s:".to_vec();
    key.extend_from_slice(&id.get().to_be_bytes());
    key
}

/// Prefix matching every session record, for crash-recovery scans.
pub const SESSION_PREFIX: &[u8] = b"s:";

/// Event record, including its outstanding recipient-acknowledgement count.
#[must_use]
pub fn event_key(id: EventId) -> Vec<u8> {
    let mut key = b"e:".to_vec();
    key.extend_from_slice(&id.get().to_be_bytes());
    key
}

/// Monotonic counter used to allocate session ids.
pub const COUNTER_SESSION: &[u8] = b"ctr:session";
/// Monotonic counter used to allocate handle ids.
pub const COUNTER_HANDLE: &[u8] = b"ctr:handle";
/// Monotonic counter used to allocate event ids.
pub const COUNTER_EVENT: &[u8] = b"ctr:event";
/// Base-directory generation counter, exposed as an xattr on
/// `/hyperspace/metadata` per `spec.md` §6.
pub const META_GENERATION: &[u8] = b"meta:generation";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn child_keys_share_their_parents_prefix() {
        let parent = NodePath::parse("/test").unwrap();
        let key = child_key(&parent, "a");
        assert!(key.starts_with(&child_prefix(&parent)));
    }

    #[test]
    fn distinct_children_produce_distinct_keys() {
        let parent = NodePath::parse("/test").unwrap();
        assert_ne!(child_key(&parent, "a"), child_key(&parent, "b"));
    }
}

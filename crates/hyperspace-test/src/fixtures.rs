//! Store, node, and session fixtures shared across `hyperspace-*` test
//! suites.

use hyperspace_core::{EventMask, HandleId, OpenFlags, SessionId};
use hyperspace_namespace::node::NodeRecord;
use hyperspace_storage::Store;

/// Open a fresh in-memory [`Store`] with no content at all — not even the
/// root node. Most tests want [`root_initialized_store`] instead.
///
/// # Panics
///
/// Panics if the ephemeral store cannot be opened (e.g. the temp
/// directory is unwritable), which would indicate a broken test
/// environment rather than a test failure to report normally.
#[must_use]
pub fn empty_store() -> Store {
    Store::open_ephemeral_for_tests().expect("failed to open ephemeral test store")
}

/// Open a fresh in-memory [`Store`] with the root node (`/`) created, the
/// baseline every namespace operation other than `mkdir /` assumes.
///
/// # Panics
///
/// Panics if the store cannot be opened or the setup transaction cannot
/// commit.
#[must_use]
pub fn root_initialized_store() -> Store {
    let store = empty_store();
    let mut txn = store.begin().expect("failed to begin setup transaction");
    hyperspace_namespace::node::put_node(
        &mut txn,
        &hyperspace_core::NodePath::root(),
        &NodeRecord::new(false, chrono::Utc::now()),
    )
    .expect("failed to create root node");
    txn.commit().expect("failed to commit setup transaction");
    store
}

/// A session id for test fixtures, distinguishable by the small integer
/// passed in (`test_session(1)`, `test_session(2)`, ...).
#[must_use]
pub fn test_session(n: u64) -> SessionId {
    SessionId::new(n)
}

/// Open flags for a plain read-only, non-locking open.
#[must_use]
pub fn read_only_flags() -> OpenFlags {
    OpenFlags(OpenFlags::READ)
}

/// Open flags for a read/write open that creates the node if missing.
#[must_use]
pub fn read_write_create_flags() -> OpenFlags {
    OpenFlags(OpenFlags::READ | OpenFlags::WRITE | OpenFlags::CREATE)
}

/// Open flags for a read/write/lock open that creates the node if
/// missing — the shape used by most lock-manager scenario tests.
#[must_use]
pub fn lockable_flags() -> OpenFlags {
    OpenFlags(OpenFlags::READ | OpenFlags::WRITE | OpenFlags::LOCK | OpenFlags::CREATE)
}

/// An event mask with every bit set, for tests that want a handle to
/// observe all event kinds.
#[must_use]
pub fn all_events_mask() -> EventMask {
    EventMask(
        EventMask::ATTR_SET
            | EventMask::ATTR_DEL
            | EventMask::CHILD_ADDED
            | EventMask::CHILD_REMOVED
            | EventMask::LOCK_ACQUIRED
            | EventMask::LOCK_RELEASED,
    )
}

/// Open `path` under `session` with `flags`/`event_mask` in its own
/// transaction, committing before returning the new handle id.
///
/// # Panics
///
/// Panics if the transaction fails to begin, the open itself fails (e.g.
/// because `path`'s parent doesn't exist), or the transaction fails to
/// commit.
#[must_use]
pub fn open_handle(
    store: &Store,
    session: SessionId,
    path: &hyperspace_core::NodePath,
    flags: OpenFlags,
    event_mask: EventMask,
) -> HandleId {
    let mut txn = store.begin().expect("failed to begin open transaction");
    let result = hyperspace_namespace::open(&mut txn, session, path, flags, event_mask, &[])
        .expect("failed to open test handle");
    txn.commit().expect("failed to commit open transaction");
    result.handle
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_initialized_store_has_root() {
        let store = root_initialized_store();
        let mut txn = store.begin().unwrap();
        assert!(hyperspace_namespace::exists(&mut txn, &hyperspace_core::NodePath::root()).unwrap());
    }

    #[test]
    fn open_handle_returns_a_usable_handle() {
        let store = root_initialized_store();
        let path = hyperspace_core::NodePath::parse("/x").unwrap();
        let handle =
            open_handle(&store, test_session(1), &path, read_write_create_flags(), EventMask::none());
        let mut txn = store.begin().unwrap();
        assert!(hyperspace_namespace::handle::get_handle(&mut txn, handle).unwrap().is_some());
    }
}

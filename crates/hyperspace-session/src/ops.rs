//! Namespace operations composed with the event emission `spec.md` §4.2
//! describes alongside them (`mkdir`/`unlink` emit `child-added`/
//! `child-removed` on the parent; `open` optionally takes an atomic lock;
//! `attr_set`/`attr_del` emit `attr-set`/`attr-del`).
//!
//! `hyperspace-namespace`'s own `mkdir`/`unlink`/`attr_set`/`attr_del` are
//! pure state primitives with no event dependency, so this composition
//! lives here rather than there — this crate is the first in the
//! dependency order that depends on both `hyperspace-namespace` and
//! `hyperspace-lock`/`hyperspace-events` together.

use hyperspace_core::{
    EventKind, EventMask, HandleId, HyperspaceError, HyperspaceResult, LockMode, LockSequencer,
    LockStatus, NodePath, OpenFlags, SessionId,
};
use hyperspace_events::EventDispatcher;
use hyperspace_namespace::node::NodeRecord;
use hyperspace_namespace::ops::OpenResult;
use hyperspace_storage::Transaction;

fn mask_gated_recipients(
    txn: &mut Transaction<'_>,
    record: &NodeRecord,
    mask_bit: u32,
) -> HyperspaceResult<Vec<HandleId>> {
    let mut recipients = Vec::new();
    for &handle_id in &record.open_handles {
        if let Some(handle) = hyperspace_namespace::handle::get_handle(txn, handle_id)? {
            if handle.event_mask.has(mask_bit) {
                recipients.push(handle_id);
            }
        }
    }
    Ok(recipients)
}

fn emit_on_parent(
    txn: &mut Transaction<'_>,
    dispatcher: &EventDispatcher,
    parent: &NodePath,
    mask_bit: u32,
    kind: EventKind,
) -> HyperspaceResult<()> {
    let Some(record) = hyperspace_namespace::node::get_node(txn, parent)? else { return Ok(()) };
    let recipients = mask_gated_recipients(txn, &record, mask_bit)?;
    let event = dispatcher.record(txn, kind, &recipients, chrono::Utc::now())?;
    dispatcher.dispatch(event, recipients);
    Ok(())
}

/// `mkdir`, emitting `child-added` on the parent (`spec.md` §4.2).
///
/// # Errors
///
/// As [`hyperspace_namespace::mkdir`].
pub fn mkdir_with_events(
    txn: &mut Transaction<'_>,
    dispatcher: &EventDispatcher,
    path: &NodePath,
) -> HyperspaceResult<()> {
    hyperspace_namespace::mkdir(txn, path)?;
    if let Some((parent, name)) = path.split_parent() {
        emit_on_parent(
            txn,
            dispatcher,
            &parent,
            EventMask::CHILD_ADDED,
            EventKind::ChildAdded { name: name.to_owned() },
        )?;
    }
    Ok(())
}

/// `unlink`, emitting `child-removed` on the parent (`spec.md` §4.2).
///
/// # Errors
///
/// As [`hyperspace_namespace::unlink`].
pub fn unlink_with_events(
    txn: &mut Transaction<'_>,
    dispatcher: &EventDispatcher,
    path: &NodePath,
) -> HyperspaceResult<()> {
    let parent_and_name = path.split_parent();
    hyperspace_namespace::unlink(txn, path)?;
    if let Some((parent, name)) = parent_and_name {
        emit_on_parent(
            txn,
            dispatcher,
            &parent,
            EventMask::CHILD_REMOVED,
            EventKind::ChildRemoved { name: name.to_owned() },
        )?;
    }
    Ok(())
}

/// `open`, optionally taking an atomic lock in the same transaction when
/// `flags` requests `lock-shared`/`lock-exclusive` (non-blocking: a
/// conflict surfaces as [`HyperspaceError::LockConflict`] rather than
/// enqueuing a waiter, since there is no blocking concept at `open` time).
///
/// # Errors
///
/// As [`hyperspace_namespace::open`], plus [`HyperspaceError::LockConflict`]
/// if an atomic lock was requested and is currently held incompatibly.
pub fn open_with_events(
    txn: &mut Transaction<'_>,
    dispatcher: &EventDispatcher,
    session: SessionId,
    path: &NodePath,
    flags: OpenFlags,
    event_mask: EventMask,
    initial_attrs: &[(String, Vec<u8>)],
) -> HyperspaceResult<(OpenResult, Option<LockSequencer>)> {
    let parent_and_name = path.split_parent();
    let result = hyperspace_namespace::open(txn, session, path, flags, event_mask, initial_attrs)?;

    if result.created {
        if let Some((parent, name)) = &parent_and_name {
            emit_on_parent(
                txn,
                dispatcher,
                parent,
                EventMask::CHILD_ADDED,
                EventKind::ChildAdded { name: (*name).to_owned() },
            )?;
        }
    }

    let sequencer = if flags.wants_atomic_lock() {
        let mode =
            if flags.has(OpenFlags::LOCK_EXCLUSIVE) { LockMode::Exclusive } else { LockMode::Shared };
        let (status, sequencer) =
            hyperspace_lock::lock_in_txn(txn, dispatcher, result.handle, mode, true)?;
        match status {
            LockStatus::Granted => sequencer,
            LockStatus::Busy => {
                return Err(HyperspaceError::LockConflict(path.to_string()));
            }
            LockStatus::Pending | LockStatus::Cancelled => {
                unreachable!("try_lock never returns pending/cancelled")
            }
        }
    } else {
        None
    };

    Ok((result, sequencer))
}

/// `attr_set` through a handle, emitting `attr-set` on the handle's node.
///
/// # Errors
///
/// Returns [`HyperspaceError::InvalidHandle`] if `handle_id` is unknown,
/// or as [`hyperspace_namespace::attr::attr_set`] otherwise.
pub fn attr_set_with_events(
    txn: &mut Transaction<'_>,
    dispatcher: &EventDispatcher,
    handle_id: HandleId,
    name: &str,
    value: &[u8],
) -> HyperspaceResult<()> {
    let handle = hyperspace_namespace::handle::get_handle(txn, handle_id)?
        .ok_or(HyperspaceError::InvalidHandle(handle_id.get()))?;
    hyperspace_namespace::attr::attr_set(txn, &handle.node, name, value)?;
    emit_on_parent(
        txn,
        dispatcher,
        &handle.node,
        EventMask::ATTR_SET,
        EventKind::AttrSet { name: name.to_owned() },
    )?;
    Ok(())
}

/// `attr_del` through a handle, emitting `attr-del` on the handle's node.
///
/// # Errors
///
/// Returns [`HyperspaceError::InvalidHandle`] if `handle_id` is unknown,
/// or as [`hyperspace_namespace::attr::attr_del`] otherwise.
pub fn attr_del_with_events(
    txn: &mut Transaction<'_>,
    dispatcher: &EventDispatcher,
    handle_id: HandleId,
    name: &str,
) -> HyperspaceResult<()> {
    let handle = hyperspace_namespace::handle::get_handle(txn, handle_id)?
        .ok_or(HyperspaceError::InvalidHandle(handle_id.get()))?;
    hyperspace_namespace::attr::attr_del(txn, &handle.node, name)?;
    emit_on_parent(
        txn,
        dispatcher,
        &handle.node,
        EventMask::ATTR_DEL,
        EventKind::AttrDel { name: name.to_owned() },
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use hyperspace_storage::Store;

    fn setup() -> Store {
        let store = Store::open_ephemeral_for_tests().unwrap();
        let mut txn = store.begin().unwrap();
        hyperspace_namespace::node::put_node(
            &mut txn,
            &NodePath::root(),
            &NodeRecord::new(false, chrono::Utc::now()),
        )
        .unwrap();
        txn.commit().unwrap();
        store
    }

    #[tokio::test]
    async fn mkdir_emits_child_added_to_an_interested_parent_handle() {
        let store = setup();
        let dispatcher = EventDispatcher::new();
        let mut rx = dispatcher.subscribe();

        let mut txn = store.begin().unwrap();
        let parent_handle = hyperspace_namespace::open(
            &mut txn,
            SessionId::new(1),
            &NodePath::root(),
            OpenFlags(OpenFlags::READ),
            EventMask(EventMask::CHILD_ADDED),
            &[],
        )
        .unwrap()
        .handle;
        txn.commit().unwrap();

        let mut txn = store.begin().unwrap();
        mkdir_with_events(&mut txn, &dispatcher, &NodePath::parse("/child").unwrap()).unwrap();
        txn.commit().unwrap();

        let dispatched = rx.recv().await.unwrap();
        assert_eq!(dispatched.recipients, vec![parent_handle]);
        assert!(matches!(dispatched.event.kind, EventKind::ChildAdded { .. }));
    }

    #[test]
    fn atomic_open_lock_conflict_surfaces_as_lock_conflict() {
        let store = setup();
        let dispatcher = EventDispatcher::new();
        let path = NodePath::parse("/l").unwrap();
        let lock_flags = OpenFlags(
            OpenFlags::READ | OpenFlags::WRITE | OpenFlags::CREATE | OpenFlags::LOCK_EXCLUSIVE,
        );

        let mut txn = store.begin().unwrap();
        open_with_events(
            &mut txn,
            &dispatcher,
            SessionId::new(1),
            &path,
            lock_flags,
            EventMask::none(),
            &[],
        )
        .unwrap();

        let second = open_with_events(
            &mut txn,
            &dispatcher,
            SessionId::new(2),
            &path,
            lock_flags,
            EventMask::none(),
            &[],
        );
        assert!(matches!(second, Err(HyperspaceError::LockConflict(_))));
    }

    #[test]
    fn attr_set_emits_attr_set_to_an_interested_handle() {
        let store = setup();
        let dispatcher = EventDispatcher::new();
        let path = NodePath::parse("/foo").unwrap();

        let mut txn = store.begin().unwrap();
        let handle = hyperspace_namespace::open(
            &mut txn,
            SessionId::new(1),
            &path,
            OpenFlags(OpenFlags::READ | OpenFlags::WRITE | OpenFlags::CREATE),
            EventMask(EventMask::ATTR_SET),
            &[],
        )
        .unwrap()
        .handle;
        attr_set_with_events(&mut txn, &dispatcher, handle, "name", b"Doug Judd").unwrap();
        let value = hyperspace_namespace::attr::attr_get(&mut txn, &path, "name").unwrap();
        assert_eq!(value, Some(b"Doug Judd".to_vec()));
    }
}

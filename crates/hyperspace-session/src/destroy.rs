//! Handle destruction: the four-transaction algorithm from `spec.md`
//! §4.2, shared by the explicit `close` request and by session-expiry
//! cascades in [`crate::manager::SessionManager::tick`].
//!
//! Each step runs in its own transaction so no single transaction holds
//! a node-level lock for long; correctness relies on step 1 removing the
//! holder from the node record, so a concurrent second call for the same
//! handle is a no-op at every later step.

use hyperspace_core::{EventKind, EventMask, HandleId, HyperspaceResult, NodePath, SessionId};
use hyperspace_events::EventDispatcher;
use hyperspace_namespace::node::NodeRecord;
use hyperspace_storage::{with_retry, Store, Transaction};

/// Recipients for a `child-added`/`child-removed` event on `parent`:
/// every handle currently open on it whose mask contains the bit.
fn mask_gated_recipients(
    txn: &mut Transaction<'_>,
    parent: &NodeRecord,
    mask_bit: u32,
) -> HyperspaceResult<Vec<HandleId>> {
    let mut recipients = Vec::new();
    for &handle_id in &parent.open_handles {
        if let Some(handle) = hyperspace_namespace::handle::get_handle(txn, handle_id)? {
            if handle.event_mask.has(mask_bit) {
                recipients.push(handle_id);
            }
        }
    }
    Ok(recipients)
}

fn emit_child_removed(
    txn: &mut Transaction<'_>,
    dispatcher: &EventDispatcher,
    parent: &NodePath,
    name: &str,
) -> HyperspaceResult<()> {
    let Some(record) = hyperspace_namespace::node::get_node(txn, parent)? else { return Ok(()) };
    let recipients = mask_gated_recipients(txn, &record, EventMask::CHILD_REMOVED)?;
    let event = dispatcher.record(
        txn,
        EventKind::ChildRemoved { name: name.to_owned() },
        &recipients,
        chrono::Utc::now(),
    )?;
    dispatcher.dispatch(event, recipients);
    Ok(())
}

/// Destroy `handle_id`: release its lock, wake waiters, clean up an
/// ephemeral node left unreferenced, and delete the handle record.
/// Idempotent — calling this twice for the same handle is safe.
///
/// `session` is passed through only to keep the session->handle index
/// consistent on the final delete; omit it (`None`) if the caller no
/// longer knows it (the index entry is then left dangling harmlessly,
/// since [`hyperspace_namespace::handle::list_session_handles`] re-checks
/// the handle record before trusting an index hit).
///
/// # Errors
///
/// Returns an [`hyperspace_core::HyperspaceError`] if a transaction fails
/// after exhausting its retries, or if the handle does not exist (a
/// no-op path, not actually reached since every step tolerates a missing
/// handle/node).
pub fn destroy_handle(
    store: &Store,
    dispatcher: &EventDispatcher,
    handle_id: HandleId,
    session: Option<SessionId>,
) -> HyperspaceResult<()> {
    // Step 0: read the node path while the handle record still exists.
    // Steps 1-3 need it but the handle is only deleted in step 4.
    let node_path = {
        let mut txn = store.begin()?;
        let path = hyperspace_namespace::handle::get_handle(&mut txn, handle_id)?
            .map(|record| record.node);
        txn.commit()?;
        let Some(path) = path else { return Ok(()) };
        path
    };

    // Step 1: release the lock (if held), cancel any pending request,
    // and detach from the node's open-handle set.
    with_retry(|| {
        let mut txn = store.begin()?;
        hyperspace_lock::release_in_txn(&mut txn, dispatcher, handle_id, false)?;
        hyperspace_lock::cancel_pending_in_txn(&mut txn, handle_id)?;
        hyperspace_namespace::detach_handle_from_node(&mut txn, &node_path, handle_id)?;
        txn.commit()?;
        Ok(())
    })?;

    // Step 2: wake the next eligible waiter(s), if any.
    with_retry(|| {
        let mut txn = store.begin()?;
        hyperspace_lock::grant_pending_in_txn(&mut txn, dispatcher, &node_path)?;
        txn.commit()?;
        Ok(())
    })?;

    // Step 3: if the node is ephemeral and now unreferenced, delete it
    // and tell its parent.
    with_retry(|| {
        let mut txn = store.begin()?;
        let parent = hyperspace_namespace::cleanup_if_unreferenced_ephemeral(&mut txn, &node_path)?;
        if let Some(parent) = &parent {
            if let Some((_, name)) = node_path.split_parent() {
                emit_child_removed(&mut txn, dispatcher, parent, name)?;
            }
        }
        txn.commit()?;
        Ok(())
    })?;

    // Step 4: delete the handle record itself.
    with_retry(|| {
        let mut txn = store.begin()?;
        hyperspace_namespace::handle::delete_handle(&mut txn, handle_id, session)?;
        txn.commit()?;
        Ok(())
    })?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use hyperspace_core::{EventMask as CoreEventMask, OpenFlags};
    use hyperspace_namespace::node;
    use hyperspace_storage::Store;

    fn setup() -> Store {
        let store = Store::open_ephemeral_for_tests().unwrap();
        let mut txn = store.begin().unwrap();
        node::put_node(&mut txn, &NodePath::root(), &NodeRecord::new(false, chrono::Utc::now()))
            .unwrap();
        txn.commit().unwrap();
        store
    }

    #[test]
    fn destroying_the_last_handle_on_an_ephemeral_node_deletes_it() {
        let store = setup();
        let dispatcher = EventDispatcher::new();
        let path = NodePath::parse("/tmp").unwrap();

        let mut txn = store.begin().unwrap();
        let result = hyperspace_namespace::open(
            &mut txn,
            SessionId::new(1),
            &path,
            OpenFlags(OpenFlags::READ | OpenFlags::CREATE | OpenFlags::TEMP),
            CoreEventMask::none(),
            &[],
        )
        .unwrap();
        txn.commit().unwrap();

        destroy_handle(&store, &dispatcher, result.handle, Some(SessionId::new(1))).unwrap();

        let mut txn = store.begin().unwrap();
        assert!(hyperspace_namespace::exists(&mut txn, &path).unwrap() == false);
        assert!(hyperspace_namespace::handle::get_handle(&mut txn, result.handle)
            .unwrap()
            .is_none());
    }

    #[test]
    fn destroying_twice_is_a_no_op() {
        let store = setup();
        let dispatcher = EventDispatcher::new();
        let path = NodePath::parse("/perm").unwrap();

        let mut txn = store.begin().unwrap();
        let result = hyperspace_namespace::open(
            &mut txn,
            SessionId::new(1),
            &path,
            OpenFlags(OpenFlags::READ | OpenFlags::CREATE),
            CoreEventMask::none(),
            &[],
        )
        .unwrap();
        txn.commit().unwrap();

        destroy_handle(&store, &dispatcher, result.handle, Some(SessionId::new(1))).unwrap();
        destroy_handle(&store, &dispatcher, result.handle, Some(SessionId::new(1))).unwrap();
    }

    #[test]
    fn destroying_an_exclusive_holder_wakes_the_waiter() {
        let store = setup();
        let dispatcher = EventDispatcher::new();
        let path = NodePath::parse("/lockme").unwrap();
        let lock_flags =
            OpenFlags(OpenFlags::READ | OpenFlags::WRITE | OpenFlags::LOCK | OpenFlags::CREATE);

        let mut txn = store.begin().unwrap();
        let h1 = hyperspace_namespace::open(
            &mut txn,
            SessionId::new(1),
            &path,
            lock_flags,
            CoreEventMask::none(),
            &[],
        )
        .unwrap()
        .handle;
        let h2 = hyperspace_namespace::open(
            &mut txn,
            SessionId::new(2),
            &path,
            lock_flags,
            CoreEventMask::none(),
            &[],
        )
        .unwrap()
        .handle;
        hyperspace_lock::lock_in_txn(
            &mut txn,
            &dispatcher,
            h1,
            hyperspace_core::LockMode::Exclusive,
            true,
        )
        .unwrap();
        let (status, _) = hyperspace_lock::lock_in_txn(
            &mut txn,
            &dispatcher,
            h2,
            hyperspace_core::LockMode::Exclusive,
            false,
        )
        .unwrap();
        assert_eq!(status, hyperspace_core::LockStatus::Pending);
        txn.commit().unwrap();

        destroy_handle(&store, &dispatcher, h1, Some(SessionId::new(1))).unwrap();

        let mut txn = store.begin().unwrap();
        let record = node::get_node(&mut txn, &path).unwrap().unwrap();
        assert!(record.lock_holders.contains(&h2));
    }
}

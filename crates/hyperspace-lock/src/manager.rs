//! The lock state machine: acquire, release, grant-pending, and
//! cancellation, operating on the node records `hyperspace-namespace`
//! persists (`spec.md` §4.3).

use chrono::Utc;
use hyperspace_core::{
    EventKind, EventMask, HandleId, HyperspaceError, HyperspaceResult, LockMode, LockSequencer,
    LockStatus, NodePath, OpenFlags,
};
use hyperspace_events::EventDispatcher;
use hyperspace_namespace::node::{self, NodeRecord, Waiter};
use hyperspace_storage::Transaction;

const LOCK_GENERATION_ATTR: &str = "lock.generation";

fn require_node(txn: &mut Transaction<'_>, path: &NodePath) -> HyperspaceResult<NodeRecord> {
    node::get_node(txn, path)?.ok_or_else(|| HyperspaceError::FileNotFound(path.to_string()))
}

fn require_handle(
    txn: &mut Transaction<'_>,
    handle_id: HandleId,
) -> HyperspaceResult<hyperspace_namespace::HandleRecord> {
    hyperspace_namespace::handle::get_handle(txn, handle_id)?
        .ok_or(HyperspaceError::InvalidHandle(handle_id.get()))
}

fn persist_generation(
    txn: &mut Transaction<'_>,
    path: &NodePath,
    generation: u64,
) -> HyperspaceResult<()> {
    hyperspace_namespace::attr::attr_set(
        txn,
        path,
        LOCK_GENERATION_ATTR,
        &generation.to_be_bytes(),
    )?;
    Ok(())
}

/// Recipients for a lock event gated by an event mask bit: every open
/// handle on the node whose mask contains that bit.
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

/// Acquire a lock for `handle_id` in `mode`. The handle must have been
/// opened with both `lock` and `write` flag bits.
///
/// # Errors
///
/// Returns [`HyperspaceError::InvalidHandle`] if the handle does not
/// exist, [`HyperspaceError::ModeRestriction`] if it lacks `lock`/`write`,
/// or a [`hyperspace_storage::StorageError`]-derived error if the
/// transaction itself fails.
pub fn lock_in_txn(
    txn: &mut Transaction<'_>,
    dispatcher: &EventDispatcher,
    handle_id: HandleId,
    mode: LockMode,
    try_lock: bool,
) -> HyperspaceResult<(LockStatus, Option<LockSequencer>)> {
    let handle = require_handle(txn, handle_id)?;
    if !handle.flags.has(OpenFlags::LOCK) || !handle.flags.has(OpenFlags::WRITE) {
        return Err(HyperspaceError::ModeRestriction(format!(
            "handle {handle_id} lacks lock+write flags"
        )));
    }
    let mut record = require_node(txn, &handle.node)?;
    let previous_holders = record.lock_holders.len();

    let grant_now = match (record.lock_mode, mode) {
        (None, _) => true,
        (Some(LockMode::Shared), LockMode::Shared) => record.waiters.is_empty(),
        (Some(LockMode::Shared), LockMode::Exclusive) | (Some(LockMode::Exclusive), _) => false,
    };

    if !grant_now {
        if try_lock {
            return Ok((LockStatus::Busy, None));
        }
        record.waiters.push_back(Waiter { handle: handle_id, mode });
        node::put_node(txn, &handle.node, &record)?;
        return Ok((LockStatus::Pending, None));
    }

    record.lock_mode = Some(mode);
    record.lock_holders.insert(handle_id);
    record.lock_generation += 1;
    let generation = record.lock_generation;
    node::put_node(txn, &handle.node, &record)?;
    persist_generation(txn, &handle.node, generation)?;

    if hyperspace_events::lock_acquired_should_emit(previous_holders, record.lock_holders.len()) {
        let recipients = mask_gated_recipients(txn, &record, EventMask::LOCK_ACQUIRED)?;
        let event = dispatcher.record(txn, EventKind::LockAcquired { mode }, &recipients, Utc::now())?;
        dispatcher.dispatch(event, recipients);
    }

    Ok((
        LockStatus::Granted,
        Some(LockSequencer { node: handle.node, mode, generation }),
    ))
}

/// Release `handle_id`'s hold on its node's lock, if it holds one.
///
/// This does not grant pending waiters; call [`grant_pending_in_txn`]
/// afterwards (`spec.md` §4.2 splits these into separate transactions
/// during handle destruction; the explicit `release` RPC may run them in
/// one).
///
/// # Errors
///
/// Returns [`HyperspaceError::NotLocked`] if `require_held` is set and
/// the handle does not hold the lock, or an [`HyperspaceError`] if the
/// transaction itself fails.
pub fn release_in_txn(
    txn: &mut Transaction<'_>,
    dispatcher: &EventDispatcher,
    handle_id: HandleId,
    require_held: bool,
) -> HyperspaceResult<()> {
    let handle = require_handle(txn, handle_id)?;
    let mut record = require_node(txn, &handle.node)?;

    if !record.lock_holders.remove(&handle_id) {
        return if require_held {
            Err(HyperspaceError::NotLocked(handle_id.get()))
        } else {
            Ok(())
        };
    }

    if record.lock_holders.is_empty() {
        record.lock_mode = None;
        let recipients = mask_gated_recipients(txn, &record, EventMask::LOCK_RELEASED)?;
        node::put_node(txn, &handle.node, &record)?;
        let event = dispatcher.record(txn, EventKind::LockReleased, &recipients, Utc::now())?;
        dispatcher.dispatch(event, recipients);
    } else {
        node::put_node(txn, &handle.node, &record)?;
    }

    Ok(())
}

/// Grant the next eligible waiters on `path`: the exclusive head of the
/// queue alone, or every contiguous shared request at the head
/// (`spec.md` §4.2, §4.3).
///
/// No-op if the lock is still held or there are no waiters.
///
/// # Errors
///
/// Returns an [`HyperspaceError`] if the transaction itself fails.
pub fn grant_pending_in_txn(
    txn: &mut Transaction<'_>,
    dispatcher: &EventDispatcher,
    path: &NodePath,
) -> HyperspaceResult<()> {
    let mut record = require_node(txn, path)?;
    if record.lock_mode.is_some() || record.waiters.is_empty() {
        return Ok(());
    }

    let head_mode = record.waiters.front().expect("checked non-empty").mode;
    let mut granted = Vec::new();
    match head_mode {
        LockMode::Exclusive => {
            granted.push(record.waiters.pop_front().expect("checked non-empty"));
        }
        LockMode::Shared => {
            while matches!(record.waiters.front(), Some(w) if w.mode == LockMode::Shared) {
                granted.push(record.waiters.pop_front().expect("checked above"));
            }
        }
    }
    if granted.is_empty() {
        return Ok(());
    }

    let previous_holders = record.lock_holders.len();
    record.lock_mode = Some(head_mode);
    record.lock_generation += 1;
    let generation = record.lock_generation;
    for waiter in &granted {
        record.lock_holders.insert(waiter.handle);
    }
    node::put_node(txn, path, &record)?;
    persist_generation(txn, path, generation)?;

    for waiter in &granted {
        let event = dispatcher.record(
            txn,
            EventKind::LockGranted { mode: waiter.mode, generation },
            &[waiter.handle],
            Utc::now(),
        )?;
        dispatcher.dispatch(event, vec![waiter.handle]);
    }

    if hyperspace_events::lock_acquired_should_emit(previous_holders, record.lock_holders.len()) {
        let recipients = mask_gated_recipients(txn, &record, EventMask::LOCK_ACQUIRED)?;
        let event =
            dispatcher.record(txn, EventKind::LockAcquired { mode: head_mode }, &recipients, Utc::now())?;
        dispatcher.dispatch(event, recipients);
    }

    Ok(())
}

/// Remove `handle_id`'s queued request from its node's waiter list, if
/// any. Used when a handle with a pending lock request closes
/// (`spec.md` §4.3: "pending-request cancellation").
///
/// # Errors
///
/// Returns an [`HyperspaceError`] if the transaction itself fails.
pub fn cancel_pending_in_txn(
    txn: &mut Transaction<'_>,
    handle_id: HandleId,
) -> HyperspaceResult<()> {
    let handle = require_handle(txn, handle_id)?;
    let mut record = require_node(txn, &handle.node)?;
    let before = record.waiters.len();
    record.waiters.retain(|w| w.handle != handle_id);
    if record.waiters.len() != before {
        node::put_node(txn, &handle.node, &record)?;
    }
    Ok(())
}

/// Validate that `sequencer` still describes the current state of its
/// node: the node exists, is held in the claimed mode, and is at exactly
/// the claimed generation.
///
/// # Errors
///
/// Returns an [`HyperspaceError`] only if the transaction itself fails.
pub fn check_sequencer_in_txn(
    txn: &mut Transaction<'_>,
    sequencer: &LockSequencer,
) -> HyperspaceResult<bool> {
    let Some(record) = node::get_node(txn, &sequencer.node)? else { return Ok(false) };
    Ok(record.lock_mode == Some(sequencer.mode) && record.lock_generation == sequencer.generation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hyperspace_core::{EventMask as CoreEventMask, SessionId};
    use hyperspace_storage::Store;

    fn open_lockable(
        txn: &mut Transaction<'_>,
        path: &NodePath,
        session: u64,
    ) -> HandleId {
        hyperspace_namespace::open(
            txn,
            SessionId::new(session),
            path,
            OpenFlags(OpenFlags::READ | OpenFlags::WRITE | OpenFlags::LOCK | OpenFlags::CREATE),
            CoreEventMask::none(),
            &[],
        )
        .unwrap()
        .handle
    }

    fn setup() -> (Store, NodePath) {
        let store = Store::open_ephemeral_for_tests().unwrap();
        let root = NodePath::root();
        let mut txn = store.begin().unwrap();
        node::put_node(&mut txn, &root, &NodeRecord::new(false, Utc::now())).unwrap();
        let path = NodePath::parse("/lockme").unwrap();
        txn.commit().unwrap();
        (store, path)
    }

    #[test]
    fn exclusive_then_conflicting_exclusive_is_busy() {
        let (store, path) = setup();
        let dispatcher = EventDispatcher::new();
        let mut txn = store.begin().unwrap();
        let h1 = open_lockable(&mut txn, &path, 1);
        let h2 = open_lockable(&mut txn, &path, 2);

        let (status, sequencer) =
            lock_in_txn(&mut txn, &dispatcher, h1, LockMode::Exclusive, true).unwrap();
        assert_eq!(status, LockStatus::Granted);
        assert_eq!(sequencer.unwrap().generation, 1);

        let (status, _) = lock_in_txn(&mut txn, &dispatcher, h2, LockMode::Exclusive, true).unwrap();
        assert_eq!(status, LockStatus::Busy);
    }

    #[test]
    fn shared_locks_stack_while_queue_is_empty() {
        let (store, path) = setup();
        let dispatcher = EventDispatcher::new();
        let mut txn = store.begin().unwrap();
        let h1 = open_lockable(&mut txn, &path, 1);
        let h2 = open_lockable(&mut txn, &path, 2);

        let (status1, _) = lock_in_txn(&mut txn, &dispatcher, h1, LockMode::Shared, true).unwrap();
        let (status2, _) = lock_in_txn(&mut txn, &dispatcher, h2, LockMode::Shared, true).unwrap();
        assert_eq!(status1, LockStatus::Granted);
        assert_eq!(status2, LockStatus::Granted);
    }

    #[test]
    fn release_then_grant_pending_wakes_the_exclusive_waiter() {
        let (store, path) = setup();
        let dispatcher = EventDispatcher::new();
        let mut txn = store.begin().unwrap();
        let h1 = open_lockable(&mut txn, &path, 1);
        let h2 = open_lockable(&mut txn, &path, 2);

        lock_in_txn(&mut txn, &dispatcher, h1, LockMode::Exclusive, true).unwrap();
        let (status, _) = lock_in_txn(&mut txn, &dispatcher, h2, LockMode::Exclusive, false).unwrap();
        assert_eq!(status, LockStatus::Pending);

        release_in_txn(&mut txn, &dispatcher, h1, true).unwrap();
        grant_pending_in_txn(&mut txn, &dispatcher, &path).unwrap();

        let record = node::get_node(&mut txn, &path).unwrap().unwrap();
        assert!(record.lock_holders.contains(&h2));
        assert_eq!(record.lock_generation, 2);
    }

    #[test]
    fn check_sequencer_rejects_a_stale_generation() {
        let (store, path) = setup();
        let dispatcher = EventDispatcher::new();
        let mut txn = store.begin().unwrap();
        let h1 = open_lockable(&mut txn, &path, 1);
        let (_, sequencer) =
            lock_in_txn(&mut txn, &dispatcher, h1, LockMode::Exclusive, true).unwrap();
        let sequencer = sequencer.unwrap();
        assert!(check_sequencer_in_txn(&mut txn, &sequencer).unwrap());

        release_in_txn(&mut txn, &dispatcher, h1, true).unwrap();
        let h2 = open_lockable(&mut txn, &path, 2);
        lock_in_txn(&mut txn, &dispatcher, h2, LockMode::Exclusive, true).unwrap();

        assert!(!check_sequencer_in_txn(&mut txn, &sequencer).unwrap());
    }
}

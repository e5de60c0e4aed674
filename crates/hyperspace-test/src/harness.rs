//! An end-to-end scenario harness wiring storage, events, lock, namespace,
//! and session management together the way `hyperspace-server` does, for
//! exercising the scenarios of `spec.md` §8 (S1-S6) without a running
//! daemon or real sockets.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use hyperspace_core::{
    EventMask, HandleId, HyperspaceResult, LockMode, LockSequencer, LockStatus, NodePath,
    OpenFlags, SessionId,
};
use hyperspace_events::EventDispatcher;
use hyperspace_namespace::node::NodeRecord;
use hyperspace_namespace::ops::OpenResult;
use hyperspace_session::SessionManager;
use hyperspace_storage::{Store, with_retry};

/// A test-only socket address for sessions that don't exercise real
/// networking.
#[must_use]
pub fn loopback_addr() -> SocketAddr {
    "127.0.0.1:0".parse().expect("loopback address literal is valid")
}

/// Wires a [`Store`], [`EventDispatcher`], and [`SessionManager`] together
/// over a root-initialized in-memory store, exposing the composed
/// namespace/lock/session operations as single-call, transaction-managing
/// methods.
pub struct Harness {
    /// The underlying store, exposed for tests that need to drop to raw
    /// transactions.
    pub store: Arc<Store>,
    /// The event dispatcher shared by every operation below.
    pub dispatcher: EventDispatcher,
    /// The session manager, configured with `lease_interval`.
    pub sessions: SessionManager,
}

impl Harness {
    /// Build a harness with the given lease interval (`spec.md`
    /// `Hyperspace.Lease.Interval`).
    ///
    /// # Panics
    ///
    /// Panics if the store cannot be opened or the root-node setup
    /// transaction fails to commit.
    #[must_use]
    pub fn with_lease_interval(lease_interval: Duration) -> Self {
        let store = Arc::new(Store::open_ephemeral_for_tests().expect("failed to open test store"));
        {
            let mut txn = store.begin().expect("failed to begin setup transaction");
            hyperspace_namespace::node::put_node(
                &mut txn,
                &NodePath::root(),
                &NodeRecord::new(false, chrono::Utc::now()),
            )
            .expect("failed to create root node");
            txn.commit().expect("failed to commit setup transaction");
        }
        let dispatcher = EventDispatcher::new();
        let sessions = SessionManager::new(Arc::clone(&store), dispatcher.clone(), lease_interval);
        Self { store, dispatcher, sessions }
    }

    /// Build a harness with `spec.md`'s default lease interval (12s).
    #[must_use]
    pub fn new() -> Self {
        Self::with_lease_interval(Duration::from_secs(12))
    }

    /// Create a session from [`loopback_addr`].
    ///
    /// # Errors
    ///
    /// As [`SessionManager::create_session`].
    pub fn create_session(&self) -> HyperspaceResult<SessionId> {
        self.sessions.create_session(loopback_addr())
    }

    /// `mkdir`, in its own retried transaction.
    ///
    /// # Errors
    ///
    /// As [`hyperspace_session::mkdir_with_events`].
    pub fn mkdir(&self, path: &NodePath) -> HyperspaceResult<()> {
        with_retry(|| {
            let mut txn = self.store.begin()?;
            hyperspace_session::mkdir_with_events(&mut txn, &self.dispatcher, path)?;
            txn.commit()?;
            Ok(())
        })
    }

    /// `open`, in its own retried transaction.
    ///
    /// # Errors
    ///
    /// As [`hyperspace_session::open_with_events`].
    pub fn open(
        &self,
        session: SessionId,
        path: &NodePath,
        flags: OpenFlags,
        event_mask: EventMask,
    ) -> HyperspaceResult<(OpenResult, Option<LockSequencer>)> {
        with_retry(|| {
            let mut txn = self.store.begin()?;
            let result = hyperspace_session::open_with_events(
                &mut txn,
                &self.dispatcher,
                session,
                path,
                flags,
                event_mask,
                &[],
            )?;
            txn.commit()?;
            Ok(result)
        })
    }

    /// `lock`, in its own retried transaction.
    ///
    /// # Errors
    ///
    /// As [`hyperspace_lock::lock_in_txn`].
    pub fn lock(
        &self,
        handle: HandleId,
        mode: LockMode,
        try_lock: bool,
    ) -> HyperspaceResult<(LockStatus, Option<LockSequencer>)> {
        with_retry(|| {
            let mut txn = self.store.begin()?;
            let result = hyperspace_lock::lock_in_txn(&mut txn, &self.dispatcher, handle, mode, try_lock)?;
            txn.commit()?;
            Ok(result)
        })
    }

    /// `release`, in its own retried transaction, then grants any pending
    /// waiter on the same node.
    ///
    /// # Errors
    ///
    /// As [`hyperspace_lock::release_in_txn`] or
    /// [`hyperspace_lock::grant_pending_in_txn`].
    pub fn release(&self, handle: HandleId, node: &NodePath) -> HyperspaceResult<()> {
        with_retry(|| {
            let mut txn = self.store.begin()?;
            hyperspace_lock::release_in_txn(&mut txn, &self.dispatcher, handle, true)?;
            txn.commit()?;
            Ok(())
        })?;
        with_retry(|| {
            let mut txn = self.store.begin()?;
            hyperspace_lock::grant_pending_in_txn(&mut txn, &self.dispatcher, node)?;
            txn.commit()?;
            Ok(())
        })
    }

    /// `close`: the four-transaction handle-destruction algorithm.
    ///
    /// # Errors
    ///
    /// As [`hyperspace_session::destroy_handle`].
    pub fn close(&self, handle: HandleId, session: SessionId) -> HyperspaceResult<()> {
        hyperspace_session::destroy_handle(&self.store, &self.dispatcher, handle, Some(session))
    }
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exclusive_lock_handover_bumps_generation() {
        // spec.md S3: exclusive lock handover.
        let harness = Harness::new();
        let path = NodePath::parse("/l").unwrap();
        let lock_flags = OpenFlags(
            OpenFlags::READ | OpenFlags::WRITE | OpenFlags::LOCK | OpenFlags::CREATE,
        );

        let session_a = harness.create_session().unwrap();
        let (opened_a, _) = harness.open(session_a, &path, lock_flags, EventMask::none()).unwrap();
        let (status_a, seq_a) = harness.lock(opened_a.handle, LockMode::Exclusive, true).unwrap();
        assert_eq!(status_a, LockStatus::Granted);
        let generation_a = seq_a.unwrap().generation;

        let session_b = harness.create_session().unwrap();
        let (opened_b, _) = harness.open(session_b, &path, lock_flags, EventMask::none()).unwrap();
        let (status_b, _) = harness.lock(opened_b.handle, LockMode::Exclusive, false).unwrap();
        assert_eq!(status_b, LockStatus::Pending);

        harness.release(opened_a.handle, &path).unwrap();

        let mut txn = harness.store.begin().unwrap();
        let node = hyperspace_namespace::node::get_node(&mut txn, &path).unwrap().unwrap();
        assert!(node.lock_holders.contains(&opened_b.handle));
        assert!(node.lock_generation > generation_a);
    }
}

//! Shared server state: the handle every connection task and the
//! keepalive reactor reaches into to touch the store, the session
//! manager, and the event bus.

use std::sync::Arc;

use dashmap::DashMap;
use hyperspace_config::Config;
use hyperspace_core::SessionId;
use hyperspace_events::EventDispatcher;
use hyperspace_session::SessionManager;
use hyperspace_storage::Store;
use tokio::sync::{Mutex, Semaphore};

/// Everything a request dispatch needs, cloned cheaply into each
/// connection task.
///
/// The original service ran a fixed pool of worker threads, each owning
/// a slice of the session space by `thread_group`. Here a single tokio
/// runtime plays that role: [`ServerState::group_lock`] reproduces the
/// "one session's requests execute one at a time, in order" guarantee
/// by handing out a per-session mutex, and [`ServerState::worker_permits`]
/// reproduces the pool's bounded concurrency.
#[derive(Clone)]
pub struct ServerState {
    /// The transactional node/lock/session store.
    pub store: Arc<Store>,
    /// Publishes notifications to session keepalive loops.
    pub dispatcher: EventDispatcher,
    /// In-memory session table and lease bookkeeping.
    pub sessions: Arc<SessionManager>,
    /// Resolved server configuration.
    pub config: Arc<Config>,
    /// Per-session serialization lock, created lazily on first use.
    group_locks: Arc<DashMap<u64, Arc<Mutex<()>>>>,
    /// Bounds total concurrent request dispatch across all sessions,
    /// standing in for the original fixed-size worker pool.
    worker_permits: Arc<Semaphore>,
}

impl ServerState {
    /// Build server state from its constituent parts.
    #[must_use]
    pub fn new(
        store: Arc<Store>,
        dispatcher: EventDispatcher,
        sessions: Arc<SessionManager>,
        config: Arc<Config>,
    ) -> Self {
        let worker_permits = Arc::new(Semaphore::new(config.worker_count.max(1)));
        Self {
            store,
            dispatcher,
            sessions,
            config,
            group_locks: Arc::new(DashMap::new()),
            worker_permits,
        }
    }

    /// The mutex serializing requests for a single session.
    ///
    /// Session `0` is the pre-handshake sentinel used for the first
    /// request on a fresh connection; it is never serialized against
    /// anything since no session yet exists to own it.
    pub fn group_lock(&self, session_id: SessionId) -> Arc<Mutex<()>> {
        self.group_locks
            .entry(session_id.get())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Drop a session's group lock once the session is gone, so the
    /// map does not grow without bound over the server's lifetime.
    pub fn forget_group(&self, session_id: SessionId) {
        self.group_locks.remove(&session_id.get());
    }

    /// Acquire a worker-pool permit, bounding concurrent dispatch to
    /// `Config::worker_count`.
    pub async fn acquire_worker_permit(&self) -> tokio::sync::OwnedSemaphorePermit {
        self.worker_permits
            .clone()
            .acquire_owned()
            .await
            .expect("worker semaphore is never closed")
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use hyperspace_core::SessionId;

    use super::*;

    fn test_state() -> ServerState {
        let store = Arc::new(hyperspace_storage::Store::open_ephemeral_for_tests().unwrap());
        let dispatcher = EventDispatcher::new();
        let sessions = Arc::new(SessionManager::new(store.clone(), dispatcher.clone(), Duration::from_secs(12)));
        ServerState::new(store, dispatcher, sessions, Arc::new(Config::default()))
    }

    #[test]
    fn group_lock_returns_the_same_mutex_for_a_session_until_forgotten() {
        let state = test_state();
        let session = SessionId::new(1);

        let first = state.group_lock(session);
        let second = state.group_lock(session);
        assert!(Arc::ptr_eq(&first, &second));

        state.forget_group(session);
        let third = state.group_lock(session);
        assert!(!Arc::ptr_eq(&first, &third));
    }

    #[tokio::test]
    async fn worker_permits_are_bounded_by_configured_worker_count() {
        let store = Arc::new(hyperspace_storage::Store::open_ephemeral_for_tests().unwrap());
        let dispatcher = EventDispatcher::new();
        let sessions = Arc::new(SessionManager::new(store.clone(), dispatcher.clone(), Duration::from_secs(12)));
        let mut config = Config::default();
        config.worker_count = 1;
        let state = ServerState::new(store, dispatcher, sessions, Arc::new(config));

        let permit = state.acquire_worker_permit().await;
        assert_eq!(state.worker_permits.available_permits(), 0);
        drop(permit);
        assert_eq!(state.worker_permits.available_permits(), 1);
    }
}

//! The session manager: lease tracking, the expiry-driven handle
//! destruction cascade, and per-session notification queues
//! (`spec.md` §4.1, §5 "per-session notification queue: guarded by the
//! session's own mutex").

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use hyperspace_core::{HyperspaceError, HyperspaceResult, SessionId};
use hyperspace_events::{DispatchedEvent, EventDispatcher, EventReceiver};
use hyperspace_storage::{with_retry, Store};
use tracing::{info, warn};

use crate::session::{self, SessionRecord, SessionState};
use crate::QueuedNotification;

/// A wall-clock gap this large between two `tick` invocations is treated
/// as a host/process suspension rather than ordinary scheduling jitter;
/// every live session gets a one-off lease extension equal to the gap
/// (`spec.md` §4.1 "Suspension handling", tested by scenario S6).
const SUSPENSION_THRESHOLD: Duration = Duration::from_secs(5);

struct SessionEntry {
    addr: SocketAddr,
    name: Mutex<Option<String>>,
    state: Mutex<SessionState>,
    lease_deadline: Mutex<Instant>,
    notifications: Mutex<VecDeque<QueuedNotification>>,
}

/// Tracks every live session, drives lease expiry, and cascades handle
/// destruction through `hyperspace-namespace`/`hyperspace-lock` when a
/// session dies.
///
/// Cheap to clone: everything mutable lives behind `Arc`/`DashMap`.
#[derive(Clone)]
pub struct SessionManager {
    store: Arc<Store>,
    dispatcher: EventDispatcher,
    lease_interval: Duration,
    sessions: Arc<DashMap<SessionId, Arc<SessionEntry>>>,
    last_tick: Arc<Mutex<Instant>>,
}

impl SessionManager {
    /// Build a manager around `store` and `dispatcher`. `lease_interval`
    /// is the duration a successful `create`/`renew` extends the
    /// deadline by (`Hyperspace.Lease.Interval`).
    #[must_use]
    pub fn new(store: Arc<Store>, dispatcher: EventDispatcher, lease_interval: Duration) -> Self {
        Self {
            store,
            dispatcher,
            lease_interval,
            sessions: Arc::new(DashMap::new()),
            last_tick: Arc::new(Mutex::new(Instant::now())),
        }
    }

    /// Create a fresh session for the client at `addr`, allocating its id
    /// from the persisted counter (`spec.md` §4.1 `create_session`).
    ///
    /// # Errors
    ///
    /// Returns a [`HyperspaceError`] if the persisted counter or session
    /// record cannot be written after retries.
    pub fn create_session(&self, addr: SocketAddr) -> HyperspaceResult<SessionId> {
        let raw = self.store.next_session_id()?;
        let id = SessionId::new(raw);
        let record =
            SessionRecord { addr: addr.to_string(), name: None, state: SessionState::Initialising };
        with_retry(|| {
            let mut txn = self.store.begin()?;
            session::put_session(&mut txn, id, &record)?;
            txn.commit()?;
            Ok(())
        })?;

        self.sessions.insert(
            id,
            Arc::new(SessionEntry {
                addr,
                name: Mutex::new(None),
                state: Mutex::new(SessionState::Initialising),
                lease_deadline: Mutex::new(Instant::now() + self.lease_interval),
                notifications: Mutex::new(VecDeque::new()),
            }),
        );
        info!(session = id.get(), %addr, "session created");
        Ok(id)
    }

    /// Extend `session_id`'s lease if its deadline has not yet passed;
    /// otherwise expire it (`spec.md` §4.1 `renew_session_lease`).
    ///
    /// # Errors
    ///
    /// Returns [`HyperspaceError::ExpiredSession`] if the session is
    /// unknown or its lease had already lapsed.
    pub fn renew_session_lease(&self, session_id: SessionId) -> HyperspaceResult<()> {
        let Some(entry) = self.sessions.get(&session_id).map(|e| Arc::clone(&e)) else {
            return Err(HyperspaceError::ExpiredSession(session_id.get()));
        };
        let now = Instant::now();
        let mut deadline = entry.lease_deadline.lock().expect("lease mutex poisoned");
        if now > *deadline {
            drop(deadline);
            self.expire_session(session_id)?;
            return Err(HyperspaceError::ExpiredSession(session_id.get()));
        }
        *deadline = now + self.lease_interval;
        Ok(())
    }

    /// Record the human-readable name from the handshake and mark the
    /// session `safe`. Idempotent (`spec.md` §4.1 `initialize_session`).
    ///
    /// # Errors
    ///
    /// Returns [`HyperspaceError::ExpiredSession`] if the session is
    /// unknown, or a persistence error if the updated record cannot be
    /// written after retries.
    pub fn initialize_session(&self, session_id: SessionId, name: String) -> HyperspaceResult<()> {
        let Some(entry) = self.sessions.get(&session_id).map(|e| Arc::clone(&e)) else {
            return Err(HyperspaceError::ExpiredSession(session_id.get()));
        };
        *entry.name.lock().expect("name mutex poisoned") = Some(name.clone());
        {
            let mut state = entry.state.lock().expect("state mutex poisoned");
            if *state == SessionState::Initialising {
                *state = SessionState::Safe;
            }
        }
        let record = SessionRecord {
            addr: entry.addr.to_string(),
            name: Some(name),
            state: *entry.state.lock().expect("state mutex poisoned"),
        };
        with_retry(|| {
            let mut txn = self.store.begin()?;
            session::put_session(&mut txn, session_id, &record)?;
            txn.commit()?;
            Ok(())
        })
    }

    /// Force `session_id` to expire immediately, regardless of its lease
    /// deadline (explicit client shutdown, or a TCP control-channel
    /// disconnect).
    ///
    /// # Errors
    ///
    /// Returns a [`HyperspaceError`] if the expiry cascade fails after
    /// retries. A session that is already unknown is treated as already
    /// expired and returns `Ok(())`.
    pub fn destroy_session(&self, session_id: SessionId) -> HyperspaceResult<()> {
        if self.sessions.contains_key(&session_id) {
            self.expire_session(session_id)?;
        }
        Ok(())
    }

    /// Run one tick of the suspension-credit detector and expiry sweep
    /// (`spec.md` §4.1 `tick`, §5 "a single `tick` runs every second").
    /// Returns the ids of sessions expired by this call.
    ///
    /// # Errors
    ///
    /// Returns a [`HyperspaceError`] if an expiry cascade fails after
    /// retries; sessions processed before the failure remain expired.
    pub fn tick(&self) -> HyperspaceResult<Vec<SessionId>> {
        let now = Instant::now();
        {
            let mut last = self.last_tick.lock().expect("tick mutex poisoned");
            let gap = now.saturating_duration_since(*last);
            if gap > SUSPENSION_THRESHOLD {
                warn!(gap_secs = gap.as_secs(), "suspension detected, extending all leases");
                for entry in self.sessions.iter() {
                    let mut deadline = entry.lease_deadline.lock().expect("lease mutex poisoned");
                    *deadline += gap;
                }
            }
            *last = now;
        }

        let overdue: Vec<SessionId> = self
            .sessions
            .iter()
            .filter(|entry| {
                *entry.state.lock().expect("state mutex poisoned") != SessionState::Expired
                    && now > *entry.lease_deadline.lock().expect("lease mutex poisoned")
            })
            .map(|entry| *entry.key())
            .collect();

        for id in &overdue {
            self.expire_session(*id)?;
        }
        Ok(overdue)
    }

    /// Destroy every handle a persisted-but-not-expired session owns and
    /// mark it expired, without requiring it to be in the in-memory map.
    /// Run once at startup: a restarted server has no live sockets for
    /// any session a prior run left un-expired, so every one of them is
    /// effectively past its lease (`spec.md` §7: "a crash at any point is
    /// safe").
    ///
    /// # Errors
    ///
    /// Returns a [`HyperspaceError`] if a scan or expiry cascade fails.
    pub fn recover_on_startup(&self) -> HyperspaceResult<usize> {
        let rows = {
            let mut txn = self.store.begin()?;
            let rows = txn.scan_prefix(b"s:")?;
            txn.commit()?;
            rows
        };

        let mut recovered = 0;
        for (key, value) in rows {
            let Some(tail) = key.get(2..) else { continue };
            let Ok(bytes) = <[u8; 8]>::try_from(tail) else { continue };
            let id = SessionId::new(u64::from_be_bytes(bytes));
            let Ok(record) = serde_json::from_slice::<SessionRecord>(&value) else { continue };
            if record.state == SessionState::Expired {
                continue;
            }
            self.cascade_expire(id)?;
            recovered += 1;
        }
        if recovered > 0 {
            info!(recovered, "expired stale sessions left over from a prior run");
        }
        Ok(recovered)
    }

    /// Snapshot of `session_id`'s currently queued notifications, for
    /// inclusion in the next keepalive reply.
    ///
    /// # Errors
    ///
    /// Returns [`HyperspaceError::ExpiredSession`] if the session is
    /// unknown.
    pub fn pending_notifications(
        &self,
        session_id: SessionId,
    ) -> HyperspaceResult<Vec<QueuedNotification>> {
        let entry = self
            .sessions
            .get(&session_id)
            .ok_or(HyperspaceError::ExpiredSession(session_id.get()))?;
        Ok(entry.notifications.lock().expect("notification mutex poisoned").iter().cloned().collect())
    }

    /// Prune every queued notification with event id `<= last_known_event_id`,
    /// decrementing each event's outstanding-acknowledgement count
    /// (`spec.md` §4.4 "Delivery and acknowledgement"). A session that has
    /// already expired is treated as a no-op rather than an error, since
    /// it may have raced with a concurrent `tick`.
    ///
    /// # Errors
    ///
    /// Returns a [`HyperspaceError`] if a decrement transaction fails
    /// after retries.
    pub fn prune_notifications(
        &self,
        session_id: SessionId,
        last_known_event_id: u64,
    ) -> HyperspaceResult<()> {
        let Some(entry) = self.sessions.get(&session_id).map(|e| Arc::clone(&e)) else { return Ok(()) };
        let acked: Vec<QueuedNotification> = {
            let mut queue = entry.notifications.lock().expect("notification mutex poisoned");
            let mut remaining = VecDeque::new();
            let mut acked = Vec::new();
            for notification in queue.drain(..) {
                if notification.event.id.get() <= last_known_event_id {
                    acked.push(notification);
                } else {
                    remaining.push_back(notification);
                }
            }
            *queue = remaining;
            acked
        };
        for notification in acked {
            self.acknowledge(notification.event.id)?;
        }
        Ok(())
    }

    /// Drain the in-process event bus into per-session notification
    /// queues, acknowledging immediately on behalf of any recipient whose
    /// handle or session has already vanished (`spec.md` §4.4 step 5: "an
    /// equivalent design is: persist ... an outstanding-recipient count;
    /// each acknowledgement decrements").
    ///
    /// # Errors
    ///
    /// Returns a [`HyperspaceError`] if a lookup or acknowledgement
    /// transaction fails after retries.
    pub fn enqueue_dispatched_event(&self, dispatched: &DispatchedEvent) -> HyperspaceResult<()> {
        for &handle_id in &dispatched.recipients {
            let owner = {
                let mut txn = self.store.begin()?;
                let owner = hyperspace_namespace::handle::get_handle(&mut txn, handle_id)?
                    .map(|record| record.session);
                txn.commit()?;
                owner
            };
            let delivered = owner.and_then(|session_id| self.sessions.get(&session_id).map(|e| (session_id, Arc::clone(&e))))
                .map(|(_, entry)| {
                    entry
                        .notifications
                        .lock()
                        .expect("notification mutex poisoned")
                        .push_back(QueuedNotification { handle: handle_id, event: dispatched.event.clone() });
                })
                .is_some();
            if !delivered {
                self.acknowledge(dispatched.event.id)?;
            }
        }
        Ok(())
    }

    /// Whether `session_id` is currently tracked and not yet expired.
    /// Used by request dispatch to reject commands against a session the
    /// keepalive loop has already torn down, without the side effect of
    /// renewing its lease the way [`Self::renew_session_lease`] would.
    #[must_use]
    pub fn session_exists(&self, session_id: SessionId) -> bool {
        self.sessions
            .get(&session_id)
            .is_some_and(|entry| *entry.state.lock().expect("state mutex poisoned") != SessionState::Expired)
    }

    /// The number of sessions currently tracked in memory, for the
    /// `status` command (`spec.md` §4.6).
    #[must_use]
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Spawn a background task draining `receiver` into this manager's
    /// notification queues for the lifetime of the returned handle.
    pub fn spawn_event_listener(&self, mut receiver: EventReceiver) -> tokio::task::JoinHandle<()> {
        let manager = self.clone();
        tokio::spawn(async move {
            while let Some(dispatched) = receiver.recv().await {
                if let Err(error) = manager.enqueue_dispatched_event(&dispatched) {
                    warn!(%error, "failed to enqueue dispatched event");
                }
            }
        })
    }

    fn acknowledge(&self, event_id: hyperspace_core::EventId) -> HyperspaceResult<()> {
        with_retry(|| {
            let mut txn = self.store.begin()?;
            self.dispatcher.acknowledge(&mut txn, event_id)?;
            txn.commit()?;
            Ok(())
        })
    }

    fn expire_session(&self, id: SessionId) -> HyperspaceResult<()> {
        self.cascade_expire(id)?;
        self.sessions.remove(&id);
        Ok(())
    }

    fn cascade_expire(&self, id: SessionId) -> HyperspaceResult<()> {
        let handles = {
            let mut txn = self.store.begin()?;
            let handles = hyperspace_namespace::handle::list_session_handles(&mut txn, id)?;
            txn.commit()?;
            handles
        };
        for handle_id in handles {
            crate::destroy::destroy_handle(&self.store, &self.dispatcher, handle_id, Some(id))?;
        }

        if let Some(entry) = self.sessions.get(&id).map(|e| Arc::clone(&e)) {
            *entry.state.lock().expect("state mutex poisoned") = SessionState::Expired;
            let acked: Vec<QueuedNotification> = entry
                .notifications
                .lock()
                .expect("notification mutex poisoned")
                .drain(..)
                .collect();
            for notification in acked {
                self.acknowledge(notification.event.id)?;
            }
        }

        with_retry(|| {
            let mut txn = self.store.begin()?;
            let mut record = session::get_session(&mut txn, id)?.unwrap_or(SessionRecord {
                addr: String::new(),
                name: None,
                state: SessionState::Expired,
            });
            record.state = SessionState::Expired;
            session::put_session(&mut txn, id, &record)?;
            txn.commit()?;
            Ok(())
        })?;

        info!(session = id.get(), "session expired");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hyperspace_core::{EventMask, OpenFlags};
    use std::net::{IpAddr, Ipv4Addr};

    fn addr() -> SocketAddr {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 4000)
    }

    fn manager() -> SessionManager {
        let store = Arc::new(Store::open_ephemeral_for_tests().unwrap());
        SessionManager::new(store, EventDispatcher::new(), Duration::from_secs(12))
    }

    use hyperspace_storage::Store;

    #[test]
    fn create_then_renew_then_initialize() {
        let manager = manager();
        let id = manager.create_session(addr()).unwrap();
        manager.renew_session_lease(id).unwrap();
        manager.initialize_session(id, "client-a".to_owned()).unwrap();
        // Idempotent.
        manager.initialize_session(id, "client-a".to_owned()).unwrap();
    }

    #[test]
    fn renewing_an_unknown_session_is_expired_session() {
        let manager = manager();
        let result = manager.renew_session_lease(SessionId::new(999));
        assert!(matches!(result, Err(HyperspaceError::ExpiredSession(999))));
    }

    #[test]
    fn destroying_a_session_cascades_to_its_handles() {
        let manager = manager();
        let id = manager.create_session(addr()).unwrap();

        let mut txn = manager.store.begin().unwrap();
        hyperspace_namespace::node::put_node(
            &mut txn,
            &hyperspace_core::NodePath::root(),
            &hyperspace_namespace::NodeRecord::new(false, chrono::Utc::now()),
        )
        .unwrap();
        let path = hyperspace_core::NodePath::parse("/s").unwrap();
        let opened = hyperspace_namespace::open(
            &mut txn,
            id,
            &path,
            OpenFlags(OpenFlags::READ | OpenFlags::CREATE | OpenFlags::TEMP),
            EventMask::none(),
            &[],
        )
        .unwrap();
        txn.commit().unwrap();

        manager.destroy_session(id).unwrap();

        let mut txn = manager.store.begin().unwrap();
        assert!(!hyperspace_namespace::exists(&mut txn, &path).unwrap());
        assert!(hyperspace_namespace::handle::get_handle(&mut txn, opened.handle).unwrap().is_none());
    }

    #[test]
    fn tick_expires_sessions_past_their_deadline() {
        let manager = manager();
        let id = manager.create_session(addr()).unwrap();
        {
            let entry = manager.sessions.get(&id).unwrap();
            *entry.lease_deadline.lock().unwrap() = Instant::now() - Duration::from_secs(1);
        }
        let expired = manager.tick().unwrap();
        assert_eq!(expired, vec![id]);
        assert!(manager.renew_session_lease(id).is_err());
    }

    #[test]
    fn tick_within_threshold_does_not_extend_leases() {
        let manager = manager();
        let id = manager.create_session(addr()).unwrap();
        let before = *manager.sessions.get(&id).unwrap().lease_deadline.lock().unwrap();
        manager.tick().unwrap();
        let after = *manager.sessions.get(&id).unwrap().lease_deadline.lock().unwrap();
        assert_eq!(before, after);
    }
}

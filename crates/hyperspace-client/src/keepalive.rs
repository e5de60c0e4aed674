//! The UDP keepalive loop: sends `(session_id, last_known_event_id,
//! shutdown)` every `Hyperspace.KeepAlive.Interval`, processes the
//! server's notifications, and drives the [`LeaseState`] machine
//! (`spec.md` §4.5).

use std::net::SocketAddr;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use bytes::BytesMut;
use hyperspace_core::{EventKind, SessionId};
use hyperspace_proto::{ClientKeepalive, Notification, NotificationTail, ServerKeepalive};
use tokio::net::UdpSocket;
use tokio::sync::Notify;
use tracing::{error, info, warn};

use crate::callback::SessionCallback;
use crate::handle::HandleTable;
use crate::state::LeaseState;

const MAX_DATAGRAM: usize = 64 * 1024;

/// Grace period before the "unknown handle" sighting is treated as a
/// persistent server bug rather than a reconnect race (`spec.md` §4.5,
/// §9 Open Question: preserved as-is, made explicit and logged).
const BAD_NOTIFICATION_GRACE: Duration = Duration::from_secs(10);

struct Shared {
    state: Mutex<LeaseState>,
    last_send: Mutex<Instant>,
    jeopardy_entered_at: Mutex<Option<Instant>>,
    last_known_event_id: AtomicI64,
    session_id: AtomicU64,
    lease_interval: Duration,
    grace_period: Duration,
    state_changed: Notify,
}

/// Drives the keepalive datagram exchange for one session and exposes
/// its current [`LeaseState`] to the synchronous client API.
pub struct KeepaliveLoop {
    shared: Arc<Shared>,
}

impl KeepaliveLoop {
    /// Bind a UDP socket, perform the initial `session_id=0` handshake to
    /// obtain a session id, and spawn the send/receive loop.
    ///
    /// # Errors
    ///
    /// Returns a [`std::io::Error`] if the socket cannot be bound or the
    /// initial exchange never completes.
    pub async fn start(
        server_addr: SocketAddr,
        keep_alive_interval: Duration,
        lease_interval: Duration,
        grace_period: Duration,
        handles: Arc<HandleTable>,
        callback: Arc<dyn SessionCallback>,
    ) -> std::io::Result<(Self, SessionId)> {
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        socket.connect(server_addr).await?;

        let initial = ClientKeepalive { session_id: SessionId::new(0), last_known_event_id: 0, shutdown: false };
        let session_id = send_and_await_reply(&socket, initial).await?.session_id;
        info!(session = session_id.get(), "session established");

        let shared = Arc::new(Shared {
            state: Mutex::new(LeaseState::Safe),
            last_send: Mutex::new(Instant::now()),
            jeopardy_entered_at: Mutex::new(None),
            last_known_event_id: AtomicI64::new(0),
            session_id: AtomicU64::new(session_id.get()),
            lease_interval,
            grace_period,
            state_changed: Notify::new(),
        });

        let task_shared = Arc::clone(&shared);
        tokio::spawn(run_loop(socket, task_shared, keep_alive_interval, handles, callback));

        Ok((Self { shared }, session_id))
    }

    /// The session id negotiated at [`Self::start`].
    #[must_use]
    pub fn session_id(&self) -> SessionId {
        SessionId::new(self.shared.session_id.load(Ordering::Relaxed))
    }

    /// Current lease state.
    #[must_use]
    pub fn state(&self) -> LeaseState {
        *self.shared.state.lock().expect("lease state mutex poisoned")
    }

    /// Block until the lease state is no longer `Jeopardy`, i.e. until it
    /// resolves to `Safe` or `Expired` (`spec.md` §4.5: "application
    /// requests block" during jeopardy's grace period).
    pub async fn await_resolved(&self) {
        loop {
            if self.state() != LeaseState::Jeopardy {
                return;
            }
            self.shared.state_changed.notified().await;
        }
    }
}

async fn send_and_await_reply(
    socket: &UdpSocket,
    outgoing: ClientKeepalive,
) -> std::io::Result<ServerKeepalive> {
    let mut buf = BytesMut::new();
    outgoing.encode(&mut buf);
    socket.send(&buf).await?;

    let mut recv_buf = vec![0u8; MAX_DATAGRAM];
    let len = socket.recv(&mut recv_buf).await?;
    let mut cursor = &recv_buf[..len];
    ServerKeepalive::decode(&mut cursor)
        .map_err(|error| std::io::Error::other(error.to_string()))
}

async fn run_loop(
    socket: UdpSocket,
    shared: Arc<Shared>,
    keep_alive_interval: Duration,
    handles: Arc<HandleTable>,
    callback: Arc<dyn SessionCallback>,
) {
    let mut interval = tokio::time::interval(keep_alive_interval);
    let mut recv_buf = vec![0u8; MAX_DATAGRAM];

    loop {
        tokio::select! {
            _ = interval.tick() => {
                if let Err(error) = send_keepalive(&socket, &shared).await {
                    warn!(%error, "failed to send keepalive datagram");
                }
            }
            result = socket.recv(&mut recv_buf) => {
                match result {
                    Ok(len) => {
                        let mut cursor = &recv_buf[..len];
                        match ServerKeepalive::decode(&mut cursor) {
                            Ok(reply) => {
                                if handle_reply(&shared, &handles, &callback, reply) {
                                    // spec.md §4.5: "If any notifications
                                    // were processed, the engine
                                    // immediately sends a fresh keepalive
                                    // so the server can prune."
                                    if let Err(error) = send_keepalive(&socket, &shared).await {
                                        warn!(%error, "failed to send ack keepalive");
                                    }
                                }
                            }
                            Err(error) => warn!(%error, "malformed keepalive reply"),
                        }
                    }
                    Err(error) => {
                        warn!(%error, "keepalive socket read failed");
                        return;
                    }
                }
            }
        }

        check_jeopardy_deadline(&shared, &callback);
    }
}

async fn send_keepalive(socket: &UdpSocket, shared: &Shared) -> std::io::Result<()> {
    let outgoing = ClientKeepalive {
        session_id: SessionId::new(shared.session_id.load(Ordering::Relaxed)),
        last_known_event_id: shared.last_known_event_id.load(Ordering::Relaxed),
        shutdown: false,
    };
    let mut buf = BytesMut::new();
    outgoing.encode(&mut buf);
    *shared.last_send.lock().expect("last-send mutex poisoned") = Instant::now();
    socket.send(&buf).await.map(|_| ())
}

fn check_jeopardy_deadline(shared: &Shared, callback: &Arc<dyn SessionCallback>) {
    let mut state = shared.state.lock().expect("lease state mutex poisoned");
    if *state != LeaseState::Safe {
        return;
    }
    let last_send = *shared.last_send.lock().expect("last-send mutex poisoned");
    if Instant::now().saturating_duration_since(last_send) > shared.lease_interval {
        *state = LeaseState::Jeopardy;
        *shared.jeopardy_entered_at.lock().expect("jeopardy mutex poisoned") = Some(Instant::now());
        drop(state);
        warn!("keepalive jeopardy deadline passed, entering jeopardy");
        callback.jeopardy();
        shared.state_changed.notify_waiters();
    }
}

fn handle_reply(
    shared: &Shared,
    handles: &HandleTable,
    callback: &Arc<dyn SessionCallback>,
    reply: ServerKeepalive,
) -> bool {
    if reply.error != 0 {
        transition_to_expired(shared, callback, "server reported session error");
        return false;
    }

    {
        let mut state = shared.state.lock().expect("lease state mutex poisoned");
        if *state == LeaseState::Jeopardy {
            *state = LeaseState::Safe;
            *shared.jeopardy_entered_at.lock().expect("jeopardy mutex poisoned") = None;
            drop(state);
            info!("recovered from jeopardy");
            callback.safe();
            shared.state_changed.notify_waiters();
        } else if *state == LeaseState::Expired {
            return false;
        }
    }

    let mut any_processed = false;
    for notification in reply.notifications {
        match process_notification(handles, shared, notification) {
            NotificationOutcome::Processed => any_processed = true,
            NotificationOutcome::Skipped => {}
            NotificationOutcome::UnknownHandle => {
                // spec.md §4.5: an unknown-handle sighting suppresses the
                // rest of this reply's notifications, not just this one.
                break;
            }
        }
    }

    // Expire if the grace period has elapsed while still in jeopardy;
    // a safe reply above would have already cleared it, so this only
    // fires when jeopardy persists across consecutive replies that
    // still arrive late relative to the lease.
    let overdue = {
        let entered = *shared.jeopardy_entered_at.lock().expect("jeopardy mutex poisoned");
        entered.is_some_and(|at| Instant::now().saturating_duration_since(at) > shared.grace_period)
    };
    if overdue {
        transition_to_expired(shared, callback, "grace period elapsed");
        return false;
    }

    any_processed
}

/// Result of handling one notification from a keepalive reply.
enum NotificationOutcome {
    /// Delivered to the handle's callback and the event id was advanced.
    Processed,
    /// A known handle, but the event was already seen (idempotent replay).
    Skipped,
    /// The handle is not in the local table; the caller must discard the
    /// rest of this reply's notifications.
    UnknownHandle,
}

fn process_notification(handles: &HandleTable, shared: &Shared, notification: Notification) -> NotificationOutcome {
    let Some(local) = handles.get(notification.handle) else {
        let age = handles.record_bad_notification(notification.handle);
        if age > BAD_NOTIFICATION_GRACE {
            error!(
                handle = notification.handle.get(),
                "notification for unknown handle persisted past grace period, crashing per spec.md §4.5/§9"
            );
            std::process::exit(1);
        }
        warn!(handle = notification.handle.get(), "notification for unknown handle, suppressing this reply");
        return NotificationOutcome::UnknownHandle;
    };

    let last_known = shared.last_known_event_id.load(Ordering::Relaxed);
    if notification.event_id.get() as i64 <= last_known {
        return NotificationOutcome::Skipped;
    }

    let event = to_event(notification.event_id, notification.event_mask, notification.tail);
    local.callback.on_event(&event);

    let new_value = notification.event_id.get() as i64;
    shared.last_known_event_id.fetch_max(new_value, Ordering::Relaxed);
    NotificationOutcome::Processed
}

/// `Named` is shared by four event kinds on the wire (`spec.md` §6); the
/// mask bit the server reports matching disambiguates which one this
/// notification actually carries.
fn to_event(
    event_id: hyperspace_core::EventId,
    event_mask: u32,
    tail: NotificationTail,
) -> hyperspace_core::Event {
    use hyperspace_core::EventMask;
    let kind = match tail {
        NotificationTail::Named(name) => match event_mask {
            bits if EventMask(bits).has(EventMask::ATTR_DEL) => EventKind::AttrDel { name },
            bits if EventMask(bits).has(EventMask::CHILD_ADDED) => EventKind::ChildAdded { name },
            bits if EventMask(bits).has(EventMask::CHILD_REMOVED) => EventKind::ChildRemoved { name },
            _ => EventKind::AttrSet { name },
        },
        NotificationTail::LockAcquired(mode) => EventKind::LockAcquired { mode },
        NotificationTail::LockReleased => EventKind::LockReleased,
        NotificationTail::LockGranted { mode, generation } => EventKind::LockGranted { mode, generation },
    };
    hyperspace_core::Event { id: event_id, kind, created_at: chrono::Utc::now() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hyperspace_core::{EventMask, HandleId};

    #[test]
    fn named_tail_disambiguates_by_event_mask() {
        let event = to_event(
            hyperspace_core::EventId::new(1),
            EventMask::ATTR_DEL,
            NotificationTail::Named("x".to_owned()),
        );
        assert!(matches!(event.kind, EventKind::AttrDel { .. }));

        let event = to_event(
            hyperspace_core::EventId::new(2),
            EventMask::CHILD_ADDED,
            NotificationTail::Named("y".to_owned()),
        );
        assert!(matches!(event.kind, EventKind::ChildAdded { .. }));

        let event =
            to_event(hyperspace_core::EventId::new(3), EventMask::ATTR_SET, NotificationTail::Named("z".to_owned()));
        assert!(matches!(event.kind, EventKind::AttrSet { .. }));
    }

    #[test]
    fn unknown_handle_notification_is_suppressed_within_the_grace_period() {
        let handles = HandleTable::new();
        let shared = Shared {
            state: Mutex::new(LeaseState::Safe),
            last_send: Mutex::new(Instant::now()),
            jeopardy_entered_at: Mutex::new(None),
            last_known_event_id: AtomicI64::new(0),
            session_id: AtomicU64::new(1),
            lease_interval: Duration::from_secs(12),
            grace_period: Duration::from_secs(60),
            state_changed: Notify::new(),
        };
        let notification = Notification {
            handle: HandleId::new(99),
            event_id: hyperspace_core::EventId::new(1),
            event_mask: EventMask::ATTR_SET,
            tail: NotificationTail::Named("x".to_owned()),
        };
        assert!(matches!(
            process_notification(&handles, &shared, notification),
            NotificationOutcome::UnknownHandle
        ));
    }

    #[test]
    fn handle_reply_discards_notifications_after_an_unknown_handle() {
        let handles = HandleTable::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let good_handle = HandleId::new(1);
        handles.insert(good_handle, "/x".to_owned(), EventMask::none(), {
            let seen = Arc::clone(&seen);
            Arc::new(move |event: &hyperspace_core::Event| seen.lock().unwrap().push(event.id.get()))
        });

        let shared = Shared {
            state: Mutex::new(LeaseState::Safe),
            last_send: Mutex::new(Instant::now()),
            jeopardy_entered_at: Mutex::new(None),
            last_known_event_id: AtomicI64::new(0),
            session_id: AtomicU64::new(1),
            lease_interval: Duration::from_secs(12),
            grace_period: Duration::from_secs(60),
            state_changed: Notify::new(),
        };

        let reply = ServerKeepalive {
            session_id: SessionId::new(1),
            error: 0,
            notifications: vec![
                Notification {
                    handle: HandleId::new(99),
                    event_id: hyperspace_core::EventId::new(1),
                    event_mask: EventMask::ATTR_SET,
                    tail: NotificationTail::Named("x".to_owned()),
                },
                Notification {
                    handle: good_handle,
                    event_id: hyperspace_core::EventId::new(2),
                    event_mask: EventMask::ATTR_SET,
                    tail: NotificationTail::Named("y".to_owned()),
                },
            ],
        };

        let callback: Arc<dyn SessionCallback> = Arc::new(crate::callback::NullSessionCallback);
        handle_reply(&shared, &handles, &callback, reply);

        assert!(seen.lock().unwrap().is_empty());
    }
}

fn transition_to_expired(shared: &Shared, callback: &Arc<dyn SessionCallback>, reason: &str) {
    let mut state = shared.state.lock().expect("lease state mutex poisoned");
    if *state == LeaseState::Expired {
        return;
    }
    *state = LeaseState::Expired;
    drop(state);
    warn!(reason, "session expired");
    callback.expired();
    shared.state_changed.notify_waiters();
}

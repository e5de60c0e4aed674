//! The UDP keepalive exchange: session creation/renewal and pending
//! notification delivery (`spec.md` §4.1, §4.5, §6), plus the
//! once-a-second lease-expiry tick.

use std::net::SocketAddr;
use std::time::Duration;

use bytes::BytesMut;
use hyperspace_core::{Event, EventKind};
use hyperspace_proto::{ClientKeepalive, Notification, NotificationTail, ServerKeepalive};
use hyperspace_session::QueuedNotification;
use tokio::net::UdpSocket;
use tracing::{debug, warn};

use crate::state::ServerState;

const MAX_DATAGRAM: usize = 64 * 1024;

/// Bind the keepalive datagram socket and serve it until the process
/// exits.
///
/// # Errors
///
/// Returns a [`std::io::Error`] if `addr` cannot be bound.
pub async fn serve(addr: SocketAddr, state: ServerState) -> std::io::Result<()> {
    let socket = UdpSocket::bind(addr).await?;
    tracing::info!(%addr, "keepalive socket bound");
    let mut buf = vec![0u8; MAX_DATAGRAM];

    loop {
        let (len, peer) = socket.recv_from(&mut buf).await?;
        let mut cursor = &buf[..len];
        let incoming = match ClientKeepalive::decode(&mut cursor) {
            Ok(msg) => msg,
            Err(error) => {
                warn!(%peer, %error, "malformed keepalive datagram");
                continue;
            }
        };

        let reply = handle_keepalive(&state, peer, incoming);
        let mut out = BytesMut::new();
        reply.encode(&mut out);
        if let Err(error) = socket.send_to(&out, peer).await {
            warn!(%peer, %error, "failed to send keepalive reply");
        }
    }
}

fn handle_keepalive(state: &ServerState, peer: SocketAddr, incoming: ClientKeepalive) -> ServerKeepalive {
    let session_id = incoming.session_id;

    if incoming.shutdown {
        if let Err(error) = state.sessions.destroy_session(session_id) {
            warn!(session = session_id.get(), %error, "error destroying session on shutdown");
        }
        state.forget_group(session_id);
        return ServerKeepalive { session_id, error: 0, notifications: Vec::new() };
    }

    let session_id = if session_id.get() == 0 {
        match state.sessions.create_session(peer) {
            Ok(id) => id,
            Err(error) => {
                warn!(%peer, %error, "failed to create session");
                return ServerKeepalive { session_id, error: error.wire_code(), notifications: Vec::new() };
            }
        }
    } else {
        match state.sessions.renew_session_lease(session_id) {
            Ok(()) => session_id,
            Err(error) => {
                debug!(session = session_id.get(), %error, "lease renewal failed");
                return ServerKeepalive { session_id, error: error.wire_code(), notifications: Vec::new() };
            }
        }
    };

    if let Err(error) = state.sessions.prune_notifications(session_id, incoming.last_known_event_id as u64) {
        warn!(session = session_id.get(), %error, "failed to prune acknowledged notifications");
    }

    let notifications = match state.sessions.pending_notifications(session_id) {
        Ok(queued) => queued.into_iter().map(to_wire_notification).collect(),
        Err(error) => {
            warn!(session = session_id.get(), %error, "failed to read pending notifications");
            Vec::new()
        }
    };

    ServerKeepalive { session_id, error: 0, notifications }
}

fn to_wire_notification(queued: QueuedNotification) -> Notification {
    let Event { id, kind, .. } = queued.event;
    let event_mask = kind.mask_bit().unwrap_or(0);
    let tail = match kind {
        EventKind::AttrSet { name } | EventKind::AttrDel { name } => NotificationTail::Named(name),
        EventKind::ChildAdded { name } | EventKind::ChildRemoved { name } => {
            NotificationTail::Named(name)
        }
        EventKind::LockAcquired { mode } => NotificationTail::LockAcquired(mode),
        EventKind::LockReleased => NotificationTail::LockReleased,
        EventKind::LockGranted { mode, generation } => {
            NotificationTail::LockGranted { mode, generation }
        }
    };
    Notification { handle: queued.handle, event_id: id, event_mask, tail }
}

/// Run the once-a-second lease-expiry sweep until the process exits.
pub async fn run_tick_loop(state: ServerState) {
    let mut interval = tokio::time::interval(Duration::from_secs(1));
    loop {
        interval.tick().await;
        match state.sessions.tick() {
            Ok(expired) => {
                for session in expired {
                    state.forget_group(session);
                }
            }
            Err(error) => warn!(%error, "session tick failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use hyperspace_core::{EventId, HandleId, SessionId};

    use super::*;
    use crate::state::ServerState;

    fn test_state() -> ServerState {
        let store = Arc::new(hyperspace_storage::Store::open_ephemeral_for_tests().unwrap());
        let dispatcher = hyperspace_events::EventDispatcher::new();
        let sessions = Arc::new(hyperspace_session::SessionManager::new(
            store.clone(),
            dispatcher.clone(),
            Duration::from_secs(12),
        ));
        ServerState::new(store, dispatcher, sessions, Arc::new(hyperspace_config::Config::default()))
    }

    fn peer() -> SocketAddr {
        "127.0.0.1:0".parse().unwrap()
    }

    #[test]
    fn session_zero_is_assigned_a_fresh_session_on_first_contact() {
        let state = test_state();
        let incoming = ClientKeepalive { session_id: SessionId::new(0), last_known_event_id: 0, shutdown: false };

        let reply = handle_keepalive(&state, peer(), incoming);

        assert_eq!(reply.error, 0);
        assert!(reply.session_id.get() != 0);
        assert!(state.sessions.session_exists(reply.session_id));
    }

    #[test]
    fn renewing_an_unknown_session_reports_expired() {
        let state = test_state();
        let unknown = SessionId::new(999);
        let incoming = ClientKeepalive { session_id: unknown, last_known_event_id: 0, shutdown: false };

        let reply = handle_keepalive(&state, peer(), incoming);

        assert_ne!(reply.error, 0, "renewing a session the server doesn't know must report an error");
    }

    #[test]
    fn shutdown_destroys_the_session_and_forgets_its_group_lock() {
        let state = test_state();
        let session = state.sessions.create_session(peer()).unwrap();
        let _ = state.group_lock(session);

        let incoming = ClientKeepalive { session_id: session, last_known_event_id: 0, shutdown: true };
        let reply = handle_keepalive(&state, peer(), incoming);

        assert_eq!(reply.error, 0);
        assert!(!state.sessions.session_exists(session));
    }

    #[test]
    fn to_wire_notification_maps_attr_set_to_a_named_tail() {
        let queued = QueuedNotification {
            handle: HandleId::new(7),
            event: Event {
                id: EventId::new(1),
                kind: EventKind::AttrSet { name: "color".to_owned() },
                created_at: chrono::Utc::now(),
            },
        };

        let wire = to_wire_notification(queued);

        assert_eq!(wire.handle, HandleId::new(7));
        assert_eq!(wire.event_id, EventId::new(1));
        assert!(matches!(wire.tail, NotificationTail::Named(name) if name == "color"));
    }
}

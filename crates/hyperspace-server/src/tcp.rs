//! The TCP accept loop and per-connection request/reply pump.
//!
//! Every connection speaks one `Frame` at a time: decode a [`Request`],
//! dispatch it to completion, encode the [`Reply`] (or error) back. A
//! connection's first message must be `Handshake`; everything after it
//! runs serialized against the rest of that session's traffic through
//! [`ServerState::group_lock`] (`spec.md` §5).

use std::net::SocketAddr;

use futures::{SinkExt, StreamExt};
use hyperspace_core::{HyperspaceError, SessionId};
use hyperspace_proto::{Frame, Header, MessageCodec, Reply, Request};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::Framed;
use tracing::{debug, info, warn};

use crate::dispatch::dispatch;
use crate::state::ServerState;

/// Accept TCP connections on `addr` until the process is asked to shut
/// down, spawning one task per connection.
///
/// # Errors
///
/// Returns a [`std::io::Error`] if `addr` cannot be bound.
pub async fn serve(addr: SocketAddr, state: ServerState) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "tcp listener bound");
    loop {
        let (stream, peer) = listener.accept().await?;
        let state = state.clone();
        tokio::spawn(async move {
            if let Err(error) = handle_connection(stream, peer, state).await {
                debug!(%peer, %error, "connection closed");
            }
        });
    }
}

async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    state: ServerState,
) -> Result<(), hyperspace_proto::ProtoError> {
    let mut framed = Framed::new(stream, MessageCodec::default());
    let mut bound_session: Option<SessionId> = None;

    while let Some(frame) = framed.next().await {
        let mut frame = frame?;
        let message_id = frame.header.message_id;
        let thread_group = frame.header.thread_group;
        let command = frame.header.command;

        let request = match Request::decode(command, &mut frame.payload) {
            Ok(request) => request,
            Err(error) => {
                warn!(%peer, %error, "malformed request payload");
                continue;
            }
        };

        let session = match &request {
            Request::Handshake { session_id, .. } => *session_id,
            _ => bound_session.unwrap_or(SessionId::new(0)),
        };

        let result = run_with_group_lock(&state, session, request).await;

        if matches!(
            result,
            Ok(Reply::Handshake)
        ) {
            bound_session = Some(session);
        }

        let reply_frame = encode_reply(command, message_id, thread_group, result);
        framed.send(reply_frame).await?;
    }

    if let Some(session) = bound_session {
        state.forget_group(session);
    }
    Ok(())
}

async fn run_with_group_lock(
    state: &ServerState,
    session: SessionId,
    request: Request,
) -> Result<Reply, HyperspaceError> {
    let _permit = state.acquire_worker_permit().await;

    if session.get() != 0 && !state.sessions.session_exists(session) {
        return Err(HyperspaceError::ExpiredSession(session.get()));
    }

    // Session 0 is the pre-handshake sentinel; nothing to serialize
    // against since no session yet owns this connection.
    if session.get() == 0 {
        return dispatch(state, session, request);
    }

    let lock = state.group_lock(session);
    let _guard = lock.lock().await;
    dispatch(state, session, request)
}

fn encode_reply(
    command: hyperspace_proto::CommandCode,
    message_id: u32,
    thread_group: u32,
    result: Result<Reply, HyperspaceError>,
) -> Frame {
    use bytes::BytesMut;

    let mut header = Header::new(command, message_id, thread_group);
    let mut payload = BytesMut::new();
    match result {
        Ok(reply) => {
            header.flags = hyperspace_proto::Flags(hyperspace_proto::Flags::RESPONSE);
            reply.encode(&mut payload);
        }
        Err(error) => {
            header.flags = hyperspace_proto::Flags(
                hyperspace_proto::Flags::RESPONSE | hyperspace_proto::Flags::ERROR,
            );
            use bytes::BufMut;
            payload.put_i32_le(error.wire_code());
        }
    }
    Frame { header, payload: payload.freeze() }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use hyperspace_proto::CommandCode;

    use super::*;
    use crate::state::ServerState;

    fn test_state() -> ServerState {
        let store = Arc::new(hyperspace_storage::Store::open_ephemeral_for_tests().unwrap());
        {
            let mut txn = store.begin().unwrap();
            hyperspace_namespace::node::put_node(
                &mut txn,
                &hyperspace_core::NodePath::root(),
                &hyperspace_namespace::NodeRecord::new(false, chrono::Utc::now()),
            )
            .unwrap();
            txn.commit().unwrap();
        }
        let dispatcher = hyperspace_events::EventDispatcher::new();
        let sessions = Arc::new(hyperspace_session::SessionManager::new(
            store.clone(),
            dispatcher.clone(),
            Duration::from_secs(12),
        ));
        ServerState::new(store, dispatcher, sessions, Arc::new(hyperspace_config::Config::default()))
    }

    #[tokio::test]
    async fn session_zero_bypasses_the_group_lock() {
        let state = test_state();
        let result = run_with_group_lock(&state, SessionId::new(0), Request::Status).await;
        assert!(matches!(result, Ok(Reply::Status { .. })));
    }

    #[tokio::test]
    async fn an_expired_session_is_rejected_before_reaching_dispatch() {
        let state = test_state();
        let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let session = state.sessions.create_session(addr).unwrap();
        state.sessions.destroy_session(session).unwrap();

        let result = run_with_group_lock(&state, session, Request::Status).await;

        assert!(matches!(result, Err(HyperspaceError::ExpiredSession(id)) if id == session.get()));
    }

    #[test]
    fn a_successful_reply_is_encoded_without_the_error_flag() {
        let frame = encode_reply(CommandCode::Status, 1, 0, Ok(Reply::Ack));

        assert!(frame.header.flags.has(hyperspace_proto::Flags::RESPONSE));
        assert!(!frame.header.flags.has(hyperspace_proto::Flags::ERROR));
    }

    #[test]
    fn an_error_reply_carries_the_wire_code_as_its_payload() {
        let frame = encode_reply(CommandCode::Status, 1, 0, Err(HyperspaceError::ExpiredSession(5)));

        assert!(frame.header.flags.has(hyperspace_proto::Flags::ERROR));
        assert_eq!(frame.payload.len(), 4);
    }
}

//! The TCP request channel: one `Framed` connection carrying the
//! handshake plus every `open`/`close`/`lock`/`attr`/`readdir` request
//! (`spec.md` §4.5 "Request channel coupling").
//!
//! Requests are correlated to replies by `Header::message_id` rather
//! than by connection order, since the server may interleave replies
//! with notifications pushed over the sibling UDP channel. A background
//! task owns the socket's read half and fulfils a table of pending
//! [`oneshot`] senders as replies arrive; [`RequestChannel::call`] is
//! safe to call concurrently from multiple callers.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use dashmap::DashMap;
use futures::{SinkExt, StreamExt};
use hyperspace_core::HyperspaceError;
use hyperspace_proto::{Frame, Header, MessageCodec, Reply, Request};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, Notify};
use tokio_util::codec::Framed;
use tracing::{debug, warn};

use crate::error::ClientError;

const CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// A live (or recently-live) TCP connection to the master, dispatching
/// requests and routing their replies back to the caller that issued
/// them.
pub struct RequestChannel {
    next_message_id: AtomicU32,
    pending: Arc<DashMap<u32, oneshot::Sender<Result<Reply, HyperspaceError>>>>,
    outbox: mpsc::UnboundedSender<Frame>,
    closed: Arc<AtomicBool>,
    /// Fires once when the read or write half observes the connection
    /// drop, waking the engine's reconnect loop.
    pub disconnected: Arc<Notify>,
}

impl RequestChannel {
    /// Dial `addr` and spawn the reader/writer tasks.
    ///
    /// # Errors
    ///
    /// Returns a [`std::io::Error`] if the connection cannot be
    /// established.
    pub async fn connect(addr: SocketAddr) -> std::io::Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        let framed = Framed::new(stream, MessageCodec::default());
        let (mut sink, mut stream) = framed.split();

        let pending: Arc<DashMap<u32, oneshot::Sender<Result<Reply, HyperspaceError>>>> =
            Arc::new(DashMap::new());
        let closed = Arc::new(AtomicBool::new(false));
        let disconnected = Arc::new(Notify::new());

        let (outbox, mut inbox) = mpsc::unbounded_channel::<Frame>();

        let writer_closed = Arc::clone(&closed);
        let writer_disconnected = Arc::clone(&disconnected);
        tokio::spawn(async move {
            while let Some(frame) = inbox.recv().await {
                if let Err(error) = sink.send(frame).await {
                    warn!(%error, "request channel write failed");
                    break;
                }
            }
            writer_closed.store(true, Ordering::SeqCst);
            writer_disconnected.notify_waiters();
        });

        let reader_pending = Arc::clone(&pending);
        let reader_closed = Arc::clone(&closed);
        let reader_disconnected = Arc::clone(&disconnected);
        tokio::spawn(async move {
            while let Some(result) = stream.next().await {
                match result {
                    Ok(mut frame) => {
                        let message_id = frame.header.message_id;
                        let reply = decode_reply(&frame.header, &mut frame.payload);
                        if let Some((_, sender)) = reader_pending.remove(&message_id) {
                            let _ = sender.send(reply);
                        } else {
                            debug!(message_id, "reply for unknown or already-timed-out request");
                        }
                    }
                    Err(error) => {
                        warn!(%error, "request channel read failed");
                        break;
                    }
                }
            }
            reader_closed.store(true, Ordering::SeqCst);
            let stale: Vec<u32> = reader_pending.iter().map(|e| *e.key()).collect();
            for id in stale {
                if let Some((_, sender)) = reader_pending.remove(&id) {
                    let _ = sender.send(Err(HyperspaceError::ProtocolError(
                        "connection closed".to_owned(),
                    )));
                }
            }
            reader_disconnected.notify_waiters();
        });

        Ok(Self { next_message_id: AtomicU32::new(1), pending, outbox, closed, disconnected })
    }

    /// Whether the channel still believes its socket is live. A `false`
    /// result is authoritative; a `true` result is optimistic (the peer
    /// may have vanished without a TCP-level signal yet).
    #[must_use]
    pub fn is_connected(&self) -> bool {
        !self.closed.load(Ordering::SeqCst)
    }

    /// Issue `request` and await its correlated reply, or
    /// [`ClientError::Timeout`]/[`ClientError::Disconnected`] if it
    /// never arrives.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Disconnected`] if the channel's socket has
    /// already closed, [`ClientError::Timeout`] if no reply arrives
    /// within the call deadline, or [`ClientError::Server`] if the reply
    /// carries a `spec.md` §6 error code.
    pub async fn call(&self, request: Request, thread_group: u32) -> Result<Reply, ClientError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ClientError::Disconnected);
        }

        let message_id = self.next_message_id.fetch_add(1, Ordering::Relaxed);
        let command = request.command();
        let mut payload = BytesMut::new();
        request.encode(&mut payload);
        let header = Header::new(command, message_id, thread_group);
        let frame = Frame { header, payload: payload.freeze() };

        let (tx, rx) = oneshot::channel();
        self.pending.insert(message_id, tx);

        if self.outbox.send(frame).is_err() {
            self.pending.remove(&message_id);
            return Err(ClientError::Disconnected);
        }

        match tokio::time::timeout(CALL_TIMEOUT, rx).await {
            Ok(Ok(Ok(reply))) => Ok(reply),
            Ok(Ok(Err(error))) => Err(ClientError::Server(error)),
            Ok(Err(_canceled)) => Err(ClientError::Disconnected),
            Err(_elapsed) => {
                self.pending.remove(&message_id);
                Err(ClientError::Timeout)
            }
        }
    }
}

fn decode_reply(header: &Header, payload: &mut bytes::Bytes) -> Result<Reply, HyperspaceError> {
    if header.flags.has(hyperspace_proto::Flags::ERROR) {
        use bytes::Buf;
        let code = if payload.remaining() >= 4 { payload.get_i32_le() } else { -1 };
        return Err(HyperspaceError::from_wire(code, String::new())
            .unwrap_or_else(|| HyperspaceError::ProtocolError(format!("unknown error code {code}"))));
    }
    Reply::decode(header.command, payload)
        .map_err(|error| HyperspaceError::ProtocolError(error.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::{BufMut, BytesMut};
    use hyperspace_proto::CommandCode;

    #[test]
    fn decode_reply_reads_error_code_from_an_error_flagged_frame() {
        let mut header = Header::new(CommandCode::Open, 1, 0);
        header.flags = hyperspace_proto::Flags(hyperspace_proto::Flags::RESPONSE | hyperspace_proto::Flags::ERROR);
        let mut buf = BytesMut::new();
        buf.put_i32_le(HyperspaceError::LockConflict(String::new()).wire_code());
        let mut payload = buf.freeze();

        let error = decode_reply(&header, &mut payload).unwrap_err();
        assert!(matches!(error, HyperspaceError::LockConflict(_)));
    }

    #[test]
    fn decode_reply_decodes_a_successful_payload() {
        let header = Header::new(CommandCode::Status, 1, 0);
        let reply = Reply::Status { generation: 4, session_count: 1 };
        let mut buf = BytesMut::new();
        reply.encode(&mut buf);
        let mut payload = buf.freeze();

        assert_eq!(decode_reply(&header, &mut payload).unwrap(), reply);
    }
}

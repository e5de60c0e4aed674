//! Errors raised by the client keepalive engine and its request channel.
//!
//! [`hyperspace_core::HyperspaceError`] is still the type carried back
//! from a successful round trip to the server (a precondition failure,
//! `expired-session`, ...); [`ClientError`] wraps it with the failure
//! modes that only exist on the client side of the wire: a dead
//! connection, a timed-out call, or the session having moved to
//! `jeopardy`/`expired` underneath an in-flight request.

use thiserror::Error;

/// Errors raised by [`crate::ClientEngine`] and [`crate::Client`].
#[derive(Debug, Error)]
pub enum ClientError {
    /// The server's reply carried a `spec.md` §6 error code.
    #[error(transparent)]
    Server(#[from] hyperspace_core::HyperspaceError),

    /// The wire codec rejected a frame (malformed or oversized).
    #[error("protocol error: {0}")]
    Protocol(#[from] hyperspace_proto::ProtoError),

    /// The TCP request channel is not currently connected. The caller
    /// should retry; the engine's reconnect loop is independently
    /// racing to restore it.
    #[error("request channel disconnected, retry")]
    Disconnected,

    /// The session is in `jeopardy` or has not yet completed its
    /// handshake; synchronous calls block here until the state resolves
    /// rather than racing the server (`spec.md` §4.5: "application
    /// requests block").
    #[error("session expired")]
    SessionExpired,

    /// A call's deadline elapsed before a reply arrived. Per `spec.md`
    /// §7, this does not invalidate the session; the caller may retry.
    #[error("request timed out")]
    Timeout,

    /// An I/O error on the UDP or TCP socket.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

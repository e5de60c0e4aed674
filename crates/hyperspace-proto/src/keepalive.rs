//! The keepalive datagram exchanged every `Hyperspace.KeepAlive.Interval`
//! between client and server (`spec.md` §6, §4.5).

use bytes::{Buf, BufMut};
use hyperspace_core::SessionId;

use crate::codec::ProtoError;
use crate::notification::Notification;

/// Sent by the client: renews the lease and acknowledges delivered
/// notifications up to `last_known_event_id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientKeepalive {
    /// The session being renewed.
    pub session_id: SessionId,
    /// The highest event id the client has processed; the server may
    /// drop its reference-counted hold on any earlier event once every
    /// recipient has acknowledged past it.
    pub last_known_event_id: i64,
    /// True if the client is shutting down this session deliberately.
    pub shutdown: bool,
}

impl ClientKeepalive {
    /// Encode this datagram into `dst`.
    pub fn encode(&self, dst: &mut impl BufMut) {
        dst.put_i64_le(self.session_id.get() as i64);
        dst.put_i64_le(self.last_known_event_id);
        dst.put_u8(u8::from(self.shutdown));
    }

    /// Decode a client keepalive datagram.
    ///
    /// # Errors
    ///
    /// Returns [`ProtoError::Truncated`] if `src` is shorter than the
    /// fixed datagram size.
    pub fn decode(src: &mut impl Buf) -> Result<Self, ProtoError> {
        if src.remaining() < 17 {
            return Err(ProtoError::Truncated);
        }
        let session_id = SessionId::new(src.get_i64_le() as u64);
        let last_known_event_id = src.get_i64_le();
        let shutdown = src.get_u8() != 0;
        Ok(Self { session_id, last_known_event_id, shutdown })
    }
}

/// Sent by the server in reply: reports session health and any pending
/// notifications.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerKeepalive {
    /// The session this reply concerns.
    pub session_id: SessionId,
    /// Zero if the session is alive; otherwise the error code from
    /// `spec.md` §6 (almost always `expired-session`).
    pub error: i32,
    /// Notifications queued for this session's handles since the last
    /// acknowledged event.
    pub notifications: Vec<Notification>,
}

impl ServerKeepalive {
    /// Encode this datagram into `dst`.
    pub fn encode(&self, dst: &mut impl BufMut) {
        dst.put_i64_le(self.session_id.get() as i64);
        dst.put_i32_le(self.error);
        dst.put_i32_le(self.notifications.len() as i32);
        for notification in &self.notifications {
            notification.encode(dst);
        }
    }

    /// Decode a server keepalive datagram.
    ///
    /// # Errors
    ///
    /// Returns [`ProtoError::Truncated`] if `src` is shorter than the
    /// header it claims, or propagates a notification decode error.
    pub fn decode(src: &mut impl Buf) -> Result<Self, ProtoError> {
        if src.remaining() < 16 {
            return Err(ProtoError::Truncated);
        }
        let session_id = SessionId::new(src.get_i64_le() as u64);
        let error = src.get_i32_le();
        let count = src.get_i32_le();
        if count < 0 {
            return Err(ProtoError::BadTail);
        }
        let mut notifications = Vec::with_capacity(count as usize);
        for _ in 0..count {
            notifications.push(Notification::decode(src)?);
        }
        Ok(Self { session_id, error, notifications })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notification::NotificationTail;
    use hyperspace_core::{EventId, HandleId};

    #[test]
    fn client_keepalive_roundtrips() {
        let msg = ClientKeepalive {
            session_id: SessionId::new(1),
            last_known_event_id: 99,
            shutdown: false,
        };
        let mut buf = Vec::new();
        msg.encode(&mut buf);
        let mut cursor = &buf[..];
        assert_eq!(ClientKeepalive::decode(&mut cursor).unwrap(), msg);
    }

    #[test]
    fn server_keepalive_with_notifications_roundtrips() {
        let msg = ServerKeepalive {
            session_id: SessionId::new(2),
            error: 0,
            notifications: vec![Notification {
                handle: HandleId::new(1),
                event_id: EventId::new(1),
                event_mask: 0,
                tail: NotificationTail::LockReleased,
            }],
        };
        let mut buf = Vec::new();
        msg.encode(&mut buf);
        let mut cursor = &buf[..];
        assert_eq!(ServerKeepalive::decode(&mut cursor).unwrap(), msg);
    }
}

//! Notification records carried inbound on the keepalive datagram
//! (`spec.md` §6): `(handle, event_id, event_mask, kind-specific tail)`.

use bytes::{Buf, BufMut};
use hyperspace_core::{EventId, HandleId, LockMode};

use crate::codec::ProtoError;
use crate::primitives::{get_vstr, put_vstr};

/// The bits distinguishing a notification's tail encoding.
const TAIL_NAMED: u8 = 0;
const TAIL_LOCK_ACQUIRED: u8 = 1;
const TAIL_LOCK_RELEASED: u8 = 2;
const TAIL_LOCK_GRANTED: u8 = 3;

/// The kind-specific payload following the common notification prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationTail {
    /// `attr-set`, `attr-del`, `child-added`, or `child-removed`: carries
    /// the attribute or child name.
    Named(String),
    /// `lock-acquired`: carries the mode acquired.
    LockAcquired(LockMode),
    /// `lock-released`: carries nothing further.
    LockReleased,
    /// `lock-granted`: carries the granted mode and new generation.
    LockGranted {
        /// The mode the waiter was granted.
        mode: LockMode,
        /// The lock's generation as of this grant.
        generation: u64,
    },
}

/// One notification queued for a handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    /// The handle this notification is addressed to.
    pub handle: HandleId,
    /// The event this notification reports.
    pub event_id: EventId,
    /// The mask bit the handle's mask matched, or 0 for `lock-granted`.
    pub event_mask: u32,
    /// The kind-specific tail.
    pub tail: NotificationTail,
}

impl Notification {
    /// Encode this notification into `dst`.
    pub fn encode(&self, dst: &mut impl BufMut) {
        dst.put_i64_le(self.handle.get() as i64);
        dst.put_i64_le(self.event_id.get() as i64);
        dst.put_i32_le(self.event_mask as i32);
        match &self.tail {
            NotificationTail::Named(name) => {
                dst.put_u8(TAIL_NAMED);
                put_vstr(dst, name);
            }
            NotificationTail::LockAcquired(mode) => {
                dst.put_u8(TAIL_LOCK_ACQUIRED);
                dst.put_i32_le(mode.to_wire());
            }
            NotificationTail::LockReleased => {
                dst.put_u8(TAIL_LOCK_RELEASED);
            }
            NotificationTail::LockGranted { mode, generation } => {
                dst.put_u8(TAIL_LOCK_GRANTED);
                dst.put_i32_le(mode.to_wire());
                dst.put_i64_le(*generation as i64);
            }
        }
    }

    /// Decode one notification from `src`.
    ///
    /// # Errors
    ///
    /// Returns [`ProtoError::Truncated`] or [`ProtoError::BadTail`] if the
    /// buffer does not hold a well-formed notification.
    pub fn decode(src: &mut impl Buf) -> Result<Self, ProtoError> {
        if src.remaining() < 21 {
            return Err(ProtoError::Truncated);
        }
        let handle = HandleId::new(src.get_i64_le() as u64);
        let event_id = EventId::new(src.get_i64_le() as u64);
        let event_mask = src.get_i32_le() as u32;
        let tail_kind = src.get_u8();
        let tail = match tail_kind {
            TAIL_NAMED => NotificationTail::Named(get_vstr(src)?),
            TAIL_LOCK_ACQUIRED => {
                let mode = LockMode::from_wire(src.get_i32_le()).ok_or(ProtoError::BadTail)?;
                NotificationTail::LockAcquired(mode)
            }
            TAIL_LOCK_RELEASED => NotificationTail::LockReleased,
            TAIL_LOCK_GRANTED => {
                let mode = LockMode::from_wire(src.get_i32_le()).ok_or(ProtoError::BadTail)?;
                let generation = src.get_i64_le() as u64;
                NotificationTail::LockGranted { mode, generation }
            }
            _ => return Err(ProtoError::BadTail),
        };
        Ok(Self { handle, event_id, event_mask, tail })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn named_notification_roundtrips() {
        let note = Notification {
            handle: HandleId::new(3),
            event_id: EventId::new(9),
            event_mask: 0x01,
            tail: NotificationTail::Named("lock.generation".to_owned()),
        };
        let mut buf = Vec::new();
        note.encode(&mut buf);
        let mut cursor = &buf[..];
        assert_eq!(Notification::decode(&mut cursor).unwrap(), note);
    }

    #[test]
    fn lock_granted_roundtrips() {
        let note = Notification {
            handle: HandleId::new(1),
            event_id: EventId::new(2),
            event_mask: 0,
            tail: NotificationTail::LockGranted { mode: LockMode::Exclusive, generation: 5 },
        };
        let mut buf = Vec::new();
        note.encode(&mut buf);
        let mut cursor = &buf[..];
        assert_eq!(Notification::decode(&mut cursor).unwrap(), note);
    }
}

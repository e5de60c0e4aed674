//! The fixed-layout message header shared by every datagram and TCP
//! message (`spec.md` §6).

use bytes::{Buf, BufMut};

use crate::codec::ProtoError;
use crate::command::CommandCode;

/// Identifies this as a Hyperspace message, distinguishing it from any
/// other protocol that might share a port during a rolling upgrade.
pub const PROTOCOL_ID: u8 = 0x01;

/// Header flag bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Flags(pub u16);

impl Flags {
    /// No flags set.
    pub const NONE: u16 = 0x00;
    /// This message is a reply to an earlier request, not a new request.
    pub const RESPONSE: u16 = 0x01;
    /// The sender will not wait for a reply (fire-and-forget).
    pub const NO_REPLY: u16 = 0x02;
    /// This reply carries an error code instead of a `Reply` payload; the
    /// body is a single little-endian `i32` error code.
    pub const ERROR: u16 = 0x04;

    /// True if the given bit(s) are set.
    #[must_use]
    pub const fn has(self, bits: u16) -> bool {
        self.0 & bits == bits
    }
}

/// The fixed-size header prefixing every Hyperspace message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// The command this message carries.
    pub command: CommandCode,
    /// Header flag bits.
    pub flags: Flags,
    /// Total message length, header included.
    pub total_length: u32,
    /// Length of this header, in bytes (fixed, but carried for forward
    /// compatibility with future header extensions).
    pub header_length: u32,
    /// Id used to correlate a reply with its request.
    pub message_id: u32,
    /// Thread-group id; requests sharing a non-zero group never run
    /// concurrently on the server (`spec.md` §5).
    pub thread_group: u32,
}

impl Header {
    /// Size of the encoded header, in bytes.
    pub const ENCODED_LEN: usize = 21;

    /// Build a request header with an empty payload; callers fix up
    /// `total_length` once the payload is known.
    #[must_use]
    pub const fn new(command: CommandCode, message_id: u32, thread_group: u32) -> Self {
        Self {
            command,
            flags: Flags(Flags::NONE),
            total_length: Self::ENCODED_LEN as u32,
            header_length: Self::ENCODED_LEN as u32,
            message_id,
            thread_group,
        }
    }

    /// Encode this header into `dst`.
    pub fn encode(&self, dst: &mut impl BufMut) {
        dst.put_u8(PROTOCOL_ID);
        dst.put_u16_le(self.command.to_wire());
        dst.put_u16_le(self.flags.0);
        dst.put_u32_le(self.total_length);
        dst.put_u32_le(self.header_length);
        dst.put_u32_le(self.message_id);
        dst.put_u32_le(self.thread_group);
    }

    /// Decode a header from the front of `src`, which must hold at least
    /// [`Self::ENCODED_LEN`] bytes.
    ///
    /// # Errors
    ///
    /// Returns [`ProtoError::UnknownProtocol`] or [`ProtoError::UnknownCommand`]
    /// if the protocol id or command code is not recognised.
    pub fn decode(src: &mut impl Buf) -> Result<Self, ProtoError> {
        let protocol_id = src.get_u8();
        if protocol_id != PROTOCOL_ID {
            return Err(ProtoError::UnknownProtocol(protocol_id));
        }
        let command_raw = src.get_u16_le();
        let command = CommandCode::from_wire(command_raw)
            .ok_or(ProtoError::UnknownCommand(command_raw))?;
        let flags = Flags(src.get_u16_le());
        let total_length = src.get_u32_le();
        let header_length = src.get_u32_le();
        let message_id = src.get_u32_le();
        let thread_group = src.get_u32_le();
        Ok(Self { command, flags, total_length, header_length, message_id, thread_group })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_roundtrips() {
        let header = Header::new(CommandCode::Open, 7, 42);
        let mut buf = Vec::new();
        header.encode(&mut buf);
        assert_eq!(buf.len(), Header::ENCODED_LEN);

        let mut cursor = &buf[..];
        let decoded = Header::decode(&mut cursor).expect("decode");
        assert_eq!(decoded, header);
    }

    #[test]
    fn unknown_protocol_id_is_rejected() {
        let mut buf = vec![0xFFu8];
        buf.extend_from_slice(&[0u8; Header::ENCODED_LEN - 1]);
        let mut cursor = &buf[..];
        assert!(matches!(Header::decode(&mut cursor), Err(ProtoError::UnknownProtocol(0xFF))));
    }
}

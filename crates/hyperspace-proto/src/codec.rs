//! Frames TCP messages as header-prefixed, length-delimited byte ranges.
//!
//! Payload interpretation is left to the caller: [`MessageCodec`] only
//! guarantees that each decoded item is a complete `(Header, payload)`
//! pair, matching the `total_length` the header claims.

use bytes::{Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::header::Header;

/// Errors raised while encoding or decoding a Hyperspace message.
#[derive(Debug, thiserror::Error)]
pub enum ProtoError {
    /// Buffer held fewer bytes than the field or header being decoded needs.
    #[error("truncated message")]
    Truncated,
    /// A `vstr` payload was not valid UTF-8.
    #[error("invalid utf-8 in string field: {0}")]
    Utf8(#[source] std::str::Utf8Error),
    /// A notification or keepalive tail carried an unrecognised kind byte.
    #[error("malformed tail")]
    BadTail,
    /// The header's protocol id did not match [`crate::header::PROTOCOL_ID`].
    #[error("unknown protocol id {0}")]
    UnknownProtocol(u8),
    /// The header's command id is outside the known command set.
    #[error("unknown command id {0}")]
    UnknownCommand(u16),
    /// `total_length` exceeded the codec's configured maximum.
    #[error("message of {0} bytes exceeds the maximum of {1}")]
    TooLarge(u32, u32),
    /// Underlying I/O error from the transport.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// A decoded TCP message: its header and the raw payload bytes following it.
#[derive(Debug, Clone)]
pub struct Frame {
    /// The message header.
    pub header: Header,
    /// The payload, excluding the header itself.
    pub payload: Bytes,
}

/// Frames messages over a length-delimited, header-prefixed wire format.
///
/// Mirrors the shape of a standard `tokio_util` length-delimited codec,
/// but reads the length out of the Hyperspace header rather than a bare
/// length prefix, and caps message size to guard against a malformed or
/// hostile peer.
#[derive(Debug, Clone, Copy)]
pub struct MessageCodec {
    max_message_len: u32,
}

impl MessageCodec {
    /// Build a codec that rejects messages larger than `max_message_len`.
    #[must_use]
    pub const fn new(max_message_len: u32) -> Self {
        Self { max_message_len }
    }
}

impl Default for MessageCodec {
    /// 16 MiB, generous for attribute payloads while still bounding a
    /// malicious peer's ability to force unbounded buffering.
    fn default() -> Self {
        Self::new(16 * 1024 * 1024)
    }
}

impl Decoder for MessageCodec {
    type Item = Frame;
    type Error = ProtoError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < Header::ENCODED_LEN {
            return Ok(None);
        }

        let mut peek = &src[..Header::ENCODED_LEN];
        let header = Header::decode(&mut peek)?;

        if header.total_length > self.max_message_len {
            return Err(ProtoError::TooLarge(header.total_length, self.max_message_len));
        }
        let total_length = header.total_length as usize;
        if total_length < Header::ENCODED_LEN {
            return Err(ProtoError::Truncated);
        }
        if src.len() < total_length {
            src.reserve(total_length - src.len());
            return Ok(None);
        }

        let mut frame_bytes = src.split_to(total_length).freeze();
        let payload = frame_bytes.split_off(Header::ENCODED_LEN);
        Ok(Some(Frame { header, payload }))
    }
}

impl Encoder<Frame> for MessageCodec {
    type Error = ProtoError;

    fn encode(&mut self, item: Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let total_length = Header::ENCODED_LEN + item.payload.len();
        let mut header = item.header;
        header.total_length = total_length as u32;
        dst.reserve(total_length);
        header.encode(dst);
        dst.extend_from_slice(&item.payload);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::CommandCode;

    #[test]
    fn frame_roundtrips_through_the_codec() {
        let mut codec = MessageCodec::default();
        let header = Header::new(CommandCode::Status, 1, 0);
        let frame = Frame { header, payload: Bytes::from_static(b"hello") };

        let mut buf = BytesMut::new();
        codec.encode(frame.clone(), &mut buf).unwrap();

        let decoded = codec.decode(&mut buf).unwrap().expect("a full frame");
        assert_eq!(decoded.header.command, CommandCode::Status);
        assert_eq!(decoded.payload, frame.payload);
        assert!(buf.is_empty());
    }

    #[test]
    fn partial_frame_waits_for_more_bytes() {
        let mut codec = MessageCodec::default();
        let header = Header::new(CommandCode::Status, 1, 0);
        let frame = Frame { header, payload: Bytes::from_static(b"hello") };

        let mut buf = BytesMut::new();
        codec.encode(frame, &mut buf).unwrap();
        let mut partial = buf.split_to(Header::ENCODED_LEN + 1);

        assert!(codec.decode(&mut partial).unwrap().is_none());
    }

    #[test]
    fn oversized_message_is_rejected() {
        let mut codec = MessageCodec::new(10);
        let mut header = Header::new(CommandCode::Status, 1, 0);
        header.total_length = 1000;
        let mut buf = BytesMut::new();
        header.encode(&mut buf);
        buf.extend_from_slice(&[0u8; 5]);

        assert!(matches!(codec.decode(&mut buf), Err(ProtoError::TooLarge(1000, 10))));
    }
}

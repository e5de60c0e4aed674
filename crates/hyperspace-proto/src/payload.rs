//! Typed request/reply payloads for every TCP command (`spec.md` §4.6,
//! §6). [`crate::keepalive`] covers the UDP-only `Keepalive` command
//! separately; everything else travels as a [`Request`]/[`Reply`] pair
//! framed by [`crate::codec::MessageCodec`].

use bytes::{Buf, BufMut};
use hyperspace_core::{EventId, HandleId, LockMode, SessionId};

use crate::codec::ProtoError;
use crate::command::CommandCode;
use crate::primitives::{get_bytes32, get_vstr, put_bytes32, put_vstr};

fn put_id(dst: &mut impl BufMut, raw: u64) {
    dst.put_i64_le(raw as i64);
}

fn get_id(src: &mut impl Buf) -> Result<u64, ProtoError> {
    if src.remaining() < 8 {
        return Err(ProtoError::Truncated);
    }
    Ok(src.get_i64_le() as u64)
}

fn put_attr(dst: &mut impl BufMut, name: &str, value: &[u8]) {
    put_vstr(dst, name);
    put_bytes32(dst, value);
}

fn get_attr(src: &mut impl Buf) -> Result<(String, Vec<u8>), ProtoError> {
    let name = get_vstr(src)?;
    let value = get_bytes32(src)?;
    Ok((name, value))
}

fn put_name_list(dst: &mut impl BufMut, names: &[String]) {
    dst.put_u32_le(names.len() as u32);
    for name in names {
        put_vstr(dst, name);
    }
}

fn get_name_list(src: &mut impl Buf) -> Result<Vec<String>, ProtoError> {
    if src.remaining() < 4 {
        return Err(ProtoError::Truncated);
    }
    let count = src.get_u32_le();
    let mut names = Vec::with_capacity(count as usize);
    for _ in 0..count {
        names.push(get_vstr(src)?);
    }
    Ok(names)
}

fn put_lock_mode(dst: &mut impl BufMut, mode: LockMode) {
    dst.put_i32_le(mode.to_wire());
}

fn get_lock_mode(src: &mut impl Buf) -> Result<LockMode, ProtoError> {
    if src.remaining() < 4 {
        return Err(ProtoError::Truncated);
    }
    LockMode::from_wire(src.get_i32_le()).ok_or(ProtoError::BadTail)
}

/// The arguments for every request command, decoded from a TCP message
/// body.
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    /// First message on a new TCP connection: binds it to `session_id`
    /// (already assigned over UDP) under a human-readable `client_name`.
    Handshake {
        /// The session id assigned by the initial UDP keepalive exchange.
        session_id: SessionId,
        /// The name the client identifies itself by.
        client_name: String,
    },
    /// Create (optionally) and open `path`.
    Open {
        /// The path to open.
        path: String,
        /// Raw `OpenFlags` bits.
        flags: u32,
        /// Raw `EventMask` bits.
        event_mask: u32,
        /// Attributes to set if this call creates the node.
        initial_attrs: Vec<(String, Vec<u8>)>,
    },
    /// Query a node's existence and lock state without opening it.
    Stat {
        /// The path to stat.
        path: String,
    },
    /// Cancel `handle`'s queued lock request, if any.
    Cancel {
        /// The handle whose pending request should be cancelled.
        handle: HandleId,
    },
    /// Close `handle`.
    Close {
        /// The handle to close.
        handle: HandleId,
    },
    /// Force a session to expire immediately (administrative).
    Poison {
        /// The session to expire.
        session_id: SessionId,
    },
    /// Create an interior node.
    Mkdir {
        /// The path to create.
        path: String,
    },
    /// Set an extended attribute through `handle`.
    AttrSet {
        /// The handle the attribute is set through.
        handle: HandleId,
        /// The attribute name.
        name: String,
        /// The attribute value.
        value: Vec<u8>,
    },
    /// Read an extended attribute through `handle`.
    AttrGet {
        /// The handle the attribute is read through.
        handle: HandleId,
        /// The attribute name.
        name: String,
    },
    /// Delete an extended attribute through `handle`.
    AttrDel {
        /// The handle the attribute is deleted through.
        handle: HandleId,
        /// The attribute name.
        name: String,
    },
    /// Test whether an extended attribute exists on `handle`'s node.
    AttrExists {
        /// The handle the attribute is tested through.
        handle: HandleId,
        /// The attribute name.
        name: String,
    },
    /// List every extended attribute on `handle`'s node.
    AttrList {
        /// The handle whose node's attributes are listed.
        handle: HandleId,
    },
    /// Test whether a path exists.
    Exists {
        /// The path to test.
        path: String,
    },
    /// Remove a node.
    Delete {
        /// The path to remove.
        path: String,
    },
    /// List the children of `handle`'s node.
    Readdir {
        /// The handle whose node's children are listed.
        handle: HandleId,
    },
    /// Acquire a lock on `handle`'s node.
    Lock {
        /// The handle acquiring the lock.
        handle: HandleId,
        /// The mode requested.
        mode: LockMode,
        /// If true, fail with `busy` instead of enqueuing.
        try_lock: bool,
    },
    /// Release `handle`'s held lock.
    Release {
        /// The handle releasing the lock.
        handle: HandleId,
    },
    /// Validate a previously granted sequencer against current state.
    CheckSequencer {
        /// The node the sequencer claims to be locked.
        node: String,
        /// The mode it claims to hold.
        mode: LockMode,
        /// The generation it claims to hold.
        generation: u64,
    },
    /// Query server liveness and the base-directory generation counter.
    Status,
}

impl Request {
    /// The command code this request's payload is framed under.
    #[must_use]
    pub const fn command(&self) -> CommandCode {
        match self {
            Self::Handshake { .. } => CommandCode::Handshake,
            Self::Open { .. } => CommandCode::Open,
            Self::Stat { .. } => CommandCode::Stat,
            Self::Cancel { .. } => CommandCode::Cancel,
            Self::Close { .. } => CommandCode::Close,
            Self::Poison { .. } => CommandCode::Poison,
            Self::Mkdir { .. } => CommandCode::Mkdir,
            Self::AttrSet { .. } => CommandCode::AttrSet,
            Self::AttrGet { .. } => CommandCode::AttrGet,
            Self::AttrDel { .. } => CommandCode::AttrDel,
            Self::AttrExists { .. } => CommandCode::AttrExists,
            Self::AttrList { .. } => CommandCode::AttrList,
            Self::Exists { .. } => CommandCode::Exists,
            Self::Delete { .. } => CommandCode::Delete,
            Self::Readdir { .. } => CommandCode::Readdir,
            Self::Lock { .. } => CommandCode::Lock,
            Self::Release { .. } => CommandCode::Release,
            Self::CheckSequencer { .. } => CommandCode::CheckSequencer,
            Self::Status => CommandCode::Status,
        }
    }

    /// Encode the payload (header-exclusive) for this request.
    pub fn encode(&self, dst: &mut impl BufMut) {
        match self {
            Self::Handshake { session_id, client_name } => {
                put_id(dst, session_id.get());
                put_vstr(dst, client_name);
            }
            Self::Open { path, flags, event_mask, initial_attrs } => {
                put_vstr(dst, path);
                dst.put_u32_le(*flags);
                dst.put_u32_le(*event_mask);
                dst.put_u32_le(initial_attrs.len() as u32);
                for (name, value) in initial_attrs {
                    put_attr(dst, name, value);
                }
            }
            Self::Stat { path } | Self::Mkdir { path } | Self::Exists { path } | Self::Delete { path } => {
                put_vstr(dst, path);
            }
            Self::Cancel { handle } | Self::Close { handle } | Self::AttrList { handle }
            | Self::Readdir { handle } | Self::Release { handle } => {
                put_id(dst, handle.get());
            }
            Self::Poison { session_id } => put_id(dst, session_id.get()),
            Self::AttrSet { handle, name, value } => {
                put_id(dst, handle.get());
                put_attr(dst, name, value);
            }
            Self::AttrGet { handle, name } | Self::AttrDel { handle, name } | Self::AttrExists { handle, name } => {
                put_id(dst, handle.get());
                put_vstr(dst, name);
            }
            Self::Lock { handle, mode, try_lock } => {
                put_id(dst, handle.get());
                put_lock_mode(dst, *mode);
                dst.put_u8(u8::from(*try_lock));
            }
            Self::CheckSequencer { node, mode, generation } => {
                put_vstr(dst, node);
                put_lock_mode(dst, *mode);
                dst.put_i64_le(*generation as i64);
            }
            Self::Status => {}
        }
    }

    /// Decode a request payload for `command`.
    ///
    /// # Errors
    ///
    /// Returns [`ProtoError::Truncated`]/[`ProtoError::BadTail`] if the
    /// payload does not match the shape `command` expects.
    pub fn decode(command: CommandCode, src: &mut impl Buf) -> Result<Self, ProtoError> {
        Ok(match command {
            CommandCode::Keepalive => return Err(ProtoError::BadTail),
            CommandCode::Handshake => {
                let session_id = SessionId::new(get_id(src)?);
                let client_name = get_vstr(src)?;
                Self::Handshake { session_id, client_name }
            }
            CommandCode::Open => {
                let path = get_vstr(src)?;
                if src.remaining() < 12 {
                    return Err(ProtoError::Truncated);
                }
                let flags = src.get_u32_le();
                let event_mask = src.get_u32_le();
                let count = src.get_u32_le();
                let mut initial_attrs = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    initial_attrs.push(get_attr(src)?);
                }
                Self::Open { path, flags, event_mask, initial_attrs }
            }
            CommandCode::Stat => Self::Stat { path: get_vstr(src)? },
            CommandCode::Cancel => Self::Cancel { handle: HandleId::new(get_id(src)?) },
            CommandCode::Close => Self::Close { handle: HandleId::new(get_id(src)?) },
            CommandCode::Poison => Self::Poison { session_id: SessionId::new(get_id(src)?) },
            CommandCode::Mkdir => Self::Mkdir { path: get_vstr(src)? },
            CommandCode::AttrSet => {
                let handle = HandleId::new(get_id(src)?);
                let (name, value) = get_attr(src)?;
                Self::AttrSet { handle, name, value }
            }
            CommandCode::AttrGet => {
                let handle = HandleId::new(get_id(src)?);
                Self::AttrGet { handle, name: get_vstr(src)? }
            }
            CommandCode::AttrDel => {
                let handle = HandleId::new(get_id(src)?);
                Self::AttrDel { handle, name: get_vstr(src)? }
            }
            CommandCode::AttrExists => {
                let handle = HandleId::new(get_id(src)?);
                Self::AttrExists { handle, name: get_vstr(src)? }
            }
            CommandCode::AttrList => Self::AttrList { handle: HandleId::new(get_id(src)?) },
            CommandCode::Exists => Self::Exists { path: get_vstr(src)? },
            CommandCode::Delete => Self::Delete { path: get_vstr(src)? },
            CommandCode::Readdir => Self::Readdir { handle: HandleId::new(get_id(src)?) },
            CommandCode::Lock => {
                let handle = HandleId::new(get_id(src)?);
                let mode = get_lock_mode(src)?;
                if src.remaining() < 1 {
                    return Err(ProtoError::Truncated);
                }
                let try_lock = src.get_u8() != 0;
                Self::Lock { handle, mode, try_lock }
            }
            CommandCode::Release => Self::Release { handle: HandleId::new(get_id(src)?) },
            CommandCode::CheckSequencer => {
                let node = get_vstr(src)?;
                let mode = get_lock_mode(src)?;
                if src.remaining() < 8 {
                    return Err(ProtoError::Truncated);
                }
                let generation = src.get_i64_le() as u64;
                Self::CheckSequencer { node, mode, generation }
            }
            CommandCode::Status => Self::Status,
        })
    }
}

/// The successful-result payload for a request, mirroring [`Request`]'s
/// variants one for one. A failed request instead carries an empty
/// payload and its `total_length`/error code on the header's sibling
/// error channel (`spec.md` §6: "error codes"); see
/// [`crate::command::CommandCode`] and the server's reply encoder for how
/// the two are combined over the wire.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// Handshake acknowledged; nothing further to report.
    Handshake,
    /// The handle opened and whether this call created the node, plus
    /// the outcome of an atomic lock request (if any was made).
    Open {
        /// The newly allocated handle.
        handle: HandleId,
        /// True if this call created the node.
        created: bool,
        /// Set if `flags` requested an atomic lock and it was granted.
        lock_generation: Option<u64>,
    },
    /// Whether the stat'd path exists, and its lock generation if so.
    Stat {
        /// Whether the node exists.
        exists: bool,
        /// The node's lock generation, 0 if it does not exist.
        lock_generation: u64,
    },
    /// Acknowledges a request with no further data.
    Ack,
    /// An attribute's value.
    AttrValue {
        /// The raw attribute bytes.
        value: Vec<u8>,
    },
    /// A yes/no test result.
    Bool {
        /// The test's result.
        value: bool,
    },
    /// A list of names (attribute names or child names).
    Names {
        /// The listed names.
        names: Vec<String>,
    },
    /// The outcome of a `lock` request.
    Lock {
        /// `0` = granted, `1` = busy, `2` = pending.
        status: u8,
        /// Set only when `status` is `granted`.
        generation: Option<u64>,
    },
    /// The base-directory generation counter and live session count.
    Status {
        /// The persisted base-directory generation counter.
        generation: u64,
        /// The number of sessions currently tracked in memory.
        session_count: u64,
    },
}

impl Reply {
    /// Encode this reply's payload.
    pub fn encode(&self, dst: &mut impl BufMut) {
        match self {
            Self::Handshake | Self::Ack => {}
            Self::Open { handle, created, lock_generation } => {
                put_id(dst, handle.get());
                dst.put_u8(u8::from(*created));
                match lock_generation {
                    Some(generation) => {
                        dst.put_u8(1);
                        dst.put_i64_le(*generation as i64);
                    }
                    None => dst.put_u8(0),
                }
            }
            Self::Stat { exists, lock_generation } => {
                dst.put_u8(u8::from(*exists));
                dst.put_i64_le(*lock_generation as i64);
            }
            Self::AttrValue { value } => put_bytes32(dst, value),
            Self::Bool { value } => dst.put_u8(u8::from(*value)),
            Self::Names { names } => put_name_list(dst, names),
            Self::Lock { status, generation } => {
                dst.put_u8(*status);
                match generation {
                    Some(generation) => {
                        dst.put_u8(1);
                        dst.put_i64_le(*generation as i64);
                    }
                    None => dst.put_u8(0),
                }
            }
            Self::Status { generation, session_count } => {
                dst.put_i64_le(*generation as i64);
                dst.put_i64_le(*session_count as i64);
            }
        }
    }

    /// Decode a reply payload for `command`.
    ///
    /// # Errors
    ///
    /// Returns [`ProtoError::Truncated`]/[`ProtoError::BadTail`] if the
    /// payload does not match the shape `command`'s reply expects.
    pub fn decode(command: CommandCode, src: &mut impl Buf) -> Result<Self, ProtoError> {
        Ok(match command {
            CommandCode::Handshake => Self::Handshake,
            CommandCode::Open => {
                let handle = HandleId::new(get_id(src)?);
                if src.remaining() < 2 {
                    return Err(ProtoError::Truncated);
                }
                let created = src.get_u8() != 0;
                let lock_generation = match src.get_u8() {
                    0 => None,
                    1 => {
                        if src.remaining() < 8 {
                            return Err(ProtoError::Truncated);
                        }
                        Some(src.get_i64_le() as u64)
                    }
                    _ => return Err(ProtoError::BadTail),
                };
                Self::Open { handle, created, lock_generation }
            }
            CommandCode::Stat => {
                if src.remaining() < 9 {
                    return Err(ProtoError::Truncated);
                }
                let exists = src.get_u8() != 0;
                let lock_generation = src.get_i64_le() as u64;
                Self::Stat { exists, lock_generation }
            }
            CommandCode::Cancel
            | CommandCode::Close
            | CommandCode::Poison
            | CommandCode::Mkdir
            | CommandCode::AttrSet
            | CommandCode::AttrDel
            | CommandCode::Delete
            | CommandCode::Release => Self::Ack,
            CommandCode::AttrGet => Self::AttrValue { value: get_bytes32(src)? },
            CommandCode::AttrExists | CommandCode::Exists => {
                if src.remaining() < 1 {
                    return Err(ProtoError::Truncated);
                }
                Self::Bool { value: src.get_u8() != 0 }
            }
            CommandCode::AttrList | CommandCode::Readdir => {
                Self::Names { names: get_name_list(src)? }
            }
            CommandCode::Lock => {
                if src.remaining() < 2 {
                    return Err(ProtoError::Truncated);
                }
                let status = src.get_u8();
                let generation = match src.get_u8() {
                    0 => None,
                    1 => {
                        if src.remaining() < 8 {
                            return Err(ProtoError::Truncated);
                        }
                        Some(src.get_i64_le() as u64)
                    }
                    _ => return Err(ProtoError::BadTail),
                };
                Self::Lock { status, generation }
            }
            CommandCode::CheckSequencer => {
                if src.remaining() < 1 {
                    return Err(ProtoError::Truncated);
                }
                Self::Bool { value: src.get_u8() != 0 }
            }
            CommandCode::Status => {
                if src.remaining() < 16 {
                    return Err(ProtoError::Truncated);
                }
                let generation = src.get_i64_le() as u64;
                let session_count = src.get_i64_le() as u64;
                Self::Status { generation, session_count }
            }
            CommandCode::Keepalive => return Err(ProtoError::BadTail),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_request_roundtrips() {
        let req = Request::Open {
            path: "/foo".to_owned(),
            flags: 0x0A,
            event_mask: 0x01,
            initial_attrs: vec![("name".to_owned(), b"Doug Judd".to_vec())],
        };
        let mut buf = Vec::new();
        req.encode(&mut buf);
        let mut cursor = &buf[..];
        assert_eq!(Request::decode(CommandCode::Open, &mut cursor).unwrap(), req);
    }

    #[test]
    fn lock_reply_roundtrips_when_granted() {
        let reply = Reply::Lock { status: 0, generation: Some(3) };
        let mut buf = Vec::new();
        reply.encode(&mut buf);
        let mut cursor = &buf[..];
        assert_eq!(Reply::decode(CommandCode::Lock, &mut cursor).unwrap(), reply);
    }

    #[test]
    fn status_reply_roundtrips() {
        let reply = Reply::Status { generation: 5, session_count: 2 };
        let mut buf = Vec::new();
        reply.encode(&mut buf);
        let mut cursor = &buf[..];
        assert_eq!(Reply::decode(CommandCode::Status, &mut cursor).unwrap(), reply);
    }

    #[test]
    fn handshake_request_roundtrips() {
        let req = Request::Handshake { session_id: SessionId::new(7), client_name: "worker-1".to_owned() };
        let mut buf = Vec::new();
        req.encode(&mut buf);
        let mut cursor = &buf[..];
        assert_eq!(Request::decode(CommandCode::Handshake, &mut cursor).unwrap(), req);
    }
}

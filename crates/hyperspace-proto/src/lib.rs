//! Wire protocol for the Hyperspace coordination service: the fixed
//! message header, the command code namespace, primitive field codecs,
//! and the keepalive datagram format.
//!
//! This crate is pure codec logic; it knows nothing about sessions,
//! locks, or the transactional store. `hyperspace-server` and
//! `hyperspace-client` both depend on it to speak the same wire format.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod codec;
pub mod command;
pub mod header;
pub mod keepalive;
pub mod notification;
pub mod payload;
pub mod primitives;

pub use codec::{Frame, MessageCodec, ProtoError};
pub use command::CommandCode;
pub use header::{Flags, Header};
pub use keepalive::{ClientKeepalive, ServerKeepalive};
pub use notification::{Notification, NotificationTail};
pub use payload::{Reply, Request};

//! The Client Keepalive Engine (`spec.md` §4.5): the UDP lease state
//! machine (`disconnected → safe ⇄ jeopardy → expired`), the TCP request
//! channel that carries every other command, and the synchronous-feeling
//! node/lock API ([`Client`]) applications call.
//!
//! `hyperspace-server` and this crate are the only two consumers of
//! `hyperspace-proto` that speak the wire format to each other; neither
//! depends on the other.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod callback;
pub mod connection;
pub mod engine;
pub mod error;
pub mod handle;
pub mod keepalive;
pub mod prelude;
pub mod state;

pub use callback::{HandleCallback, NullSessionCallback, SessionCallback};
pub use connection::RequestChannel;
pub use engine::{Client, LockOutcome, OpenResult};
pub use error::ClientError;
pub use handle::HandleTable;
pub use keepalive::KeepaliveLoop;
pub use state::{LeaseState, ReconnectPolicy};

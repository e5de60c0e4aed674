//! Hyperspace Core - data model shared by every Hyperspace component.
//!
//! This crate has no async runtime dependency and no I/O: it only defines
//! the identifiers, flags, and records that flow between the Session
//! Manager, the Namespace & Handle Store, the Lock Manager, the Event
//! Dispatcher, and the wire protocol.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod error;
pub mod event;
pub mod flags;
pub mod ids;
pub mod lock;
pub mod node;
pub mod prelude;

pub use error::{ErrorKind, HyperspaceError, HyperspaceResult};
pub use event::{Event, EventKind};
pub use flags::{EventMask, OpenFlags};
pub use ids::{EventId, HandleId, SessionId};
pub use lock::{LockGeneration, LockMode, LockSequencer, LockStatus};
pub use node::NodePath;

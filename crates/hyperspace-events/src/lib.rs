//! Event recording and in-process notification fan-out.
//!
//! Every state change that the wire protocol exposes as an event (attr
//! set/del, child added/removed, lock acquired/released/granted) is
//! recorded transactionally alongside the change that caused it, then
//! dispatched to an in-process bus that `hyperspace-session` drains into
//! per-session notification queues.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod bus;
pub mod dispatcher;
pub mod prelude;
pub mod record;

pub use bus::{DispatchedEvent, EventBus, EventReceiver, DEFAULT_CHANNEL_CAPACITY};
pub use dispatcher::{lock_acquired_should_emit, EventDispatcher, PendingDispatch};
pub use record::EventRecord;

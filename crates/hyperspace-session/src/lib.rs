//! The Session Manager: lease tracking, the handle-destruction cascade,
//! and the composed namespace/lock/event operations built on top of
//! `hyperspace-namespace`, `hyperspace-lock`, and `hyperspace-events`
//! (`spec.md` §4.1, §4.2).
//!
//! This is the first crate in the dependency order free to depend on
//! all three of those crates together, so every operation that touches
//! more than one of them — event-emitting `mkdir`/`unlink`/`open`/
//! `attr_set`/`attr_del`, and the four-transaction handle-destruction
//! algorithm — is composed here rather than in any of them.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod destroy;
pub mod manager;
pub mod ops;
pub mod prelude;
pub mod session;

pub use destroy::destroy_handle;
pub use manager::SessionManager;
pub use ops::{
    attr_del_with_events, attr_set_with_events, mkdir_with_events, open_with_events,
    unlink_with_events,
};
pub use session::{delete_session, get_session, put_session, QueuedNotification, SessionRecord, SessionState};

//! The node tree, handle table, and extended attributes: everything
//! `spec.md` §4.2 calls the Namespace & Handle Store.
//!
//! Lock state is embedded in [`NodeRecord`] (see its doc comment for
//! why), but the lock *behaviour* — acquire, release, grant-pending,
//! cancel — lives in `hyperspace-lock`, which depends on this crate.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod attr;
pub mod handle;
pub mod node;
pub mod ops;
pub mod prelude;

pub use handle::HandleRecord;
pub use node::{NodeRecord, Waiter};
pub use ops::{
    cleanup_if_unreferenced_ephemeral, detach_handle_from_node, exists, mkdir, open, readdir,
    unlink, OpenResult,
};

//! The lock manager: acquiring, releasing, and granting the shared and
//! exclusive locks described in `spec.md` §4.3.
//!
//! Lock *state* (mode, generation, holders, waiters) is embedded in
//! `hyperspace_namespace::NodeRecord` rather than owned here, because
//! every lock operation already needs the node record to validate the
//! path. This crate supplies the *behaviour* that operates on that
//! state, and depends on `hyperspace-namespace` rather than the reverse.
//! A caller that wants an atomic "open with lock" runs
//! `hyperspace_namespace::open` and [`lock_in_txn`] inside the same
//! transaction before committing.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod manager;
pub mod prelude;

pub use manager::{
    cancel_pending_in_txn, check_sequencer_in_txn, grant_pending_in_txn, lock_in_txn,
    release_in_txn,
};

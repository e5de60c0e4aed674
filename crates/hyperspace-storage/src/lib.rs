//! The transactional key-value store underlying every other Hyperspace
//! component: node metadata, handle and session tables, the event log,
//! and the persisted id counters all live here.
//!
//! Built on an embedded `SurrealKV` engine. Callers never see `SurrealKV`
//! types directly — [`Store`] and [`Transaction`] are the only surface.
//! Deterministic lock ordering across a multi-key mutation is the
//! caller's responsibility (`spec.md` §4.2: parent, then target, then
//! handle); this crate only guarantees that a losing transaction fails
//! cleanly with [`hyperspace_core::HyperspaceError::StoreDeadlock`] for
//! [`retry::with_retry`] to retry.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod error;
pub mod keys;
pub mod retry;
pub mod store;
pub mod txn;

pub use error::{StorageError, StorageResult};
pub use retry::with_retry;
pub use store::Store;
pub use txn::{bump_counter_in_txn, Transaction};

//! Convenience re-export of this crate's public surface.
//!
//! ```rust
//! use hyperspace_lock::prelude::*;
//! ```

pub use crate::manager::{
    cancel_pending_in_txn, check_sequencer_in_txn, grant_pending_in_txn, lock_in_txn,
    release_in_txn,
};

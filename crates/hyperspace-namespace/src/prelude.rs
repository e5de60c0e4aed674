//! Convenience re-export of this crate's public surface.
//!
//! ```rust
//! use hyperspace_namespace::prelude::*;
//! ```

pub use crate::attr::{attr_del, attr_exists, attr_get, attr_list, attr_set};
pub use crate::handle::{get_handle, put_handle, delete_handle, list_session_handles, HandleRecord};
pub use crate::node::{get_node, put_node, delete_node, NodeRecord, Waiter};
pub use crate::ops::{
    cleanup_if_unreferenced_ephemeral, detach_handle_from_node, exists, mkdir, open, readdir,
    unlink, OpenResult,
};

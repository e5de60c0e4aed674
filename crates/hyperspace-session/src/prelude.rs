//! Convenience re-export of this crate's public surface.
//!
//! ```rust
//! use hyperspace_session::prelude::*;
//! ```

pub use crate::destroy::destroy_handle;
pub use crate::manager::SessionManager;
pub use crate::ops::{
    attr_del_with_events, attr_set_with_events, mkdir_with_events, open_with_events,
    unlink_with_events,
};
pub use crate::session::{
    delete_session, get_session, put_session, QueuedNotification, SessionRecord, SessionState,
};

//! Convenience re-export of the types most Hyperspace crates need.
//!
//! ```rust
//! use hyperspace_core::prelude::*;
//! ```

pub use crate::error::{ErrorKind, HyperspaceError, HyperspaceResult};
pub use crate::event::{Event, EventKind};
pub use crate::flags::{EventMask, OpenFlags};
pub use crate::ids::{EventId, HandleId, SessionId};
pub use crate::lock::{LockGeneration, LockMode, LockSequencer, LockStatus};
pub use crate::node::NodePath;

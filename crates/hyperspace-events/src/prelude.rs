//! Convenience re-export of this crate's public surface.
//!
//! ```rust
//! use hyperspace_events::prelude::*;
//! ```

pub use crate::bus::{DispatchedEvent, EventBus, EventReceiver, DEFAULT_CHANNEL_CAPACITY};
pub use crate::dispatcher::{lock_acquired_should_emit, EventDispatcher};
pub use crate::record::EventRecord;

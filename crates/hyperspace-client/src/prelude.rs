//! Convenience re-export of this crate's public surface.
//!
//! ```rust
//! use hyperspace_client::prelude::*;
//! ```

pub use crate::callback::{HandleCallback, NullSessionCallback, SessionCallback};
pub use crate::connection::RequestChannel;
pub use crate::engine::{Client, LockOutcome, OpenResult};
pub use crate::error::ClientError;
pub use crate::handle::HandleTable;
pub use crate::keepalive::KeepaliveLoop;
pub use crate::state::{LeaseState, ReconnectPolicy};

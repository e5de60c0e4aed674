//! Convenience re-export of this crate's public surface.
//!
//! ```rust,ignore
//! use hyperspace_server::prelude::*;
//! ```

pub use crate::dispatch::dispatch;
pub use crate::error::{ServerError, ServerResult};
pub use crate::state::ServerState;
pub use crate::{keepalive, run, tcp};

//! Logging and request-context tracing for the Hyperspace master and
//! client.
//!
//! This crate provides:
//! - Configurable logging setup with multiple formats and targets
//! - A request context carrying the identifiers `spec.md` operations are
//!   keyed on (session id, handle id, node path, event id), attached to
//!   `tracing` spans for correlation
//!
//! # Example
//!
//! ```rust,no_run
//! use hyperspace_telemetry::{LogConfig, LogFormat, setup_logging, RequestContext};
//!
//! # fn main() -> Result<(), hyperspace_telemetry::TelemetryError> {
//! let config = LogConfig::new("debug")
//!     .with_format(LogFormat::Pretty)
//!     .with_directive("hyperspace_lock=trace");
//!
//! let _guard = setup_logging(&config)?;
//!
//! let ctx = RequestContext::new("lock_manager").with_operation("lock").with_session(7);
//! let span = ctx.span();
//! let _entered = span.enter();
//! tracing::info!("acquiring lock");
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

mod context;
mod error;
mod logging;

pub use context::{RequestContext, RequestGuard};
pub use error::{TelemetryError, TelemetryResult};
pub use logging::{LogConfig, LogFormat, LogTarget, setup_default_logging, setup_logging};

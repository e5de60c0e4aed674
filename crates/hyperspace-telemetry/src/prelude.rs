//! Prelude module - commonly used types for convenient import.
//!
//! Use `use hyperspace_telemetry::prelude::*;` to import all essential
//! types.
//!
//! # Example
//!
//! ```rust,no_run
//! use hyperspace_telemetry::prelude::*;
//!
//! # fn main() -> TelemetryResult<()> {
//! let config = LogConfig::new("debug").with_format(LogFormat::Pretty);
//! let _guard = setup_logging(&config)?;
//!
//! let ctx = RequestContext::new("session_manager").with_operation("tick");
//! let span = ctx.span();
//! let _entered = span.enter();
//! tracing::info!("running tick");
//! # Ok(())
//! # }
//! ```

// Errors
pub use crate::{TelemetryError, TelemetryResult};

// Logging configuration
pub use crate::{LogConfig, LogFormat, LogTarget};

// Setup functions
pub use crate::{setup_default_logging, setup_logging};

// Request context
pub use crate::{RequestContext, RequestGuard};

//! Unified prelude for Hyperspace.
//!
//! This crate provides a single import to bring in the commonly used types
//! from across the `hyperspace-*` family. Use this when you need types from
//! multiple crates without managing individual imports — a server or client
//! binary, or an integration test, typically depends on this crate alone.
//!
//! # Usage
//!
//! ```rust,ignore
//! use hyperspace_prelude::*;
//!
//! // Now you have access to types from:
//! // - hyperspace-core (NodePath, ids, events, locks, errors)
//! // - hyperspace-proto (wire command/header/keepalive/notification types)
//! // - hyperspace-storage (Store, Transaction)
//! // - hyperspace-events (EventBus, EventDispatcher)
//! // - hyperspace-lock (lock manager transactional operations)
//! // - hyperspace-namespace (node store, handle store, xattrs)
//! // - hyperspace-session (SessionManager)
//! // - hyperspace-client (Client, keepalive engine)
//! // - hyperspace-config (Config)
//! // - hyperspace-telemetry (logging setup, request spans)
//! ```
//!
//! # Per-Crate Preludes
//!
//! If you only need types from a specific crate, use its individual prelude:
//!
//! ```rust,ignore
//! use hyperspace_core::prelude::*;
//! use hyperspace_namespace::prelude::*;
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub use hyperspace_client::prelude::*;
pub use hyperspace_config::*;
pub use hyperspace_core::prelude::*;
pub use hyperspace_events::prelude::*;
pub use hyperspace_lock::prelude::*;
pub use hyperspace_namespace::prelude::*;
pub use hyperspace_proto::{
    ClientKeepalive, CommandCode, Flags, Frame, Header, MessageCodec, Notification,
    NotificationTail, ProtoError, ServerKeepalive,
};
pub use hyperspace_session::prelude::*;
pub use hyperspace_storage::{with_retry, Store, StorageError, StorageResult, Transaction};
pub use hyperspace_telemetry::prelude::*;

//! Prelude module - commonly used types for convenient import.
//!
//! Use `use hyperspace_test::prelude::*;` to import the fixtures, harness,
//! and mocks in one go.

pub use crate::fixtures::*;
pub use crate::harness::{Harness, loopback_addr};
pub use crate::mocks::{MockDatagramSocket, datagram_pair};

pub use hyperspace_core::{
    EventMask, HandleId, HyperspaceError, HyperspaceResult, LockMode, LockStatus, NodePath,
    OpenFlags, SessionId,
};

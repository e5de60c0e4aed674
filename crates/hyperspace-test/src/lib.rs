//! Hyperspace Test - Shared test utilities for the Hyperspace crates.
//!
//! This crate provides store/session/node fixtures, an end-to-end
//! scenario [`harness::Harness`], and in-process transport mocks, usable
//! across multiple `hyperspace-*` crates as a dev-dependency.
//!
//! # Usage
//!
//! Add to your crate's `Cargo.toml`:
//!
//! ```toml
//! [dev-dependencies]
//! hyperspace-test.workspace = true
//! ```
//!
//! Then use in your tests:
//!
//! ```rust,ignore
//! #[cfg(test)]
//! mod tests {
//!     use hyperspace_test::prelude::*;
//!
//!     #[test]
//!     fn exclusive_lock_is_exclusive() {
//!         let harness = Harness::new();
//!         let path = NodePath::parse("/l").unwrap();
//!         harness.mkdir(&NodePath::root()).ok();
//!         // ... open, lock, assert
//!     }
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod prelude;

pub mod fixtures;
pub mod harness;
pub mod mocks;

pub use fixtures::*;
pub use harness::*;
pub use mocks::*;

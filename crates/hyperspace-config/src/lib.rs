#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
//! Configuration loading and validation for the Hyperspace master and
//! client, covering the keys `spec.md` §6 enumerates: `Hyperspace.Master.*`,
//! `Hyperspace.Lease.Interval`, `Hyperspace.KeepAlive.Interval`,
//! `Hyperspace.GracePeriod`, `Hyperspace.Session.Reconnect`, the worker
//! count, and the base directory.
//!
//! # Usage
//!
//! ```rust,no_run
//! use hyperspace_config::Config;
//!
//! let config = Config::load(Some(std::path::Path::new("/etc/hyperspace.toml"))).unwrap();
//! println!("listening on {}:{}", config.hyperspace.master.host, config.hyperspace.master.port);
//! ```
//!
//! # Precedence
//!
//! From lowest to highest priority:
//!
//! 1. **Embedded defaults** (`defaults.toml`, compiled into the binary).
//! 2. **Config file** (an explicit path if given, otherwise
//!    `~/.hyperspace/hyperspace.toml` if present; any key it omits keeps
//!    its default via `#[serde(default)]`).
//! 3. **Environment variables** (`HYPERSPACE_*`), applied last so they
//!    always win — useful for container deployments that inject overrides
//!    without mounting a file.
//!
//! # Design
//!
//! This crate has no dependencies on other internal `hyperspace-*` crates.
//! It depends only on `serde`, `toml`, `thiserror`, `tracing`, and
//! `directories`.

/// Configuration error types.
pub mod error;
/// Configuration file discovery and layered loading.
pub mod loader;
/// Configuration struct definitions.
pub mod types;
/// Configuration validation rules.
pub mod validate;

pub use error::{ConfigError, ConfigResult};
pub use types::*;

impl Config {
    /// Load configuration with the full precedence chain (defaults → file
    /// → environment).
    ///
    /// `path` is an optional explicit config file; if `None`,
    /// [`loader::default_config_path`] is consulted instead.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if a resolved config file exists but is
    /// malformed or unreadable, or if the final configuration fails
    /// validation.
    pub fn load(path: Option<&std::path::Path>) -> ConfigResult<Self> {
        loader::load(path)
    }

    /// Load configuration from a single file, with no environment overlay.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the file cannot be read, parsed, or
    /// fails validation.
    pub fn load_file(path: &std::path::Path) -> ConfigResult<Self> {
        loader::load_file(path)
    }
}

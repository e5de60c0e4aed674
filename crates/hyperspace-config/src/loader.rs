//! Config file discovery and layered loading.
//!
//! Implements `Config::load()`:
//! 1. Parse `defaults.toml` → base (every field carries `#[serde(default)]`,
//!    so this alone is already a complete, valid [`Config`]).
//! 2. If a file path was given, parse it; any key the file omits keeps its
//!    default from step 1.
//! 3. Apply `HYPERSPACE_*` environment variable overrides.
//! 4. Validate.

use std::path::Path;

use tracing::{debug, info};

use crate::error::{ConfigError, ConfigResult};
use crate::types::Config;
use crate::validate;

/// Embedded default configuration.
const DEFAULTS_TOML: &str = include_str!("defaults.toml");

/// The default config file location, `~/.hyperspace/hyperspace.toml`,
/// consulted by [`load`] when the caller gives no explicit path. Mirrors
/// the teacher's own home-directory config discovery.
///
/// Returns `None` if the platform has no resolvable home directory, in
/// which case [`load`] falls back to embedded defaults and the
/// environment overlay alone.
#[must_use]
pub fn default_config_path() -> Option<std::path::PathBuf> {
    directories::BaseDirs::new().map(|dirs| dirs.home_dir().join(".hyperspace").join("hyperspace.toml"))
}

/// Load the configuration with the defaults → file → environment
/// precedence chain described in the module docs.
///
/// If `path` is `None`, [`default_config_path`] is consulted; a missing
/// file at either the explicit or the default path is not an error, and
/// loading falls back to embedded defaults.
///
/// # Errors
///
/// Returns a [`ConfigError`] if a config file is found but cannot be
/// parsed, or if the final merged configuration fails validation.
pub fn load(path: Option<&Path>) -> ConfigResult<Config> {
    let mut config = parse_defaults()?;

    let resolved = path.map(std::path::Path::to_path_buf).or_else(default_config_path);
    if let Some(path) = resolved.as_deref() {
        if let Some(file_config) = try_load_file(path)? {
            config = file_config;
            info!(path = %path.display(), "loaded config file");
        } else {
            debug!(path = %path.display(), "config file not found, using defaults");
        }
    }

    let env_count = apply_env_overrides(&mut config);
    if env_count > 0 {
        debug!(count = env_count, "applied environment variable overrides");
    }

    validate::validate(&config)?;
    Ok(config)
}

/// Load a config from a specific file path, with no environment overlay.
///
/// # Errors
///
/// Returns a [`ConfigError`] if the file cannot be read, parsed, or fails
/// validation.
pub fn load_file(path: &Path) -> ConfigResult<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
        path: path.display().to_string(),
        source: e,
    })?;
    let config: Config = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
        path: path.display().to_string(),
        source: e,
    })?;
    validate::validate(&config)?;
    Ok(config)
}

fn parse_defaults() -> ConfigResult<Config> {
    toml::from_str(DEFAULTS_TOML).map_err(|e| ConfigError::ParseError {
        path: "<embedded defaults>".to_owned(),
        source: e,
    })
}

/// Try to load a file, returning `None` if it doesn't exist.
fn try_load_file(path: &Path) -> ConfigResult<Option<Config>> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(ConfigError::ReadError { path: path.display().to_string(), source: e });
        },
    };
    let config: Config = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
        path: path.display().to_string(),
        source: e,
    })?;
    Ok(Some(config))
}

/// Apply `HYPERSPACE_*` environment overrides onto an already-loaded
/// config, returning how many were applied. A malformed value for a
/// numeric/boolean key is ignored (the file/default value is kept) rather
/// than failing the whole load, since these are meant as convenience
/// overlays for container deployments.
fn apply_env_overrides(config: &mut Config) -> usize {
    let mut count = 0;

    if let Ok(v) = std::env::var("HYPERSPACE_MASTER_HOST") {
        config.hyperspace.master.host = v;
        count += 1;
    }
    if let Some(v) = parsed_env("HYPERSPACE_MASTER_PORT") {
        config.hyperspace.master.port = v;
        count += 1;
    }
    if let Some(v) = parsed_env("HYPERSPACE_LEASE_INTERVAL_MS") {
        config.hyperspace.lease.interval_ms = v;
        count += 1;
    }
    if let Some(v) = parsed_env("HYPERSPACE_KEEPALIVE_INTERVAL_MS") {
        config.hyperspace.keep_alive.interval_ms = v;
        count += 1;
    }
    if let Some(v) = parsed_env("HYPERSPACE_GRACE_PERIOD_MS") {
        config.hyperspace.grace_period = v;
        count += 1;
    }
    if let Some(v) = parsed_env("HYPERSPACE_SESSION_RECONNECT") {
        config.hyperspace.session.reconnect = v;
        count += 1;
    }
    if let Some(v) = parsed_env("HYPERSPACE_WORKER_COUNT") {
        config.worker_count = v;
        count += 1;
    }
    if let Ok(v) = std::env::var("HYPERSPACE_BASE_DIR") {
        config.base_dir = v.into();
        count += 1;
    }

    count
}

fn parsed_env<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_parse_and_validate() {
        let config = parse_defaults().unwrap();
        assert!(validate::validate(&config).is_ok());
    }

    #[test]
    fn load_without_path_uses_defaults() {
        let config = load(None).unwrap();
        assert_eq!(config.hyperspace.master.port, 38_551);
    }

    #[test]
    fn load_file_nonexistent() {
        let result = load_file(Path::new("/nonexistent/hyperspace.toml"));
        assert!(matches!(result, Err(ConfigError::ReadError { .. })));
    }

    #[test]
    fn file_overlay_keeps_defaults_for_omitted_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hyperspace.toml");
        std::fs::write(&path, "[Hyperspace.Master]\nPort = 9999\n").unwrap();

        let config = load(Some(&path)).unwrap();
        assert_eq!(config.hyperspace.master.port, 9999);
        assert_eq!(config.hyperspace.lease.interval_ms, 12_000);
    }

    #[test]
    fn missing_file_path_falls_back_to_defaults() {
        let config = load(Some(Path::new("/nonexistent/hyperspace.toml"))).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn default_config_path_is_under_the_home_directory() {
        let Some(path) = default_config_path() else { return };
        assert!(path.ends_with(".hyperspace/hyperspace.toml"));
    }
}

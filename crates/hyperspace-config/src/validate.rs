//! Post-load configuration validation.
//!
//! Validates that a deserialized [`Config`](crate::Config) is within
//! acceptable ranges and that its cross-field invariants hold, after every
//! layer (defaults, file, environment) has been merged.

use crate::error::{ConfigError, ConfigResult};
use crate::types::Config;

fn field_error(field: &str, message: impl Into<String>) -> ConfigError {
    ConfigError::ValidationError { field: field.to_owned(), message: message.into() }
}

/// Validate a fully-merged configuration.
///
/// # Errors
///
/// Returns a [`ConfigError::ValidationError`] describing the first field
/// that fails validation.
pub fn validate(config: &Config) -> ConfigResult<()> {
    if config.hyperspace.master.host.trim().is_empty() {
        return Err(field_error("Hyperspace.Master.Host", "must not be empty"));
    }
    if config.hyperspace.master.port == 0 {
        return Err(field_error("Hyperspace.Master.Port", "must be a nonzero port number"));
    }
    if config.hyperspace.lease.interval_ms == 0 {
        return Err(field_error("Hyperspace.Lease.Interval", "must be greater than zero"));
    }
    if config.hyperspace.keep_alive.interval_ms == 0 {
        return Err(field_error("Hyperspace.KeepAlive.Interval", "must be greater than zero"));
    }
    if config.hyperspace.keep_alive.interval_ms >= config.hyperspace.lease.interval_ms {
        return Err(field_error(
            "Hyperspace.KeepAlive.Interval",
            "must be smaller than Hyperspace.Lease.Interval, or a session could lapse between \
             keepalives",
        ));
    }
    if config.hyperspace.grace_period == 0 {
        return Err(field_error("Hyperspace.GracePeriod", "must be greater than zero"));
    }
    if config.worker_count == 0 {
        return Err(field_error("worker_count", "must be at least 1"));
    }
    if config.base_dir.as_os_str().is_empty() {
        return Err(field_error("base_dir", "must not be empty"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        assert!(validate(&Config::default()).is_ok());
    }

    #[test]
    fn zero_port_is_rejected() {
        let mut config = Config::default();
        config.hyperspace.master.port = 0;
        let err = validate(&config).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError { field, .. } if field == "Hyperspace.Master.Port"));
    }

    #[test]
    fn keep_alive_interval_must_be_smaller_than_lease_interval() {
        let mut config = Config::default();
        config.hyperspace.keep_alive.interval_ms = config.hyperspace.lease.interval_ms;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn zero_worker_count_is_rejected() {
        let mut config = Config::default();
        config.worker_count = 0;
        assert!(validate(&config).is_err());
    }
}

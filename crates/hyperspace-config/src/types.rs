//! Configuration struct definitions for the keys enumerated in `spec.md`
//! §6 ("Configuration keys (enumerated)").

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

fn default_master_host() -> String {
    "0.0.0.0".to_owned()
}

fn default_master_port() -> u16 {
    38_551
}

/// `Hyperspace.Master.*` — where the server listens and what address
/// clients dial.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MasterSection {
    /// `Hyperspace.Master.Host`.
    #[serde(rename = "Host", default = "default_master_host")]
    pub host: String,
    /// `Hyperspace.Master.Port`.
    #[serde(rename = "Port", default = "default_master_port")]
    pub port: u16,
}

impl Default for MasterSection {
    fn default() -> Self {
        Self { host: default_master_host(), port: default_master_port() }
    }
}

fn default_lease_interval_ms() -> u64 {
    12_000
}

/// `Hyperspace.Lease.*`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaseSection {
    /// `Hyperspace.Lease.Interval`, in milliseconds. How long a successful
    /// `renew_session_lease` extends a session's deadline.
    #[serde(rename = "Interval", default = "default_lease_interval_ms")]
    pub interval_ms: u64,
}

impl Default for LeaseSection {
    fn default() -> Self {
        Self { interval_ms: default_lease_interval_ms() }
    }
}

fn default_keep_alive_interval_ms() -> u64 {
    1_000
}

/// `Hyperspace.KeepAlive.*`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeepAliveSection {
    /// `Hyperspace.KeepAlive.Interval`, in milliseconds. The client's
    /// keepalive datagram send cadence.
    #[serde(rename = "Interval", default = "default_keep_alive_interval_ms")]
    pub interval_ms: u64,
}

impl Default for KeepAliveSection {
    fn default() -> Self {
        Self { interval_ms: default_keep_alive_interval_ms() }
    }
}

/// `Hyperspace.Session.*`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct SessionSection {
    /// `Hyperspace.Session.Reconnect`. When set, the client keepalive engine
    /// transparently starts a fresh session after an expiry instead of
    /// surfacing `expired-session` permanently.
    #[serde(rename = "Reconnect", default)]
    pub reconnect: bool,
}

fn default_grace_period_ms() -> u64 {
    60_000
}

/// The `Hyperspace.*` key family.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct HyperspaceSection {
    /// `Hyperspace.Master.*`.
    #[serde(default)]
    pub master: MasterSection,
    /// `Hyperspace.Lease.*`.
    #[serde(default)]
    pub lease: LeaseSection,
    /// `Hyperspace.KeepAlive.*`.
    #[serde(default)]
    pub keep_alive: KeepAliveSection,
    /// `Hyperspace.GracePeriod`, in milliseconds. Bounds the client's
    /// jeopardy window before it declares its session expired.
    #[serde(default = "default_grace_period_ms")]
    pub grace_period: u64,
    /// `Hyperspace.Session.*`.
    #[serde(default)]
    pub session: SessionSection,
}

impl Default for HyperspaceSection {
    fn default() -> Self {
        Self {
            master: MasterSection::default(),
            lease: LeaseSection::default(),
            keep_alive: KeepAliveSection::default(),
            grace_period: default_grace_period_ms(),
            session: SessionSection::default(),
        }
    }
}

fn default_worker_count() -> usize {
    4
}

fn default_base_dir() -> PathBuf {
    PathBuf::from("/var/lib/hyperspace")
}

/// The full resolved configuration: the `Hyperspace.*` key family plus the
/// two keys `spec.md` §6 lists without a dotted prefix (worker count and
/// the base directory).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// The `Hyperspace.*` key family.
    #[serde(default)]
    pub hyperspace: HyperspaceSection,
    /// Size of the worker pool that executes dispatched requests to
    /// completion (`spec.md` §5).
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,
    /// Base directory for the persistent store and its host-level advisory
    /// lock file.
    #[serde(default = "default_base_dir")]
    pub base_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            hyperspace: HyperspaceSection::default(),
            worker_count: default_worker_count(),
            base_dir: default_base_dir(),
        }
    }
}

impl Config {
    /// `Hyperspace.Lease.Interval` as a [`std::time::Duration`].
    #[must_use]
    pub fn lease_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.hyperspace.lease.interval_ms)
    }

    /// `Hyperspace.KeepAlive.Interval` as a [`std::time::Duration`].
    #[must_use]
    pub fn keep_alive_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.hyperspace.keep_alive.interval_ms)
    }

    /// `Hyperspace.GracePeriod` as a [`std::time::Duration`].
    #[must_use]
    pub fn grace_period(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.hyperspace.grace_period)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_values() {
        let config = Config::default();
        assert_eq!(config.hyperspace.lease.interval_ms, 12_000);
        assert_eq!(config.hyperspace.keep_alive.interval_ms, 1_000);
        assert_eq!(config.hyperspace.grace_period, 60_000);
        assert!(!config.hyperspace.session.reconnect);
        assert_eq!(config.hyperspace.master.port, 38_551);
    }

    #[test]
    fn round_trips_through_toml() {
        let config = Config::default();
        let text = toml::to_string(&config).unwrap();
        let parsed: Config = toml::from_str(&text).unwrap();
        assert_eq!(config, parsed);
    }
}

//! promctl.toml configuration parser.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::options::RawOptions;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DaemonConfig {
    pub options: RawOptions,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub unit: UnitConfig,
}

/// Filesystem locations of the managed server and of promctl's own state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub binary: PathBuf,
    pub config_file: PathBuf,
    pub storage: PathBuf,
    pub console_templates: PathBuf,
    pub console_libraries: PathBuf,
    pub state_db: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("/bin/prometheus"),
            config_file: PathBuf::from("/etc/prometheus/prometheus.yml"),
            storage: PathBuf::from("/var/lib/prometheus"),
            console_templates: PathBuf::from("/usr/share/prometheus/consoles"),
            console_libraries: PathBuf::from("/usr/share/prometheus/console_libraries"),
            state_db: PathBuf::from("/var/lib/promctl/state.redb"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UnitConfig {
    /// Name of the managed service as known to the supervisor.
    pub service_name: String,
    /// Address published to peers.
    pub advertise_address: String,
    pub supervisor_timeout_ms: u64,
    /// How long a stopped service may take to exit after SIGTERM before it
    /// is killed.
    pub stop_grace_ms: u64,
    pub probe_timeout_ms: u64,
    pub remote_write_schema: String,
    pub remote_write_path: String,
}

impl Default for UnitConfig {
    fn default() -> Self {
        Self {
            service_name: "prometheus".to_string(),
            advertise_address: "127.0.0.1".to_string(),
            supervisor_timeout_ms: 5000,
            stop_grace_ms: 10_000,
            probe_timeout_ms: 2000,
            remote_write_schema: "http".to_string(),
            remote_write_path: "/api/v1/write".to_string(),
        }
    }
}

impl UnitConfig {
    pub fn supervisor_timeout(&self) -> Duration {
        Duration::from_millis(self.supervisor_timeout_ms)
    }

    pub fn stop_grace(&self) -> Duration {
        Duration::from_millis(self.stop_grace_ms)
    }

    /// Bound on a whole stop call: the grace period plus the usual
    /// supervisor budget for the kill and reap that follow it.
    pub fn stop_timeout(&self) -> Duration {
        self.stop_grace() + self.supervisor_timeout()
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }
}

impl DaemonConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: DaemonConfig = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Scaffold a minimal promctl.toml for a server listening on `port`.
    pub fn scaffold(port: u16) -> Self {
        DaemonConfig {
            options: RawOptions {
                port: u32::from(port),
                log_level: Some("info".to_string()),
                tsdb_wal_compression: false,
                tsdb_retention_time: Some("15d".to_string()),
                external_labels: None,
                scrape_interval: Some("1m".to_string()),
                scrape_timeout: Some("10s".to_string()),
                evaluation_interval: Some("1m".to_string()),
            },
            paths: PathsConfig::default(),
            unit: UnitConfig::default(),
        }
    }
}

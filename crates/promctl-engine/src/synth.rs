//! Config synthesis — (operator options, registry snapshot) → desired document.
//!
//! Pure and total: no I/O, no hidden state, never fails. Invalid operator
//! input has already been degraded to omission by option validation.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::debug;

use promctl_core::{OperatorOptions, RegistrySnapshot, ScrapeJob, TimeSpec};

/// Job name of the self-monitoring scrape job.
pub const SELF_JOB_NAME: &str = "prometheus";

/// The generated configuration document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DesiredConfig {
    pub global: GlobalSection,
    /// Self-monitoring job first, then peer jobs in snapshot order.
    pub scrape_configs: Vec<ScrapeEntry>,
    /// Present iff at least one notification endpoint exists.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alerting: Option<AlertingSection>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub remote_write: Vec<RemoteWriteTarget>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GlobalSection {
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub external_labels: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scrape_interval: Option<TimeSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scrape_timeout: Option<TimeSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evaluation_interval: Option<TimeSpec>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ScrapeEntry {
    Static(StaticScrapeJob),
    Peer(ScrapeJob),
}

impl ScrapeEntry {
    pub fn job_name(&self) -> &str {
        match self {
            ScrapeEntry::Static(job) => &job.job_name,
            ScrapeEntry::Peer(job) => &job.job_name,
        }
    }
}

/// A fully typed scrape job with a static target list.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StaticScrapeJob {
    pub job_name: String,
    pub scrape_interval: TimeSpec,
    pub scrape_timeout: TimeSpec,
    pub metrics_path: String,
    pub honor_timestamps: bool,
    pub scheme: String,
    pub static_configs: Vec<StaticConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StaticConfig {
    pub targets: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertingSection {
    pub alertmanagers: Vec<AlertmanagerConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertmanagerConfig {
    pub static_configs: Vec<StaticConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RemoteWriteTarget {
    pub url: String,
}

/// Build the desired configuration document.
pub fn synthesize(options: &OperatorOptions, snapshot: &RegistrySnapshot) -> DesiredConfig {
    let global = GlobalSection {
        external_labels: options.external_labels.clone(),
        scrape_interval: options.scrape_interval,
        scrape_timeout: options.scrape_timeout,
        evaluation_interval: options.evaluation_interval,
    };

    let mut scrape_configs = Vec::with_capacity(snapshot.jobs.len() + 1);
    scrape_configs.push(ScrapeEntry::Static(self_scrape_job(options.port)));
    scrape_configs.extend(
        snapshot
            .jobs
            .iter()
            .filter(|job| job.job_name != SELF_JOB_NAME)
            .cloned()
            .map(ScrapeEntry::Peer),
    );

    let alerting = if snapshot.endpoints.is_empty() {
        debug!("no alertmanagers available");
        None
    } else {
        Some(AlertingSection {
            alertmanagers: vec![AlertmanagerConfig {
                static_configs: vec![StaticConfig {
                    targets: snapshot.endpoints.iter().map(ToString::to_string).collect(),
                }],
            }],
        })
    };

    let remote_write = snapshot
        .remote_write
        .iter()
        .map(|url| RemoteWriteTarget { url: url.clone() })
        .collect();

    DesiredConfig {
        global,
        scrape_configs,
        alerting,
        remote_write,
    }
}

/// The server scraping itself every 5s on `localhost:{port}`.
fn self_scrape_job(port: u16) -> StaticScrapeJob {
    StaticScrapeJob {
        job_name: SELF_JOB_NAME.to_string(),
        scrape_interval: TimeSpec::FIVE_SECONDS,
        scrape_timeout: TimeSpec::FIVE_SECONDS,
        metrics_path: "/metrics".to_string(),
        honor_timestamps: true,
        scheme: "http".to_string(),
        static_configs: vec![StaticConfig {
            targets: vec![format!("localhost:{port}")],
        }],
    }
}

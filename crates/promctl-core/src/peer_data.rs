//! Decoding of the raw key/value bags peers publish.
//!
//! Peers publish strings; structured payloads are JSON-encoded inside them.
//! Malformed payloads decode to nothing (with a warning) so that one bad
//! peer never blocks reconciliation for the others.

use std::collections::BTreeMap;

use tracing::warn;

use crate::types::{NotificationEndpoint, ScrapeJob};

/// Raw data bag published by one peer.
pub type PeerData = BTreeMap<String, String>;

/// Key holding a JSON list of scrape job objects.
pub const SCRAPE_JOBS_KEY: &str = "scrape_jobs";

/// Key holding a JSON list of alert receiver addresses.
pub const ALERTMANAGER_ADDRS_KEY: &str = "addrs";

/// Key holding a single remote-write URL.
pub const REMOTE_WRITE_ENDPOINT_KEY: &str = "remote_write_endpoint";

/// Decode announced scrape jobs. Entries without a string `job_name` are dropped.
pub fn scrape_jobs(data: &PeerData) -> Vec<ScrapeJob> {
    let Some(raw) = data.get(SCRAPE_JOBS_KEY) else {
        return Vec::new();
    };

    let entries: Vec<serde_json::Value> = match serde_json::from_str(raw) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(error = %e, "ignoring malformed scrape job list");
            return Vec::new();
        }
    };

    entries
        .into_iter()
        .filter_map(|entry| match serde_json::from_value::<ScrapeJob>(entry) {
            Ok(job) => Some(job),
            Err(e) => {
                warn!(error = %e, "dropping scrape job without a usable job_name");
                None
            }
        })
        .collect()
}

/// Decode announced alert receiver addresses. Missing key means none.
pub fn alertmanager_addrs(data: &PeerData) -> Vec<NotificationEndpoint> {
    let raw = data.get(ALERTMANAGER_ADDRS_KEY).map(String::as_str).unwrap_or("[]");
    match serde_json::from_str::<Vec<String>>(raw) {
        Ok(addrs) => addrs.into_iter().map(NotificationEndpoint::new).collect(),
        Err(e) => {
            warn!(error = %e, "ignoring malformed alertmanager address list");
            Vec::new()
        }
    }
}

/// Decode an announced remote-write URL, if any.
pub fn remote_write_endpoint(data: &PeerData) -> Option<String> {
    data.get(REMOTE_WRITE_ENDPOINT_KEY)
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

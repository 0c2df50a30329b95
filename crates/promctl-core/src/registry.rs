//! Peer registry — scrape jobs, alert receivers and remote-write targets
//! announced by peers, keyed by the announcing peer.
//!
//! Announcements are stored per peer and per relation: a peer leaving one
//! relation keeps what it announced on the others. Endpoint lists are
//! replaced as one batch. Snapshots
//! are ordered deterministically so that identical contents always render
//! to identical bytes.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::types::{NotificationEndpoint, PeerId, Relation, ScrapeJob};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct RecordedJob {
    job: ScrapeJob,
    /// Registry-wide write sequence; the highest wins a job name conflict.
    seq: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PeerRegistry {
    next_seq: u64,
    jobs: BTreeMap<PeerId, BTreeMap<String, RecordedJob>>,
    endpoints: BTreeMap<PeerId, Vec<NotificationEndpoint>>,
    remote_write: BTreeMap<PeerId, Vec<String>>,
}

/// Point-in-time, ordered view of the registry.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RegistrySnapshot {
    /// Unique by job name, sorted by job name.
    pub jobs: Vec<ScrapeJob>,
    pub endpoints: BTreeSet<NotificationEndpoint>,
    pub remote_write: BTreeSet<String>,
}

impl PeerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record (or overwrite) one scrape job announced by `peer`.
    pub fn record_scrape_job(&mut self, peer: &PeerId, job: ScrapeJob) {
        let seq = self.bump();
        debug!(%peer, job = %job.job_name, "scrape job recorded");
        self.jobs
            .entry(peer.clone())
            .or_default()
            .insert(job.job_name.clone(), RecordedJob { job, seq });
    }

    /// Replace every scrape job announced by `peer` with `jobs`.
    pub fn replace_scrape_jobs(&mut self, peer: &PeerId, jobs: Vec<ScrapeJob>) {
        self.jobs.remove(peer);
        for job in jobs {
            self.record_scrape_job(peer, job);
        }
    }

    /// Replace (not merge) the notification endpoints announced by `peer`.
    pub fn record_notification_endpoints(
        &mut self,
        peer: &PeerId,
        endpoints: Vec<NotificationEndpoint>,
    ) {
        debug!(%peer, count = endpoints.len(), "notification endpoints recorded");
        if endpoints.is_empty() {
            self.endpoints.remove(peer);
        } else {
            self.endpoints.insert(peer.clone(), endpoints);
        }
    }

    /// Replace the remote-write URLs announced by `peer`.
    pub fn record_remote_write_endpoints(&mut self, peer: &PeerId, urls: Vec<String>) {
        if urls.is_empty() {
            self.remote_write.remove(peer);
        } else {
            self.remote_write.insert(peer.clone(), urls);
        }
    }

    /// Drop everything `peer` announced. Returns true if anything was removed.
    pub fn forget_peer(&mut self, peer: &PeerId) -> bool {
        let jobs = self.jobs.remove(peer).is_some();
        let endpoints = self.endpoints.remove(peer).is_some();
        let remote_write = self.remote_write.remove(peer).is_some();
        let removed = jobs || endpoints || remote_write;
        if removed {
            debug!(%peer, "peer forgotten");
        }
        removed
    }

    /// Drop what `peer` announced on `relation` only. Returns true if
    /// anything was removed. Provider relations carry no announcements.
    pub fn forget_peer_relation(&mut self, relation: Relation, peer: &PeerId) -> bool {
        let removed = match relation {
            Relation::Monitoring => self.jobs.remove(peer).is_some(),
            Relation::Alertmanager => self.endpoints.remove(peer).is_some(),
            Relation::RemoteWrite => self.remote_write.remove(peer).is_some(),
            Relation::ReceiveRemoteWrite | Relation::GrafanaSource => false,
        };
        if removed {
            debug!(%relation, %peer, "peer announcements forgotten");
        }
        removed
    }

    /// Every peer with at least one announcement.
    pub fn peers(&self) -> BTreeSet<PeerId> {
        self.jobs
            .keys()
            .chain(self.endpoints.keys())
            .chain(self.remote_write.keys())
            .cloned()
            .collect()
    }

    pub fn snapshot(&self) -> RegistrySnapshot {
        let mut by_name: BTreeMap<&str, &RecordedJob> = BTreeMap::new();
        for recorded in self.jobs.values().flat_map(BTreeMap::values) {
            let name = recorded.job.job_name.as_str();
            match by_name.get(name) {
                Some(existing) if existing.seq > recorded.seq => {}
                _ => {
                    by_name.insert(name, recorded);
                }
            }
        }

        RegistrySnapshot {
            jobs: by_name.into_values().map(|r| r.job.clone()).collect(),
            endpoints: self.endpoints.values().flatten().cloned().collect(),
            remote_write: self.remote_write.values().flatten().cloned().collect(),
        }
    }

    fn bump(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }
}

//! The reconciliation entry point. Every trigger runs exactly one pass to
//! completion; the caller serializes triggers.

use std::fmt;

use serde::Serialize;
use tracing::{debug, error, info, warn};

use promctl_core::config::{PathsConfig, UnitConfig};
use promctl_core::peer_data::{self, PeerData};
use promctl_core::{Fingerprint, OperatorOptions, PeerId, PeerRegistry, Relation};
use promctl_probe::{IdentityProbe, ReadinessTracker};
use promctl_state::StateStore;

use crate::command::{ServiceSpec, desired_service_spec};
use crate::error::EngineResult;
use crate::fingerprint::{RenderedConfig, render};
use crate::publish::{Publication, publications};
use crate::reconciler::{PassOutcome, ServiceReconciler};
use crate::supervisor::{ConfigSink, Supervisor};
use crate::synth::synthesize;
use crate::trigger::Trigger;

/// Status message shown while the unit is shutting down.
pub const TERMINATING_MESSAGE: &str = "Pod is terminating.";

/// User-visible unit condition after a pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "message", rename_all = "lowercase")]
pub enum UnitStatus {
    Active,
    Maintenance(String),
    /// Waiting on a collaborator that is not reachable yet.
    Waiting(String),
    /// The last pass failed; the next trigger retries.
    Degraded(String),
}

impl UnitStatus {
    fn from_outcome(outcome: &PassOutcome) -> Self {
        match outcome {
            PassOutcome::Reconciled { .. } => UnitStatus::Active,
            PassOutcome::Deferred { reason } => {
                UnitStatus::Waiting(format!("waiting for supervisor: {reason}"))
            }
            PassOutcome::ConfigApplyFailed { reason } => {
                UnitStatus::Degraded(format!("config apply failed: {reason}"))
            }
            PassOutcome::ProcessFailed { reason } => {
                UnitStatus::Degraded(format!("process failed: {reason}"))
            }
        }
    }
}

impl fmt::Display for UnitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnitStatus::Active => f.write_str("active"),
            UnitStatus::Maintenance(msg) => write!(f, "maintenance: {msg}"),
            UnitStatus::Waiting(msg) => write!(f, "waiting: {msg}"),
            UnitStatus::Degraded(msg) => write!(f, "degraded: {msg}"),
        }
    }
}

/// Result of handling one trigger.
#[derive(Debug, Clone, Serialize)]
pub struct PassReport {
    pub trigger: &'static str,
    /// `None` when the trigger does not reconcile (stop).
    pub outcome: Option<PassOutcome>,
    pub status: UnitStatus,
    pub fingerprint: Option<Fingerprint>,
    pub ready: bool,
    /// Version the managed server reported on its last successful answer.
    pub version: Option<String>,
    /// Empty until the readiness latch is set.
    pub publications: Vec<Publication>,
}

pub struct Engine<S, W, P> {
    store: StateStore,
    options: OperatorOptions,
    paths: PathsConfig,
    unit: UnitConfig,
    reconciler: ServiceReconciler<S, W>,
    readiness: ReadinessTracker<P>,
}

impl<S, W, P> Engine<S, W, P>
where
    S: Supervisor,
    W: ConfigSink,
    P: IdentityProbe,
{
    pub fn new(
        store: StateStore,
        options: OperatorOptions,
        paths: PathsConfig,
        unit: UnitConfig,
        supervisor: S,
        sink: W,
        probe: P,
    ) -> Self {
        let reconciler = ServiceReconciler::new(
            supervisor,
            sink,
            unit.service_name.clone(),
            paths.config_file.clone(),
            unit.supervisor_timeout(),
        )
        .with_stop_timeout(unit.stop_timeout());
        Self {
            store,
            options,
            paths,
            unit,
            reconciler,
            readiness: ReadinessTracker::new(probe),
        }
    }

    pub fn options(&self) -> &OperatorOptions {
        &self.options
    }

    pub fn reconciler(&self) -> &ServiceReconciler<S, W> {
        &self.reconciler
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    /// Handle one trigger: load state, fold the trigger in, synthesize,
    /// reconcile, probe, persist.
    pub async fn handle(&mut self, trigger: Trigger) -> EngineResult<PassReport> {
        let name = trigger.name();

        if matches!(trigger, Trigger::Stop) {
            info!("unit stopping, no reconciliation");
            return Ok(PassReport {
                trigger: name,
                outcome: None,
                status: UnitStatus::Maintenance(TERMINATING_MESSAGE.to_string()),
                fingerprint: None,
                ready: self.readiness.is_ready(),
                version: self.readiness.version().map(str::to_string),
                publications: Vec::new(),
            });
        }

        debug!(trigger = name, "reconciliation pass started");

        let mut state = self.store.load_unit_state()?;
        self.readiness.restore(state.ready);

        let force = self.fold(&mut state.registry, trigger);

        let spec = desired_service_spec(&self.options, &self.paths);
        let (outcome, fingerprint) = match preview(&self.options, &state.registry) {
            Ok(rendered) => {
                let outcome = self
                    .reconciler
                    .reconcile(&rendered, &spec, force, &mut state.applied)
                    .await;
                (outcome, Some(rendered.fingerprint))
            }
            Err(e) => {
                error!(error = %e, "failed to serialize config");
                (
                    PassOutcome::ConfigApplyFailed {
                        reason: e.to_string(),
                    },
                    None,
                )
            }
        };

        // Asked after the fold so a port change is followed on this pass.
        self.readiness.probe(self.options.port).await;
        state.ready = self.readiness.is_ready();

        self.store.save_unit_state(&state)?;

        let status = UnitStatus::from_outcome(&outcome);
        let publications = if state.ready {
            publications(&self.unit, self.options.port)
        } else {
            Vec::new()
        };

        info!(
            trigger = name,
            %status,
            ready = state.ready,
            peers = state.registry.peers().len(),
            "reconciliation pass finished"
        );

        Ok(PassReport {
            trigger: name,
            outcome: Some(outcome),
            status,
            fingerprint,
            ready: state.ready,
            version: self.readiness.version().map(str::to_string),
            publications,
        })
    }

    /// Apply a trigger to engine inputs. Returns whether the pass must skip
    /// the idle short-circuit.
    fn fold(&mut self, registry: &mut PeerRegistry, trigger: Trigger) -> bool {
        match trigger {
            Trigger::OperatorChanged(options) => {
                if options != self.options {
                    info!(port = options.port, "operator options changed");
                }
                self.options = options;
                false
            }
            Trigger::PeerJoined { relation, peer } => {
                debug!(%relation, %peer, "peer joined, waiting for data");
                false
            }
            Trigger::PeerDataChanged {
                relation,
                peer,
                data,
            } => {
                record_peer_data(registry, relation, &peer, &data);
                false
            }
            Trigger::PeerLeft { relation, peer } => {
                if registry.forget_peer_relation(relation, &peer) {
                    info!(%relation, %peer, "peer left, announcements on relation dropped");
                }
                false
            }
            Trigger::SupervisorReachable => true,
            Trigger::Stop => false,
        }
    }
}

fn record_peer_data(registry: &mut PeerRegistry, relation: Relation, peer: &PeerId, data: &PeerData) {
    match relation {
        Relation::Monitoring => {
            registry.replace_scrape_jobs(peer, peer_data::scrape_jobs(data));
        }
        Relation::Alertmanager => {
            registry.record_notification_endpoints(peer, peer_data::alertmanager_addrs(data));
        }
        Relation::RemoteWrite => {
            let urls = peer_data::remote_write_endpoint(data).into_iter().collect();
            registry.record_remote_write_endpoints(peer, urls);
        }
        Relation::ReceiveRemoteWrite | Relation::GrafanaSource => {
            warn!(%relation, %peer, "ignoring data on a provider relation");
        }
    }
}

/// The document a pass would write for `options` and `registry`.
pub fn preview(
    options: &OperatorOptions,
    registry: &PeerRegistry,
) -> Result<RenderedConfig, serde_yaml::Error> {
    render(&synthesize(options, &registry.snapshot()))
}

/// The document and service spec a pass would apply, without touching
/// the supervisor.
pub fn dry_run(
    options: &OperatorOptions,
    paths: &PathsConfig,
    registry: &PeerRegistry,
) -> Result<(RenderedConfig, ServiceSpec), serde_yaml::Error> {
    Ok((preview(options, registry)?, desired_service_spec(options, paths)))
}

//! Service reconciler — drives one pass of the apply state machine.
//!
//! ```text
//! Idle ──(nothing changed)──────────────────────────────► Reconciled
//!   └─► ConfigPending ──write──► ConfigApplied ──► ProcessPending
//!            │                                        │
//!            └─► ConfigApplyFailed                     ├─► ProcessRunning ─► Reconciled
//!                                                      └─► ProcessStartFailed
//! ```
//!
//! Supervisor calls are bounded by a timeout; a timeout or a closed control
//! channel defers the pass instead of failing it. Stopping gets its own,
//! longer bound so a server taking its grace period to exit is not mistaken
//! for an unreachable supervisor. The config write is bounded too and fails
//! the pass on expiry.

use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, error, info, warn};

use promctl_state::AppliedState;

use crate::command::{ServiceSpec, SpecMode};
use crate::fingerprint::{RenderedConfig, needs_apply};
use crate::supervisor::{ConfigSink, Supervisor, SupervisorError};

/// Current phase of a reconciliation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ReconcilePhase {
    Idle,
    ConfigPending,
    ConfigApplied,
    ProcessPending,
    ProcessRunning,
    Reconciled,
    ConfigApplyFailed,
    ProcessStartFailed,
}

/// How a pass ended. None of these is fatal; every non-success outcome is
/// retried from scratch on the next trigger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PassOutcome {
    Reconciled { wrote_config: bool, restarted: bool },
    /// Supervisor not reachable yet. AppliedState untouched.
    Deferred { reason: String },
    /// Config write failed. AppliedState untouched.
    ConfigApplyFailed { reason: String },
    /// Config applied, process step failed.
    ProcessFailed { reason: String },
}

impl PassOutcome {
    pub fn is_reconciled(&self) -> bool {
        matches!(self, PassOutcome::Reconciled { .. })
    }
}

pub struct ServiceReconciler<S, W> {
    supervisor: S,
    sink: W,
    service_name: String,
    config_path: PathBuf,
    timeout: Duration,
    stop_timeout: Duration,
    phase: ReconcilePhase,
}

impl<S: Supervisor, W: ConfigSink> ServiceReconciler<S, W> {
    pub fn new(
        supervisor: S,
        sink: W,
        service_name: impl Into<String>,
        config_path: impl Into<PathBuf>,
        timeout: Duration,
    ) -> Self {
        Self {
            supervisor,
            sink,
            service_name: service_name.into(),
            config_path: config_path.into(),
            timeout,
            stop_timeout: timeout,
            phase: ReconcilePhase::Idle,
        }
    }

    /// Bound for `stop`. Must cover the supervisor's grace period.
    pub fn with_stop_timeout(mut self, stop_timeout: Duration) -> Self {
        self.stop_timeout = stop_timeout;
        self
    }

    pub fn phase(&self) -> ReconcilePhase {
        self.phase
    }

    pub fn supervisor(&self) -> &S {
        &self.supervisor
    }

    pub fn sink(&self) -> &W {
        &self.sink
    }

    /// Run one pass. `applied` is updated in place on success and on
    /// process failure; the caller persists it.
    ///
    /// `force` skips the idle short-circuit, for when the supervisor may have
    /// lost the service entry or the file (e.g. it just came back up).
    pub async fn reconcile(
        &mut self,
        rendered: &RenderedConfig,
        spec: &ServiceSpec,
        force: bool,
        applied: &mut AppliedState,
    ) -> PassOutcome {
        self.phase = ReconcilePhase::Idle;

        let config_changed = needs_apply(rendered, applied);
        let command_changed = applied.command != spec.command;

        if !force && !config_changed && !command_changed {
            debug!(fingerprint = %rendered.fingerprint.short(), "nothing to apply");
            self.transition(ReconcilePhase::Reconciled);
            return PassOutcome::Reconciled {
                wrote_config: false,
                restarted: false,
            };
        }

        self.transition(ReconcilePhase::ConfigPending);

        if let Err(e) = bounded(self.timeout, self.supervisor.ping()).await {
            return self.defer(e);
        }

        let wrote_config = config_changed || force;
        if wrote_config {
            let write = self.sink.write(&self.config_path, &rendered.bytes);
            let failure = match tokio::time::timeout(self.timeout, write).await {
                Ok(Ok(())) => None,
                Ok(Err(e)) => Some(e.to_string()),
                Err(_) => Some(format!(
                    "config write timed out after {}ms",
                    self.timeout.as_millis()
                )),
            };
            if let Some(reason) = failure {
                error!(path = %self.config_path.display(), error = %reason, "config apply failed");
                self.transition(ReconcilePhase::ConfigApplyFailed);
                return PassOutcome::ConfigApplyFailed { reason };
            }
            info!(
                path = %self.config_path.display(),
                fingerprint = %rendered.fingerprint.short(),
                "config written"
            );
        }
        self.transition(ReconcilePhase::ConfigApplied);

        match self.apply_process(spec, config_changed || command_changed).await {
            Ok(restarted) => {
                applied.fingerprint = Some(rendered.fingerprint.clone());
                applied.command = spec.command.clone();
                self.transition(ReconcilePhase::Reconciled);
                PassOutcome::Reconciled {
                    wrote_config,
                    restarted,
                }
            }
            Err(e @ SupervisorError::Unreachable(_)) => self.defer(e),
            Err(e) => {
                error!(service = %self.service_name, error = %e, "process step failed");
                // The config is on disk; only the process state is unknown.
                applied.fingerprint = Some(rendered.fingerprint.clone());
                applied.command = None;
                self.transition(ReconcilePhase::ProcessStartFailed);
                PassOutcome::ProcessFailed {
                    reason: e.to_string(),
                }
            }
        }
    }

    /// Register the spec if it changed and (re)start the service if needed.
    /// Returns whether the service was started.
    async fn apply_process(
        &mut self,
        spec: &ServiceSpec,
        applied_changed: bool,
    ) -> Result<bool, SupervisorError> {
        let service = self.service_name.clone();

        let current = bounded(self.timeout, self.supervisor.current_spec(&service)).await?;
        let spec_changed = match &current {
            Some(current) => current.differs_from(spec),
            None => true,
        };

        self.transition(ReconcilePhase::ProcessPending);

        if spec_changed {
            info!(%service, command = ?spec.command, "registering service spec");
            bounded(
                self.timeout,
                self.supervisor.set_spec(&service, spec.clone(), SpecMode::Merge),
            )
            .await?;
        }

        let running = bounded(self.timeout, self.supervisor.is_running(&service)).await?;

        if !spec_changed && !applied_changed && running {
            debug!(%service, "service spec unchanged and running");
            self.transition(ReconcilePhase::ProcessRunning);
            return Ok(false);
        }

        if running {
            info!(%service, "stopping service");
            bounded(self.stop_timeout, self.supervisor.stop(&service)).await?;
        }
        info!(%service, "starting service");
        bounded(self.timeout, self.supervisor.start(&service)).await?;

        self.transition(ReconcilePhase::ProcessRunning);
        Ok(true)
    }

    fn defer(&mut self, e: SupervisorError) -> PassOutcome {
        info!(error = %e, "supervisor not reachable, deferring");
        self.transition(ReconcilePhase::Idle);
        PassOutcome::Deferred {
            reason: e.to_string(),
        }
    }

    fn transition(&mut self, to: ReconcilePhase) {
        if self.phase != to {
            debug!(from = ?self.phase, ?to, "reconcile phase");
        }
        self.phase = to;
    }
}

/// Await a supervisor call, mapping expiry of `timeout` to `Unreachable`.
async fn bounded<T>(
    timeout: Duration,
    call: impl Future<Output = Result<T, SupervisorError>>,
) -> Result<T, SupervisorError> {
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => {
            warn!(timeout_ms = timeout.as_millis() as u64, "supervisor call timed out");
            Err(SupervisorError::Unreachable(format!(
                "no answer within {}ms",
                timeout.as_millis()
            )))
        }
    }
}

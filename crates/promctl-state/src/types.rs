//! Persisted unit state.

use serde::{Deserialize, Serialize};

use promctl_core::{Fingerprint, PeerRegistry};

/// The last configuration successfully applied to the managed process.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedState {
    /// Fingerprint of the document last written to the config location.
    pub fingerprint: Option<Fingerprint>,
    /// Command line the process was last started with. `None` when the
    /// last process step failed and the running command is unknown.
    pub command: Option<String>,
}

impl AppliedState {
    pub fn is_empty(&self) -> bool {
        self.fingerprint.is_none() && self.command.is_none()
    }
}

/// Everything a reconciliation pass reads at its start and writes at its end.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UnitState {
    pub registry: PeerRegistry,
    pub applied: AppliedState,
    /// Readiness latch; once true it is never written back as false.
    pub ready: bool,
}

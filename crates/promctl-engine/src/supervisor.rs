//! Seams to the outside world: the process supervisor that runs the
//! managed server, and the sink that receives rendered config bytes.

use std::path::Path;

use async_trait::async_trait;
use thiserror::Error;

use crate::command::{ServiceSpec, SpecMode};

#[derive(Debug, Error)]
pub enum SupervisorError {
    /// The supervisor could not be contacted, or did not answer in time.
    /// Expected during early startup; the pass is deferred.
    #[error("supervisor unreachable: {0}")]
    Unreachable(String),

    /// The supervisor answered but refused or failed the operation.
    #[error("supervisor command failed: {0}")]
    Command(String),
}

#[derive(Debug, Error)]
#[error("failed to write {path}: {reason}")]
pub struct SinkError {
    pub path: String,
    pub reason: String,
}

impl SinkError {
    pub fn new(path: &Path, reason: impl ToString) -> Self {
        Self {
            path: path.display().to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Process supervisor holding the managed server's service entry.
#[async_trait]
pub trait Supervisor: Send + Sync {
    /// Cheap liveness check.
    async fn ping(&self) -> Result<(), SupervisorError>;

    /// The spec currently registered for `service`, if any.
    async fn current_spec(&self, service: &str) -> Result<Option<ServiceSpec>, SupervisorError>;

    async fn set_spec(
        &self,
        service: &str,
        spec: ServiceSpec,
        mode: SpecMode,
    ) -> Result<(), SupervisorError>;

    async fn is_running(&self, service: &str) -> Result<bool, SupervisorError>;

    async fn stop(&self, service: &str) -> Result<(), SupervisorError>;

    async fn start(&self, service: &str) -> Result<(), SupervisorError>;
}

/// Destination for rendered configuration bytes.
#[async_trait]
pub trait ConfigSink: Send + Sync {
    async fn write(&self, path: &Path, bytes: &[u8]) -> Result<(), SinkError>;
}

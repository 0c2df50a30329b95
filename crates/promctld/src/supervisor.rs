//! In-process supervisor: holds service specs and runs each service as a
//! child process.
//!
//! A child stays in its entry until it has been reaped, so a stop that is
//! abandoned half way never drops a live process.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use promctl_engine::{ServiceSpec, SpecMode, Supervisor, SupervisorError};

#[derive(Default)]
struct ServiceEntry {
    spec: ServiceSpec,
    child: Option<Child>,
}

pub struct LocalSupervisor {
    services: Mutex<BTreeMap<String, ServiceEntry>>,
    /// Time a service gets to exit after SIGTERM before it is killed.
    stop_grace: Duration,
}

impl LocalSupervisor {
    pub fn new(stop_grace: Duration) -> Self {
        Self {
            services: Mutex::new(BTreeMap::new()),
            stop_grace,
        }
    }

    /// Stop every running service.
    pub async fn shutdown(&self) {
        let mut services = self.services.lock().await;
        for (name, entry) in services.iter_mut() {
            let Some(child) = entry.child.as_mut() else {
                continue;
            };
            info!(service = %name, "stopping service on shutdown");
            match terminate(child, self.stop_grace).await {
                Ok(()) => entry.child = None,
                Err(e) => warn!(service = %name, error = %e, "failed to stop service"),
            }
        }
    }
}

#[async_trait]
impl Supervisor for LocalSupervisor {
    async fn ping(&self) -> Result<(), SupervisorError> {
        Ok(())
    }

    async fn current_spec(&self, service: &str) -> Result<Option<ServiceSpec>, SupervisorError> {
        let services = self.services.lock().await;
        Ok(services.get(service).map(|entry| entry.spec.clone()))
    }

    async fn set_spec(
        &self,
        service: &str,
        spec: ServiceSpec,
        mode: SpecMode,
    ) -> Result<(), SupervisorError> {
        let mut services = self.services.lock().await;
        let entry = services.entry(service.to_string()).or_default();
        entry.spec = entry.spec.combine(&spec, mode);
        debug!(%service, ?mode, "service spec updated");
        Ok(())
    }

    async fn is_running(&self, service: &str) -> Result<bool, SupervisorError> {
        let mut services = self.services.lock().await;
        let Some(entry) = services.get_mut(service) else {
            return Ok(false);
        };
        let Some(child) = entry.child.as_mut() else {
            return Ok(false);
        };

        match child.try_wait() {
            Ok(None) => Ok(true),
            Ok(Some(status)) => {
                warn!(%service, %status, "service exited");
                entry.child = None;
                Ok(false)
            }
            Err(e) => Err(SupervisorError::Command(e.to_string())),
        }
    }

    async fn stop(&self, service: &str) -> Result<(), SupervisorError> {
        let mut services = self.services.lock().await;
        let Some(entry) = services.get_mut(service) else {
            return Ok(());
        };
        let Some(child) = entry.child.as_mut() else {
            return Ok(());
        };
        terminate(child, self.stop_grace)
            .await
            .map_err(|e| SupervisorError::Command(e.to_string()))?;
        entry.child = None;
        info!(%service, "service stopped");
        Ok(())
    }

    async fn start(&self, service: &str) -> Result<(), SupervisorError> {
        let mut services = self.services.lock().await;
        let entry = services
            .get_mut(service)
            .ok_or_else(|| SupervisorError::Command(format!("unknown service {service}")))?;

        if entry.child.is_some() {
            return Err(SupervisorError::Command(format!("{service} is already running")));
        }

        let command = entry
            .spec
            .command
            .as_deref()
            .ok_or_else(|| SupervisorError::Command(format!("{service} has no command")))?;
        let mut parts = command.split_whitespace();
        let program = parts
            .next()
            .ok_or_else(|| SupervisorError::Command(format!("{service} has an empty command")))?;

        let child = Command::new(program)
            .args(parts)
            .envs(&entry.spec.environment)
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| SupervisorError::Command(format!("failed to spawn {program}: {e}")))?;

        info!(%service, pid = child.id(), "service started");
        entry.child = Some(child);
        Ok(())
    }
}

/// SIGTERM, then SIGKILL if the child outlives `grace`. Returns once the
/// child has been reaped.
async fn terminate(child: &mut Child, grace: Duration) -> std::io::Result<()> {
    let Some(pid) = child.id() else {
        return Ok(());
    };

    match signal::kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
        Ok(()) => match tokio::time::timeout(grace, child.wait()).await {
            Ok(status) => {
                let status = status?;
                debug!(pid, %status, "child exited after SIGTERM");
                return Ok(());
            }
            Err(_) => warn!(pid, grace_ms = grace.as_millis() as u64, "child ignored SIGTERM, killing"),
        },
        Err(errno) => warn!(pid, error = %errno, "failed to send SIGTERM, killing"),
    }
    child.kill().await
}

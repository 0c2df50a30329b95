//! End-to-end reconciliation passes against in-memory collaborators.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use promctl_core::config::{PathsConfig, UnitConfig};
use promctl_core::peer_data::PeerData;
use promctl_core::{OperatorOptions, PeerId, RawOptions, Relation};
use promctl_engine::{
    ConfigSink, Engine, PassOutcome, ServiceSpec, SinkError, SpecMode, Supervisor,
    SupervisorError, Trigger, UnitStatus,
};
use promctl_probe::{BuildInfo, IdentityProbe};
use promctl_state::StateStore;

#[derive(Default)]
struct World {
    calls: Vec<String>,
    spec: Option<ServiceSpec>,
    running: bool,
    reachable: bool,
    fail_write: bool,
    files: Vec<Vec<u8>>,
    /// Port the managed server answers identity requests on, if any.
    serving: Option<u16>,
    asked_ports: Vec<u16>,
}

#[derive(Clone, Default)]
struct Shared(Arc<Mutex<World>>);

impl Shared {
    fn reachable() -> Self {
        let shared = Shared::default();
        shared.with(|w| w.reachable = true);
        shared
    }

    fn with<T>(&self, f: impl FnOnce(&mut World) -> T) -> T {
        f(&mut *self.0.lock().unwrap())
    }

    fn calls(&self) -> Vec<String> {
        self.with(|w| w.calls.clone())
    }

    fn count(&self, call: &str) -> usize {
        self.with(|w| w.calls.iter().filter(|c| *c == call).count())
    }

    fn last_file(&self) -> String {
        self.with(|w| String::from_utf8(w.files.last().cloned().unwrap_or_default()).unwrap())
    }

    fn check(&self) -> Result<(), SupervisorError> {
        if self.with(|w| w.reachable) {
            Ok(())
        } else {
            Err(SupervisorError::Unreachable("no socket".into()))
        }
    }
}

#[async_trait]
impl Supervisor for Shared {
    async fn ping(&self) -> Result<(), SupervisorError> {
        self.check()
    }

    async fn current_spec(&self, _: &str) -> Result<Option<ServiceSpec>, SupervisorError> {
        self.check()?;
        Ok(self.with(|w| w.spec.clone()))
    }

    async fn set_spec(&self, _: &str, spec: ServiceSpec, mode: SpecMode) -> Result<(), SupervisorError> {
        self.check()?;
        self.with(|w| {
            w.calls.push("set_spec".into());
            w.spec = Some(match w.spec.take() {
                Some(existing) => existing.combine(&spec, mode),
                None => spec,
            });
        });
        Ok(())
    }

    async fn is_running(&self, _: &str) -> Result<bool, SupervisorError> {
        self.check()?;
        Ok(self.with(|w| w.running))
    }

    async fn stop(&self, _: &str) -> Result<(), SupervisorError> {
        self.check()?;
        self.with(|w| {
            w.calls.push("stop".into());
            w.running = false;
        });
        Ok(())
    }

    async fn start(&self, _: &str) -> Result<(), SupervisorError> {
        self.check()?;
        self.with(|w| {
            w.calls.push("start".into());
            w.running = true;
        });
        Ok(())
    }
}

#[async_trait]
impl ConfigSink for Shared {
    async fn write(&self, path: &Path, bytes: &[u8]) -> Result<(), SinkError> {
        self.with(|w| {
            w.calls.push("write".into());
            if w.fail_write {
                return Err(SinkError::new(path, "disk full"));
            }
            w.files.push(bytes.to_vec());
            Ok(())
        })
    }
}

#[async_trait]
impl IdentityProbe for Shared {
    async fn probe(&self, port: u16) -> Option<BuildInfo> {
        self.with(|w| {
            w.asked_ports.push(port);
            w.serving == Some(port)
        })
        .then(|| BuildInfo {
            version: "2.33.5".to_string(),
            revision: None,
            branch: None,
            go_version: None,
        })
    }
}

fn engine(world: &Shared, store: StateStore, options: OperatorOptions) -> Engine<Shared, Shared, Shared> {
    Engine::new(
        store,
        options,
        PathsConfig::default(),
        UnitConfig::default(),
        world.clone(),
        world.clone(),
        world.clone(),
    )
}

fn data(key: &str, value: &str) -> PeerData {
    PeerData::from([(key.to_string(), value.to_string())])
}

fn alertmanager(peer: &str, addrs: &str) -> Trigger {
    Trigger::PeerDataChanged {
        relation: Relation::Alertmanager,
        peer: PeerId::from(peer),
        data: data("addrs", addrs),
    }
}

#[tokio::test]
async fn identical_inputs_write_and_restart_at_most_once() {
    let world = Shared::reachable();
    let mut engine = engine(&world, StateStore::open_in_memory().unwrap(), OperatorOptions::new(9090));

    let options = engine.options().clone();
    engine.handle(Trigger::OperatorChanged(options.clone())).await.unwrap();
    engine.handle(Trigger::OperatorChanged(options)).await.unwrap();

    assert_eq!(world.count("write"), 1);
    assert!(world.count("start") <= 1);
    assert_eq!(world.count("stop"), 0);
}

#[tokio::test]
async fn unchanged_trigger_touches_nothing() {
    let world = Shared::reachable();
    let mut engine = engine(&world, StateStore::open_in_memory().unwrap(), OperatorOptions::new(9090));

    engine.handle(alertmanager("am/0", r#"["10.0.0.5:9093"]"#)).await.unwrap();
    let before = world.calls();

    let report = engine.handle(alertmanager("am/0", r#"["10.0.0.5:9093"]"#)).await.unwrap();

    assert_eq!(
        report.outcome,
        Some(PassOutcome::Reconciled {
            wrote_config: false,
            restarted: false
        })
    );
    assert_eq!(report.status, UnitStatus::Active);
    assert_eq!(world.calls(), before);
}

#[tokio::test]
async fn alertmanager_leaving_drops_alerting_section() {
    let world = Shared::reachable();
    let mut engine = engine(&world, StateStore::open_in_memory().unwrap(), OperatorOptions::new(9090));

    engine.handle(alertmanager("am/0", r#"["10.0.0.5:9093"]"#)).await.unwrap();
    assert!(world.last_file().contains("alerting"));
    assert!(world.last_file().contains("10.0.0.5:9093"));

    engine
        .handle(Trigger::PeerLeft {
            relation: Relation::Alertmanager,
            peer: PeerId::from("am/0"),
        })
        .await
        .unwrap();

    assert!(!world.last_file().contains("alerting"));
    // The config changed but the command line did not: one restart, no new spec.
    assert_eq!(world.count("set_spec"), 1);
    assert_eq!(world.calls().last().map(String::as_str), Some("start"));
}

#[tokio::test]
async fn invalid_retention_is_omitted() {
    let raw = RawOptions {
        port: 9090,
        tsdb_retention_time: Some("15x".to_string()),
        ..Default::default()
    };
    let world = Shared::reachable();
    let mut engine = engine(
        &world,
        StateStore::open_in_memory().unwrap(),
        OperatorOptions::from_raw(&raw).unwrap(),
    );

    let report = engine.handle(Trigger::SupervisorReachable).await.unwrap();
    assert!(report.outcome.unwrap().is_reconciled());

    let command = world.with(|w| w.spec.clone().and_then(|s| s.command)).unwrap();
    assert!(!command.contains("--storage.tsdb.retention.time"));
    assert!(world.last_file().contains("localhost:9090"));
}

#[tokio::test]
async fn scrape_jobs_from_monitoring_peers() {
    let world = Shared::reachable();
    let mut engine = engine(&world, StateStore::open_in_memory().unwrap(), OperatorOptions::new(9090));

    let jobs = r#"[{"job_name":"node","static_configs":[{"targets":["10.0.0.7:9100"]}]},{"scheme":"http"}]"#;
    engine
        .handle(Trigger::PeerDataChanged {
            relation: Relation::Monitoring,
            peer: PeerId::from("node-exporter/0"),
            data: data("scrape_jobs", jobs),
        })
        .await
        .unwrap();

    let file = world.last_file();
    let self_job = file.find("job_name: prometheus").unwrap();
    let node_job = file.find("job_name: node").unwrap();
    assert!(self_job < node_job);
    assert!(file.contains("10.0.0.7:9100"));
}

#[tokio::test]
async fn unreachable_supervisor_defers_then_recovers() {
    let world = Shared::default();
    let mut engine = engine(&world, StateStore::open_in_memory().unwrap(), OperatorOptions::new(9090));

    let report = engine.handle(alertmanager("am/0", r#"["10.0.0.5:9093"]"#)).await.unwrap();
    assert!(matches!(report.outcome, Some(PassOutcome::Deferred { .. })));
    assert!(matches!(report.status, UnitStatus::Waiting(_)));
    assert!(world.calls().is_empty());
    assert!(engine.store().get_applied().unwrap().is_empty());

    // The registry change survived the deferred pass.
    world.with(|w| w.reachable = true);
    let report = engine.handle(Trigger::SupervisorReachable).await.unwrap();
    assert!(report.outcome.unwrap().is_reconciled());
    assert!(world.last_file().contains("10.0.0.5:9093"));
}

#[tokio::test]
async fn write_failure_retries_on_next_trigger() {
    let world = Shared::reachable();
    world.with(|w| w.fail_write = true);
    let mut engine = engine(&world, StateStore::open_in_memory().unwrap(), OperatorOptions::new(9090));

    let report = engine.handle(Trigger::SupervisorReachable).await.unwrap();
    assert!(matches!(report.outcome, Some(PassOutcome::ConfigApplyFailed { .. })));
    assert!(matches!(report.status, UnitStatus::Degraded(_)));
    assert!(engine.store().get_applied().unwrap().is_empty());

    world.with(|w| w.fail_write = false);
    let options = engine.options().clone();
    let report = engine.handle(Trigger::OperatorChanged(options)).await.unwrap();
    assert!(report.outcome.unwrap().is_reconciled());
    assert_eq!(
        engine.store().get_applied().unwrap().fingerprint,
        report.fingerprint
    );
}

#[tokio::test]
async fn log_level_change_restarts_with_new_command() {
    let world = Shared::reachable();
    world.with(|w| w.running = true);
    let mut engine = engine(&world, StateStore::open_in_memory().unwrap(), OperatorOptions::new(9090));
    engine.handle(Trigger::SupervisorReachable).await.unwrap();

    let mut options = engine.options().clone();
    options.log_level = promctl_core::LogLevel::Warn;
    let report = engine.handle(Trigger::OperatorChanged(options)).await.unwrap();

    assert_eq!(
        report.outcome,
        Some(PassOutcome::Reconciled {
            wrote_config: false,
            restarted: true
        })
    );
    assert_eq!(world.calls(), vec!["write", "set_spec", "stop", "start", "set_spec", "stop", "start"]);
    let command = world.with(|w| w.spec.clone().and_then(|s| s.command)).unwrap();
    assert!(command.contains("--log.level=warn"));
}

#[tokio::test]
async fn readiness_gates_publications_and_persists() {
    let world = Shared::reachable();
    let store = StateStore::open_in_memory().unwrap();
    let mut engine = engine(&world, store.clone(), OperatorOptions::new(9090));

    let report = engine.handle(Trigger::SupervisorReachable).await.unwrap();
    assert!(!report.ready);
    assert!(report.publications.is_empty());

    assert_eq!(report.version, None);

    world.with(|w| w.serving = Some(9090));
    let report = engine.handle(Trigger::SupervisorReachable).await.unwrap();
    assert!(report.ready);
    assert_eq!(report.version.as_deref(), Some("2.33.5"));
    assert_eq!(report.publications.len(), 2);

    // A fresh engine over the same store stays ready with the server down.
    world.with(|w| w.serving = None);
    let mut engine = self::engine(&world, store, OperatorOptions::new(9090));
    let report = engine.handle(Trigger::SupervisorReachable).await.unwrap();
    assert!(report.ready);
    assert!(!report.publications.is_empty());
}

#[tokio::test]
async fn stop_reports_maintenance_without_reconciling() {
    let world = Shared::reachable();
    let mut engine = engine(&world, StateStore::open_in_memory().unwrap(), OperatorOptions::new(9090));

    let report = engine.handle(Trigger::Stop).await.unwrap();

    assert_eq!(report.outcome, None);
    assert_eq!(report.status, UnitStatus::Maintenance("Pod is terminating.".to_string()));
    assert!(world.calls().is_empty());
}

#[tokio::test]
async fn remote_write_targets_rendered() {
    let world = Shared::reachable();
    let mut engine = engine(&world, StateStore::open_in_memory().unwrap(), OperatorOptions::new(9090));

    engine
        .handle(Trigger::PeerDataChanged {
            relation: Relation::RemoteWrite,
            peer: PeerId::from("cortex/0"),
            data: data("remote_write_endpoint", "http://10.0.0.9:9009/api/v1/push"),
        })
        .await
        .unwrap();
    assert!(world.last_file().contains("remote_write"));

    engine
        .handle(Trigger::PeerLeft {
            relation: Relation::RemoteWrite,
            peer: PeerId::from("cortex/0"),
        })
        .await
        .unwrap();
    assert!(!world.last_file().contains("remote_write"));
}

#[tokio::test]
async fn leaving_one_relation_keeps_other_announcements() {
    let world = Shared::reachable();
    let mut engine = engine(&world, StateStore::open_in_memory().unwrap(), OperatorOptions::new(9090));
    let agent = PeerId::from("agent/0");

    let jobs = r#"[{"job_name":"node","static_configs":[{"targets":["10.0.0.7:9100"]}]}]"#;
    engine
        .handle(Trigger::PeerDataChanged {
            relation: Relation::Monitoring,
            peer: agent.clone(),
            data: data("scrape_jobs", jobs),
        })
        .await
        .unwrap();
    engine
        .handle(Trigger::PeerDataChanged {
            relation: Relation::RemoteWrite,
            peer: agent.clone(),
            data: data("remote_write_endpoint", "http://10.0.0.9:9009/api/v1/push"),
        })
        .await
        .unwrap();
    assert!(world.last_file().contains("job_name: node"));
    assert!(world.last_file().contains("remote_write"));

    engine
        .handle(Trigger::PeerLeft {
            relation: Relation::RemoteWrite,
            peer: agent.clone(),
        })
        .await
        .unwrap();

    let file = world.last_file();
    assert!(!file.contains("remote_write"));
    assert!(file.contains("job_name: node"));
    assert!(file.contains("10.0.0.7:9100"));
    assert!(engine.store().get_registry().unwrap().peers().contains(&agent));
}

#[tokio::test]
async fn identity_check_follows_port_change() {
    let world = Shared::reachable();
    world.with(|w| w.serving = Some(9191));
    let mut engine = engine(&world, StateStore::open_in_memory().unwrap(), OperatorOptions::new(9090));

    let report = engine.handle(Trigger::SupervisorReachable).await.unwrap();
    assert!(!report.ready);

    let mut options = engine.options().clone();
    options.port = 9191;
    let report = engine.handle(Trigger::OperatorChanged(options)).await.unwrap();

    assert!(report.ready);
    assert_eq!(world.with(|w| w.asked_ports.clone()), vec![9090, 9191]);
    assert!(report.publications.iter().any(|p| p.fields.values().any(|v| v.contains("9191"))));
}

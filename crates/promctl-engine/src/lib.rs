//! promctl-engine — reconciles the managed server's configuration against
//! operator options and peer announcements.
//!
//! # Architecture
//!
//! ```text
//! Trigger ──► Engine::handle (one pass, run to completion)
//!               ├── StateStore::load_unit_state
//!               ├── apply trigger to PeerRegistry
//!               ├── synthesize(options, snapshot) → DesiredConfig
//!               ├── render → RenderedConfig { bytes, fingerprint }
//!               ├── ServiceReconciler::reconcile
//!               │     Idle → ConfigPending → ConfigApplied
//!               │          → ProcessPending → ProcessRunning → Reconciled
//!               ├── ReadinessTracker::probe
//!               └── StateStore::save_unit_state (single transaction)
//! ```
//!
//! A pass never fails outright: expected conditions (supervisor not yet
//! reachable, write failure, process failure) come back as a
//! [`PassOutcome`] and the next trigger retries from scratch.

pub mod command;
pub mod engine;
pub mod error;
pub mod fingerprint;
pub mod publish;
pub mod reconciler;
pub mod supervisor;
pub mod synth;
pub mod trigger;

pub use command::{ServiceSpec, SpecMode, Startup, build_args, build_command, desired_service_spec};
pub use engine::{Engine, PassReport, TERMINATING_MESSAGE, UnitStatus, dry_run, preview};
pub use error::{EngineError, EngineResult};
pub use fingerprint::{RenderedConfig, fingerprint, needs_apply, render};
pub use publish::{Publication, endpoint_url, publications};
pub use reconciler::{PassOutcome, ReconcilePhase, ServiceReconciler};
pub use supervisor::{ConfigSink, SinkError, Supervisor, SupervisorError};
pub use synth::{DesiredConfig, synthesize};
pub use trigger::{PeerEvent, Trigger};

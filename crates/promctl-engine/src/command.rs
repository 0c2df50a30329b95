//! Service spec — the managed server's command line and the
//! service entry registered with the supervisor.
//!
//! Derived only from operator options and paths, never from the rendered
//! document, so a peer change alone can never alter the command line.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use promctl_core::OperatorOptions;
use promctl_core::config::PathsConfig;

/// How `set_spec` combines a new spec with the one already registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpecMode {
    /// The new spec replaces the old one entirely.
    Replace,
    /// Fields set in the new spec override; unset fields keep their old value.
    Merge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Startup {
    Enabled,
    Disabled,
}

/// A service entry as registered with the process supervisor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub startup: Option<Startup>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub environment: BTreeMap<String, String>,
}

impl ServiceSpec {
    /// `self` with every field set in `other` applied on top.
    pub fn merged(&self, other: &ServiceSpec) -> ServiceSpec {
        let mut environment = self.environment.clone();
        environment.extend(other.environment.clone());
        ServiceSpec {
            summary: other.summary.clone().or_else(|| self.summary.clone()),
            command: other.command.clone().or_else(|| self.command.clone()),
            startup: other.startup.or(self.startup),
            environment,
        }
    }

    /// Combine according to `mode`.
    pub fn combine(&self, other: &ServiceSpec, mode: SpecMode) -> ServiceSpec {
        match mode {
            SpecMode::Replace => other.clone(),
            SpecMode::Merge => self.merged(other),
        }
    }

    /// Whether registering `desired` with merge semantics would change `self`.
    pub fn differs_from(&self, desired: &ServiceSpec) -> bool {
        self.merged(desired) != *self
    }
}

/// Command-line arguments for the managed server.
pub fn build_args(options: &OperatorOptions, paths: &PathsConfig) -> Vec<String> {
    let mut args = vec![
        format!("--config.file={}", paths.config_file.display()),
        format!("--storage.tsdb.path={}", paths.storage.display()),
        "--web.enable-lifecycle".to_string(),
        format!("--web.console.templates={}", paths.console_templates.display()),
        format!("--web.console.libraries={}", paths.console_libraries.display()),
        format!("--log.level={}", options.log_level),
    ];

    if options.wal_compression {
        args.push("--storage.tsdb.wal-compression".to_string());
    }

    if let Some(retention) = options.retention {
        args.push(format!("--storage.tsdb.retention.time={retention}"));
    }

    args
}

/// Full command line: binary followed by [`build_args`], space separated.
pub fn build_command(options: &OperatorOptions, paths: &PathsConfig) -> String {
    let mut parts = vec![paths.binary.display().to_string()];
    parts.extend(build_args(options, paths));
    parts.join(" ")
}

/// The service entry promctl wants the supervisor to hold.
pub fn desired_service_spec(options: &OperatorOptions, paths: &PathsConfig) -> ServiceSpec {
    ServiceSpec {
        summary: Some("prometheus daemon".to_string()),
        command: Some(build_command(options, paths)),
        startup: Some(Startup::Enabled),
        environment: BTreeMap::new(),
    }
}

//! Operator options: raw administrator knobs and their validated form.
//!
//! Validation degrades instead of failing. A malformed time span or label
//! set is logged and omitted, an unknown log level falls back to `debug`.
//! Only the listening port is mandatory.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, warn};

use crate::timespec::TimeSpec;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum OptionsError {
    #[error("listening port must be a positive integer")]
    InvalidPort,

    #[error("cannot parse external labels: {0}")]
    Labels(String),
}

/// Verbosity passed to the managed server via `--log.level`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Warn,
    Error,
    Fatal,
}

impl LogLevel {
    pub const ALL: [LogLevel; 5] = [
        LogLevel::Debug,
        LogLevel::Info,
        LogLevel::Warn,
        LogLevel::Error,
        LogLevel::Fatal,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
            LogLevel::Fatal => "fatal",
        }
    }

    /// Resolve an operator-supplied level. Absent or empty means `info`,
    /// anything unrecognised means `debug`.
    pub fn resolve(raw: Option<&str>) -> Self {
        let raw = match raw.map(str::trim) {
            Some(r) if !r.is_empty() => r,
            _ => return LogLevel::Info,
        };
        match raw.parse() {
            Ok(level) => level,
            Err(()) => {
                let allowed: Vec<&str> = Self::ALL.iter().map(LogLevel::as_str).collect();
                error!(
                    given = %raw,
                    allowed = %allowed.join("/"),
                    "invalid log level, defaulting to debug"
                );
                LogLevel::Debug
            }
        }
    }
}

impl FromStr for LogLevel {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|level| level.as_str() == lower)
            .ok_or(())
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Options exactly as the administrator wrote them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawOptions {
    pub port: u32,
    pub log_level: Option<String>,
    #[serde(default)]
    pub tsdb_wal_compression: bool,
    pub tsdb_retention_time: Option<String>,
    /// JSON object of string to string.
    pub external_labels: Option<String>,
    pub scrape_interval: Option<String>,
    pub scrape_timeout: Option<String>,
    pub evaluation_interval: Option<String>,
}

/// Immutable, validated snapshot of the operator knobs for one pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperatorOptions {
    pub port: u16,
    pub log_level: LogLevel,
    pub wal_compression: bool,
    pub retention: Option<TimeSpec>,
    pub external_labels: BTreeMap<String, String>,
    pub scrape_interval: Option<TimeSpec>,
    pub scrape_timeout: Option<TimeSpec>,
    pub evaluation_interval: Option<TimeSpec>,
}

impl OperatorOptions {
    /// Defaults for everything except the port.
    pub fn new(port: u16) -> Self {
        Self {
            port,
            log_level: LogLevel::Info,
            wal_compression: false,
            retention: None,
            external_labels: BTreeMap::new(),
            scrape_interval: None,
            scrape_timeout: None,
            evaluation_interval: None,
        }
    }

    /// Validate raw options. Fails only on a missing or out-of-range port.
    pub fn from_raw(raw: &RawOptions) -> Result<Self, OptionsError> {
        let port = u16::try_from(raw.port)
            .ok()
            .filter(|p| *p > 0)
            .ok_or(OptionsError::InvalidPort)?;

        let external_labels = match raw.external_labels.as_deref().map(str::trim) {
            Some(json) if !json.is_empty() => parse_external_labels(json).unwrap_or_else(|e| {
                error!(error = %e, "ignoring external labels");
                BTreeMap::new()
            }),
            _ => BTreeMap::new(),
        };

        Ok(Self {
            port,
            log_level: LogLevel::resolve(raw.log_level.as_deref()),
            wal_compression: raw.tsdb_wal_compression,
            retention: validated_timespec("tsdb_retention_time", raw.tsdb_retention_time.as_deref()),
            external_labels,
            scrape_interval: validated_timespec("scrape_interval", raw.scrape_interval.as_deref()),
            scrape_timeout: validated_timespec("scrape_timeout", raw.scrape_timeout.as_deref()),
            evaluation_interval: validated_timespec(
                "evaluation_interval",
                raw.evaluation_interval.as_deref(),
            ),
        })
    }
}

/// Parse an external label set. The whole set is rejected if the input is
/// not a JSON object whose keys and values are all strings.
pub fn parse_external_labels(json: &str) -> Result<BTreeMap<String, String>, OptionsError> {
    serde_json::from_str(json).map_err(|e| OptionsError::Labels(e.to_string()))
}

fn validated_timespec(field: &'static str, raw: Option<&str>) -> Option<TimeSpec> {
    let raw = raw?;
    if raw.trim().is_empty() {
        return None;
    }
    match raw.parse() {
        Ok(spec) => Some(spec),
        Err(e) => {
            warn!(%field, value = %raw, error = %e, "omitting invalid time spec");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(port: u32) -> RawOptions {
        RawOptions {
            port,
            ..Default::default()
        }
    }

    #[test]
    fn log_level_defaults_to_info() {
        assert_eq!(LogLevel::resolve(None), LogLevel::Info);
        assert_eq!(LogLevel::resolve(Some("")), LogLevel::Info);
    }

    #[test]
    fn log_level_is_case_insensitive() {
        assert_eq!(LogLevel::resolve(Some("WARN")), LogLevel::Warn);
        assert_eq!(LogLevel::resolve(Some("Fatal")), LogLevel::Fatal);
    }

    #[test]
    fn invalid_log_level_coerced_to_debug() {
        assert_eq!(LogLevel::resolve(Some("verbose")), LogLevel::Debug);
    }

    #[test]
    fn port_is_required() {
        assert_eq!(OperatorOptions::from_raw(&raw(0)), Err(OptionsError::InvalidPort));
        assert_eq!(OperatorOptions::from_raw(&raw(70_000)), Err(OptionsError::InvalidPort));
        assert_eq!(OperatorOptions::from_raw(&raw(9090)).unwrap().port, 9090);
    }

    #[test]
    fn invalid_timespecs_are_omitted() {
        let mut r = raw(9090);
        r.tsdb_retention_time = Some("15x".to_string());
        r.scrape_interval = Some("30s".to_string());
        r.scrape_timeout = Some("-5m".to_string());
        r.evaluation_interval = Some(String::new());

        let opts = OperatorOptions::from_raw(&r).unwrap();
        assert_eq!(opts.retention, None);
        assert_eq!(opts.scrape_interval.map(|s| s.to_string()), Some("30s".to_string()));
        assert_eq!(opts.scrape_timeout, None);
        assert_eq!(opts.evaluation_interval, None);
    }

    #[test]
    fn external_labels_parse_as_object() {
        let labels = parse_external_labels(r#"{"cluster": "eu-1", "env": "prod"}"#).unwrap();
        assert_eq!(labels.len(), 2);
        assert_eq!(labels["cluster"], "eu-1");
    }

    #[test]
    fn external_labels_rejected_wholesale() {
        // One non-string value poisons the whole set.
        assert!(parse_external_labels(r#"{"cluster": "eu-1", "replica": 2}"#).is_err());
        assert!(parse_external_labels(r#"["cluster"]"#).is_err());
        assert!(parse_external_labels("not json").is_err());

        let mut r = raw(9090);
        r.external_labels = Some(r#"{"cluster": "eu-1", "replica": 2}"#.to_string());
        let opts = OperatorOptions::from_raw(&r).unwrap();
        assert!(opts.external_labels.is_empty());
    }

    #[test]
    fn wal_compression_passes_through() {
        let mut r = raw(9090);
        r.tsdb_wal_compression = true;
        assert!(OperatorOptions::from_raw(&r).unwrap().wal_compression);
    }
}

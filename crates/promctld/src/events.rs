//! Trigger sources: peer events on stdin, SIGHUP reloads, shutdown signals.
//!
//! Every source feeds one mpsc queue; the main loop is its only consumer,
//! so passes never overlap.

use std::path::PathBuf;

use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use promctl_core::{DaemonConfig, OperatorOptions};
use promctl_engine::{PeerEvent, Trigger};

/// Parse one line of the peer event stream. Blank lines and `#` comments
/// are skipped; malformed lines are logged and skipped.
pub fn parse_event_line(line: &str) -> Option<Trigger> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }
    match serde_json::from_str::<PeerEvent>(line) {
        Ok(event) => Some(event.into()),
        Err(e) => {
            warn!(error = %e, "ignoring malformed peer event");
            None
        }
    }
}

/// Forward peer events from `reader` until EOF or until the queue closes.
pub async fn forward_events<R>(reader: R, tx: mpsc::Sender<Trigger>)
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let Some(trigger) = parse_event_line(&line) else {
                    continue;
                };
                debug!(trigger = trigger.name(), "peer event received");
                if tx.send(trigger).await.is_err() {
                    return;
                }
            }
            Ok(None) => {
                debug!("peer event stream closed");
                return;
            }
            Err(e) => {
                error!(error = %e, "failed to read peer events");
                return;
            }
        }
    }
}

/// Reload options from `config_path`.
pub fn reload_options(config_path: &std::path::Path) -> anyhow::Result<OperatorOptions> {
    let config = DaemonConfig::from_file(config_path)?;
    Ok(OperatorOptions::from_raw(&config.options)?)
}

/// SIGHUP → operator-changed; SIGTERM/SIGINT → stop.
pub async fn forward_signals(config_path: PathBuf, tx: mpsc::Sender<Trigger>) -> anyhow::Result<()> {
    let mut hangup = signal(SignalKind::hangup())?;
    let mut terminate = signal(SignalKind::terminate())?;
    let mut interrupt = signal(SignalKind::interrupt())?;

    loop {
        let trigger = tokio::select! {
            _ = hangup.recv() => match reload_options(&config_path) {
                Ok(options) => {
                    info!(path = %config_path.display(), "configuration reloaded");
                    Trigger::OperatorChanged(options)
                }
                Err(e) => {
                    error!(path = %config_path.display(), error = %e, "reload failed, keeping current options");
                    continue;
                }
            },
            _ = terminate.recv() => Trigger::Stop,
            _ = interrupt.recv() => Trigger::Stop,
        };

        let stop = matches!(trigger, Trigger::Stop);
        if tx.send(trigger).await.is_err() || stop {
            return Ok(());
        }
    }
}

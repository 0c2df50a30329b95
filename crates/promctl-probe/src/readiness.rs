//! Readiness tracking.
//!
//! The latch starts false and flips to true on the first successful
//! identity probe. Nothing flips it back, so behaviours gated on readiness
//! (publishing endpoints to peers) never flap.

use tracing::{debug, info};

use crate::identity::{BuildInfo, IdentityProbe};

/// Monotonic boolean: false until set, true forever after.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadinessLatch {
    ready: bool,
}

impl ReadinessLatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restore a persisted latch value.
    pub fn restored(ready: bool) -> Self {
        Self { ready }
    }

    /// Record one probe outcome and return the latch value.
    pub fn record(&mut self, identity: Option<&BuildInfo>) -> bool {
        if let Some(info) = identity {
            if !self.ready {
                info!(version = %info.version, "managed server answered identity probe, now ready");
            }
            self.ready = true;
        }
        self.ready
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }
}

/// Drives an [`IdentityProbe`] and feeds its results into a latch.
pub struct ReadinessTracker<P> {
    probe: P,
    latch: ReadinessLatch,
    last_version: Option<String>,
}

impl<P: IdentityProbe> ReadinessTracker<P> {
    pub fn new(probe: P) -> Self {
        Self {
            probe,
            latch: ReadinessLatch::new(),
            last_version: None,
        }
    }

    /// Seed the latch from persisted state. Can set it, never clear it.
    pub fn restore(&mut self, ready: bool) {
        if ready {
            self.latch = ReadinessLatch::restored(true);
        }
    }

    /// Probe the managed server on `port` once.
    pub async fn probe(&mut self, port: u16) -> Option<BuildInfo> {
        let identity = self.probe.probe(port).await;
        match &identity {
            Some(info) => self.last_version = Some(info.version.clone()),
            None => debug!(ready = self.latch.is_ready(), "managed server identity unavailable"),
        }
        self.latch.record(identity.as_ref());
        identity
    }

    pub fn is_ready(&self) -> bool {
        self.latch.is_ready()
    }

    /// Version reported by the last successful probe.
    pub fn version(&self) -> Option<&str> {
        self.last_version.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::VecDeque;
    use std::sync::Mutex;

    use async_trait::async_trait;

    /// Replays a fixed sequence of probe outcomes.
    struct ScriptedProbe {
        outcomes: Mutex<VecDeque<Option<BuildInfo>>>,
    }

    impl ScriptedProbe {
        fn new(outcomes: Vec<Option<BuildInfo>>) -> Self {
            Self {
                outcomes: Mutex::new(outcomes.into()),
            }
        }
    }

    #[async_trait]
    impl IdentityProbe for ScriptedProbe {
        async fn probe(&self, _port: u16) -> Option<BuildInfo> {
            self.outcomes.lock().unwrap().pop_front().flatten()
        }
    }

    fn info(version: &str) -> BuildInfo {
        BuildInfo {
            version: version.to_string(),
            revision: None,
            branch: None,
            go_version: None,
        }
    }

    #[test]
    fn latch_starts_unset() {
        assert!(!ReadinessLatch::new().is_ready());
    }

    #[test]
    fn latch_sets_on_first_success() {
        let mut latch = ReadinessLatch::new();
        assert!(!latch.record(None));
        assert!(latch.record(Some(&info("2.33.5"))));
    }

    #[test]
    fn latch_never_reverts() {
        let mut latch = ReadinessLatch::new();
        latch.record(Some(&info("2.33.5")));
        for _ in 0..10 {
            assert!(latch.record(None));
        }
        assert!(latch.is_ready());
    }

    #[tokio::test]
    async fn tracker_stays_ready_after_failures() {
        let mut tracker = ReadinessTracker::new(ScriptedProbe::new(vec![
            None,
            Some(info("2.33.5")),
            None,
            None,
        ]));

        assert!(tracker.probe(9090).await.is_none());
        assert!(!tracker.is_ready());

        assert!(tracker.probe(9090).await.is_some());
        assert!(tracker.is_ready());
        assert_eq!(tracker.version(), Some("2.33.5"));

        assert!(tracker.probe(9090).await.is_none());
        assert!(tracker.probe(9090).await.is_none());
        assert!(tracker.is_ready());
    }

    #[tokio::test]
    async fn restore_sets_but_never_clears() {
        let mut tracker = ReadinessTracker::new(ScriptedProbe::new(vec![None]));
        tracker.restore(true);
        assert!(tracker.is_ready());

        tracker.restore(false);
        tracker.probe(9090).await;
        assert!(tracker.is_ready());
    }
}

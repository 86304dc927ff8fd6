//! Liveness tracking.
//!
//! The supervisor records every inbound frame and calls [`KeepAlive::check`]
//! on each keepalive tick. A connection that stays silent past the deadline
//! is considered dead even if the socket never reports a close.

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use tokio::time::Instant;

use super::config::KeepAliveConfig;

// ============================================================================
// KeepAliveCheck
// ============================================================================

/// Outcome of a keepalive tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum KeepAliveCheck {
    /// Connection alive; send a ping probe.
    Probe,

    /// No inbound frame within the deadline.
    Expired {
        /// Time since the last inbound frame.
        elapsed: Duration,
    },
}

// ============================================================================
// KeepAlive
// ============================================================================

/// Liveness monitor for one connection generation.
#[derive(Debug)]
pub(crate) struct KeepAlive {
    config: KeepAliveConfig,
    last_liveness: Instant,
    active: bool,
}

impl KeepAlive {
    /// Creates an inactive monitor.
    #[must_use]
    pub(crate) fn new(config: KeepAliveConfig) -> Self {
        Self {
            config,
            last_liveness: Instant::now(),
            active: false,
        }
    }

    /// Starts monitoring; the start time counts as liveness.
    pub(crate) fn start(&mut self) {
        self.active = true;
        self.last_liveness = Instant::now();
    }

    /// Stops monitoring.
    pub(crate) fn stop(&mut self) {
        self.active = false;
    }

    /// Returns `true` between `start` and `stop`.
    #[inline]
    #[must_use]
    pub(crate) fn is_active(&self) -> bool {
        self.active
    }

    /// Records proof of liveness.
    #[inline]
    pub(crate) fn record(&mut self) {
        self.last_liveness = Instant::now();
    }

    /// Probe interval.
    #[inline]
    #[must_use]
    pub(crate) fn interval(&self) -> Duration {
        self.config.interval
    }

    /// Liveness deadline.
    #[inline]
    #[must_use]
    pub(crate) fn deadline(&self) -> Duration {
        self.config.deadline
    }

    /// Evaluates liveness at `now`. Returns `None` while inactive.
    #[must_use]
    pub(crate) fn check(&self, now: Instant) -> Option<KeepAliveCheck> {
        if !self.active {
            return None;
        }

        let elapsed = now.saturating_duration_since(self.last_liveness);
        if elapsed > self.config.deadline {
            Some(KeepAliveCheck::Expired { elapsed })
        } else {
            Some(KeepAliveCheck::Probe)
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> KeepAliveConfig {
        KeepAliveConfig::new(Duration::from_secs(30), Duration::from_secs(45))
    }

    #[tokio::test(start_paused = true)]
    async fn test_inactive_monitor_never_fires() {
        let monitor = KeepAlive::new(config());
        tokio::time::advance(Duration::from_secs(120)).await;
        assert_eq!(monitor.check(Instant::now()), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe_within_deadline() {
        let mut monitor = KeepAlive::new(config());
        monitor.start();
        tokio::time::advance(Duration::from_secs(30)).await;
        assert_eq!(monitor.check(Instant::now()), Some(KeepAliveCheck::Probe));
    }

    #[tokio::test(start_paused = true)]
    async fn test_expires_after_deadline() {
        let mut monitor = KeepAlive::new(config());
        monitor.start();
        tokio::time::advance(Duration::from_secs(46)).await;
        assert!(matches!(
            monitor.check(Instant::now()),
            Some(KeepAliveCheck::Expired { elapsed }) if elapsed >= Duration::from_secs(46)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_record_resets_deadline() {
        let mut monitor = KeepAlive::new(config());
        monitor.start();
        tokio::time::advance(Duration::from_secs(40)).await;
        monitor.record();
        tokio::time::advance(Duration::from_secs(40)).await;
        assert_eq!(monitor.check(Instant::now()), Some(KeepAliveCheck::Probe));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_deactivates() {
        let mut monitor = KeepAlive::new(config());
        monitor.start();
        monitor.stop();
        assert!(!monitor.is_active());
        tokio::time::advance(Duration::from_secs(90)).await;
        assert_eq!(monitor.check(Instant::now()), None);
    }
}

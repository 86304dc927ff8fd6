//! Session configuration.
//!
//! Plain data with `Default` values matching the Home Assistant client the
//! protocol was designed for, plus `with_*` builder methods.
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use hass_websocket::{ReconnectConfig, SessionConfig};
//!
//! let config = SessionConfig::new()
//!     .with_command_timeout(Duration::from_secs(5))
//!     .with_reconnect(ReconnectConfig::new().with_max_attempts(10));
//! config.validate()?;
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_MAX_PENDING: usize = 256;
const DEFAULT_EVENT_BUFFER: usize = 1024;

const DEFAULT_KEEPALIVE_INTERVAL: Duration = Duration::from_secs(30);
const DEFAULT_KEEPALIVE_DEADLINE: Duration = Duration::from_secs(45);

const DEFAULT_INITIAL_DELAY: Duration = Duration::from_secs(1);
const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(30);
const DEFAULT_MAX_ATTEMPTS: u32 = 5;

// ============================================================================
// SessionConfig
// ============================================================================

/// Configuration for a [`Session`](crate::Session).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Per-command deadline, measured from transmission.
    pub command_timeout: Duration,

    /// Deadline for `auth_required` → `auth_ok` after the socket opens.
    pub handshake_timeout: Duration,

    /// Deadline for TCP connect plus WebSocket upgrade.
    pub connect_timeout: Duration,

    /// Maximum number of commands pending or queued at once.
    pub max_pending: usize,

    /// Capacity of the broadcast event stream.
    pub event_buffer: usize,

    /// Liveness probing.
    pub keepalive: KeepAliveConfig,

    /// Reconnection policy.
    pub reconnect: ReconnectConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            max_pending: DEFAULT_MAX_PENDING,
            event_buffer: DEFAULT_EVENT_BUFFER,
            keepalive: KeepAliveConfig::default(),
            reconnect: ReconnectConfig::default(),
        }
    }
}

impl SessionConfig {
    /// Creates a configuration with default values.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the per-command timeout.
    #[inline]
    #[must_use]
    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    /// Sets the handshake timeout.
    #[inline]
    #[must_use]
    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Sets the connect timeout.
    #[inline]
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the maximum number of outstanding commands.
    #[inline]
    #[must_use]
    pub fn with_max_pending(mut self, max_pending: usize) -> Self {
        self.max_pending = max_pending;
        self
    }

    /// Sets the broadcast event stream capacity.
    #[inline]
    #[must_use]
    pub fn with_event_buffer(mut self, capacity: usize) -> Self {
        self.event_buffer = capacity;
        self
    }

    /// Sets the keepalive configuration.
    #[inline]
    #[must_use]
    pub fn with_keepalive(mut self, keepalive: KeepAliveConfig) -> Self {
        self.keepalive = keepalive;
        self
    }

    /// Sets the reconnection policy.
    #[inline]
    #[must_use]
    pub fn with_reconnect(mut self, reconnect: ReconnectConfig) -> Self {
        self.reconnect = reconnect;
        self
    }

    /// Checks the configuration for values the session cannot run with.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] describing the first invalid value.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("command_timeout", self.command_timeout),
            ("handshake_timeout", self.handshake_timeout),
            ("connect_timeout", self.connect_timeout),
            ("keepalive.interval", self.keepalive.interval),
            ("keepalive.deadline", self.keepalive.deadline),
            ("reconnect.initial_delay", self.reconnect.initial_delay),
        ] {
            if value.is_zero() {
                return Err(Error::config(format!("{name} must be greater than zero")));
            }
        }

        if self.max_pending == 0 {
            return Err(Error::config("max_pending must be greater than zero"));
        }
        if self.event_buffer == 0 {
            return Err(Error::config("event_buffer must be greater than zero"));
        }
        if self.keepalive.deadline < self.keepalive.interval {
            return Err(Error::config(format!(
                "keepalive.deadline ({:?}) must not be shorter than keepalive.interval ({:?})",
                self.keepalive.deadline, self.keepalive.interval
            )));
        }
        if self.reconnect.max_delay < self.reconnect.initial_delay {
            return Err(Error::config(format!(
                "reconnect.max_delay ({:?}) must not be shorter than reconnect.initial_delay ({:?})",
                self.reconnect.max_delay, self.reconnect.initial_delay
            )));
        }

        Ok(())
    }
}

// ============================================================================
// KeepAliveConfig
// ============================================================================

/// Liveness probing configuration.
///
/// An interval of [`Duration::MAX`] effectively disables probing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeepAliveConfig {
    /// Interval between checks (and probes).
    pub interval: Duration,

    /// Maximum silence before the connection is declared dead.
    pub deadline: Duration,
}

impl Default for KeepAliveConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_KEEPALIVE_INTERVAL,
            deadline: DEFAULT_KEEPALIVE_DEADLINE,
        }
    }
}

impl KeepAliveConfig {
    /// Creates a keepalive configuration.
    #[inline]
    #[must_use]
    pub const fn new(interval: Duration, deadline: Duration) -> Self {
        Self { interval, deadline }
    }
}

// ============================================================================
// ReconnectConfig
// ============================================================================

/// Bounded backoff policy for automatic reconnection.
///
/// The delay before attempt `n` is `min(initial_delay × n, max_delay)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectConfig {
    /// Delay before the first attempt (and the per-attempt increment).
    pub initial_delay: Duration,

    /// Upper bound for any single delay.
    pub max_delay: Duration,

    /// Attempts before the session gives up. `0` disables reconnection.
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: DEFAULT_INITIAL_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

impl ReconnectConfig {
    /// Creates a policy with default values.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the initial delay.
    #[inline]
    #[must_use]
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Sets the maximum delay.
    #[inline]
    #[must_use]
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Sets the number of attempts.
    #[inline]
    #[must_use]
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Returns the delay to wait before attempt number `attempt` (1-based).
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.initial_delay
            .saturating_mul(attempt.max(1))
            .min(self.max_delay)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use proptest::prelude::*;

    #[test]
    fn test_defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.command_timeout, Duration::from_secs(10));
        assert_eq!(config.keepalive.interval, Duration::from_secs(30));
        assert_eq!(config.keepalive.deadline, Duration::from_secs(45));
        assert_eq!(config.reconnect.initial_delay, Duration::from_secs(1));
        assert_eq!(config.reconnect.max_delay, Duration::from_secs(30));
        assert_eq!(config.reconnect.max_attempts, 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_linear_backoff_sequence() {
        let policy = ReconnectConfig::default();
        let delays: Vec<_> = (1..=5).map(|n| policy.delay_for(n).as_secs()).collect();
        assert_eq!(delays, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_backoff_is_capped() {
        let policy = ReconnectConfig::default();
        assert_eq!(policy.delay_for(31), Duration::from_secs(30));
        assert_eq!(policy.delay_for(u32::MAX), Duration::from_secs(30));
    }

    #[test]
    fn test_validate_accepts_unbounded_durations() {
        let config = SessionConfig::new()
            .with_command_timeout(Duration::MAX)
            .with_keepalive(KeepAliveConfig::new(Duration::MAX, Duration::MAX));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_timeout() {
        let config = SessionConfig::new().with_command_timeout(Duration::ZERO);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("command_timeout"));
    }

    #[test]
    fn test_validate_rejects_short_deadline() {
        let config = SessionConfig::new().with_keepalive(KeepAliveConfig::new(
            Duration::from_secs(30),
            Duration::from_secs(10),
        ));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_inverted_backoff() {
        let config = SessionConfig::new().with_reconnect(
            ReconnectConfig::new()
                .with_initial_delay(Duration::from_secs(5))
                .with_max_delay(Duration::from_secs(1)),
        );
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_attempts_is_valid() {
        let config =
            SessionConfig::new().with_reconnect(ReconnectConfig::new().with_max_attempts(0));
        assert!(config.validate().is_ok());
    }

    proptest! {
        #[test]
        fn prop_backoff_monotonic_and_bounded(initial_ms in 1u64..5_000, cap_factor in 1u64..50, attempt in 1u32..1_000) {
            let policy = ReconnectConfig::new()
                .with_initial_delay(Duration::from_millis(initial_ms))
                .with_max_delay(Duration::from_millis(initial_ms * cap_factor));

            let current = policy.delay_for(attempt);
            let next = policy.delay_for(attempt + 1);
            prop_assert!(current <= next);
            prop_assert!(next <= policy.max_delay);
            prop_assert!(current >= policy.initial_delay);
        }
    }
}

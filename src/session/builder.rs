//! Builder pattern for session configuration.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use hass_websocket::Session;
//!
//! # fn example() -> hass_websocket::Result<()> {
//! let session = Session::builder()
//!     .command_timeout(Duration::from_secs(5))
//!     .max_reconnect_attempts(10)
//!     .build()?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use crate::error::Result;

use super::config::{KeepAliveConfig, ReconnectConfig, SessionConfig};
use super::core::Session;

// ============================================================================
// SessionBuilder
// ============================================================================

/// Builder for configuring a [`Session`].
///
/// Use [`Session::builder()`] to create one.
#[derive(Debug, Default, Clone)]
pub struct SessionBuilder {
    config: SessionConfig,
}

impl SessionBuilder {
    /// Creates a builder with default configuration.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts from an existing configuration.
    #[inline]
    #[must_use]
    pub fn from_config(config: SessionConfig) -> Self {
        Self { config }
    }

    /// Sets the per-command timeout.
    #[inline]
    #[must_use]
    pub fn command_timeout(mut self, timeout: Duration) -> Self {
        self.config.command_timeout = timeout;
        self
    }

    /// Sets the authentication handshake timeout.
    #[inline]
    #[must_use]
    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.config.handshake_timeout = timeout;
        self
    }

    /// Sets the connect timeout.
    #[inline]
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Sets the maximum number of outstanding commands.
    #[inline]
    #[must_use]
    pub fn max_pending(mut self, max_pending: usize) -> Self {
        self.config.max_pending = max_pending;
        self
    }

    /// Sets the event stream capacity.
    #[inline]
    #[must_use]
    pub fn event_buffer(mut self, capacity: usize) -> Self {
        self.config.event_buffer = capacity;
        self
    }

    /// Sets the keepalive interval and liveness deadline.
    ///
    /// # Arguments
    ///
    /// * `interval` - Time between ping probes
    /// * `deadline` - Silence after which the connection is declared dead
    #[inline]
    #[must_use]
    pub fn keepalive(mut self, interval: Duration, deadline: Duration) -> Self {
        self.config.keepalive = KeepAliveConfig::new(interval, deadline);
        self
    }

    /// Sets the reconnection policy.
    #[inline]
    #[must_use]
    pub fn reconnect(mut self, policy: ReconnectConfig) -> Self {
        self.config.reconnect = policy;
        self
    }

    /// Sets the reconnect backoff bounds.
    #[inline]
    #[must_use]
    pub fn reconnect_delay(mut self, initial: Duration, max: Duration) -> Self {
        self.config.reconnect.initial_delay = initial;
        self.config.reconnect.max_delay = max;
        self
    }

    /// Sets the number of reconnection attempts before giving up.
    #[inline]
    #[must_use]
    pub fn max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.config.reconnect.max_attempts = attempts;
        self
    }

    /// Builds the session with validation.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`](crate::Error::Config) if a timeout is zero,
    /// the keepalive deadline is shorter than its interval, or the backoff
    /// bounds are inverted.
    pub fn build(self) -> Result<Session> {
        Session::with_config(self.config)
    }
}

// ============================================================================
// Tests
// ============================================================================

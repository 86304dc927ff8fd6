//! Connection state of a session.
//!
//! | Type | Role |
//! |------|------|
//! | [`ConnectionState`] | Lifecycle enum published to observers |
//! | [`SessionRecord`] | Introspection fields that survive reconnects |
//! | `SessionShared` | State shared between the facade and the supervisor task |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::time::SystemTime;

use parking_lot::Mutex;
use tokio::sync::{broadcast, watch};
use tracing::debug;

use super::events::EventBus;

// ============================================================================
// ConnectionState
// ============================================================================

/// Where a session is in its lifecycle.
///
/// Published through a `watch` channel; the latest value is the single source
/// of truth for whether the session can carry commands right now.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// Not connected. Initial state, and the state after `disconnect()` or a
    /// dropped connection.
    #[default]
    Disconnected,

    /// Opening the first transport after `connect()`.
    Connecting,

    /// Transport open, handshake in progress.
    Connected,

    /// Handshake complete; commands flow.
    Authenticated,

    /// Waiting for or running reconnection attempt `attempt` (1-based).
    Reconnecting {
        /// Current attempt number.
        attempt: u32,
    },

    /// Gave up. Only an explicit `connect()` leaves this state.
    Failed {
        /// Why the session failed.
        reason: String,
    },
}

impl ConnectionState {
    /// Returns `true` if commands are transmitted immediately.
    #[inline]
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated)
    }

    /// Returns `true` if no automatic progress will happen from this state.
    #[inline]
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }

    /// Returns `true` while a reconnection cycle is running.
    #[inline]
    #[must_use]
    pub fn is_reconnecting(&self) -> bool {
        matches!(self, Self::Reconnecting { .. })
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
            Self::Authenticated => write!(f, "authenticated"),
            Self::Reconnecting { attempt } => write!(f, "reconnecting (attempt {attempt})"),
            Self::Failed { reason } => write!(f, "failed: {reason}"),
        }
    }
}

// ============================================================================
// SessionRecord
// ============================================================================

/// Session facts that outlive a single connection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionRecord {
    /// When the last `auth_ok` was received.
    pub last_authenticated_at: Option<SystemTime>,

    /// Reconnection attempts since the last successful authentication.
    pub reconnect_attempts: u32,

    /// Server version reported during the last handshake.
    pub server_version: Option<String>,
}

// ============================================================================
// SessionShared
// ============================================================================

/// Buffered transitions per `state_changes` receiver.
const TRANSITION_BUFFER: usize = 64;

/// State written by the supervisor task and read by the facade.
#[derive(Debug)]
pub(crate) struct SessionShared {
    state_tx: watch::Sender<ConnectionState>,
    transitions_tx: broadcast::Sender<ConnectionState>,
    record: Mutex<SessionRecord>,
    pub(crate) events: EventBus,
}

impl SessionShared {
    pub(crate) fn new(event_buffer: usize) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        let (transitions_tx, _) = broadcast::channel(TRANSITION_BUFFER);
        Self {
            state_tx,
            transitions_tx,
            record: Mutex::new(SessionRecord::default()),
            events: EventBus::new(event_buffer),
        }
    }

    /// Current state.
    pub(crate) fn state(&self) -> ConnectionState {
        self.state_tx.borrow().clone()
    }

    /// New observer of the state.
    pub(crate) fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    /// Every transition from now on, in order.
    pub(crate) fn transitions(&self) -> broadcast::Receiver<ConnectionState> {
        self.transitions_tx.subscribe()
    }

    /// Publishes `next` unless it equals the current state.
    pub(crate) fn set_state(&self, next: ConnectionState) {
        let changed = self.state_tx.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            debug!(from = %current, to = %next, "Connection state changed");
            *current = next.clone();
            true
        });

        if changed {
            let _ = self.transitions_tx.send(next);
        }
    }

    /// Copy of the session record.
    pub(crate) fn record(&self) -> SessionRecord {
        self.record.lock().clone()
    }

    pub(crate) fn update_record(&self, update: impl FnOnce(&mut SessionRecord)) {
        update(&mut self.record.lock());
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_disconnected() {
        assert_eq!(ConnectionState::default(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_predicates() {
        assert!(ConnectionState::Authenticated.is_authenticated());
        assert!(!ConnectionState::Connected.is_authenticated());
        assert!(
            ConnectionState::Failed {
                reason: "x".into()
            }
            .is_terminal()
        );
        assert!(ConnectionState::Reconnecting { attempt: 2 }.is_reconnecting());
    }

    #[test]
    fn test_set_state_skips_duplicates() {
        let shared = SessionShared::new(4);
        let mut rx = shared.watch_state();
        rx.mark_unchanged();

        shared.set_state(ConnectionState::Disconnected);
        assert!(!rx.has_changed().expect("open"));

        shared.set_state(ConnectionState::Connecting);
        assert!(rx.has_changed().expect("open"));
        assert_eq!(shared.state(), ConnectionState::Connecting);
    }

    #[test]
    fn test_transitions_are_not_coalesced() {
        let shared = SessionShared::new(4);
        let mut transitions = shared.transitions();

        shared.set_state(ConnectionState::Disconnected);
        shared.set_state(ConnectionState::Reconnecting { attempt: 1 });
        shared.set_state(ConnectionState::Reconnecting { attempt: 2 });

        assert_eq!(
            transitions.try_recv().expect("first"),
            ConnectionState::Reconnecting { attempt: 1 }
        );
        assert_eq!(
            transitions.try_recv().expect("second"),
            ConnectionState::Reconnecting { attempt: 2 }
        );
        assert!(transitions.try_recv().is_err());
    }

    #[test]
    fn test_record_update() {
        let shared = SessionShared::new(4);
        shared.update_record(|record| record.reconnect_attempts = 3);
        assert_eq!(shared.record().reconnect_attempts, 3);
        assert!(shared.record().last_authenticated_at.is_none());
    }

    #[test]
    fn test_display() {
        assert_eq!(
            ConnectionState::Reconnecting { attempt: 3 }.to_string(),
            "reconnecting (attempt 3)"
        );
        assert_eq!(
            ConnectionState::Failed {
                reason: "authentication failed".into()
            }
            .to_string(),
            "failed: authentication failed"
        );
    }
}

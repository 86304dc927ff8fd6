//! Event payload type.
//!
//! Events are pushed by the server for every active subscription.
//!
//! # Format
//!
//! ```json
//! {
//!   "id": 4,
//!   "type": "event",
//!   "event": {
//!     "event_type": "state_changed",
//!     "data": { ... },
//!     "origin": "LOCAL",
//!     "time_fired": "2024-01-01T00:00:00+00:00"
//!   }
//! }
//! ```

// ============================================================================
// Imports
// ============================================================================

use serde::Deserialize;
use serde_json::Value;

use crate::identifiers::SubscriptionId;

// ============================================================================
// Event
// ============================================================================

/// An event notification from the server.
///
/// The payload is kept opaque; the accessors only read the fields every
/// Home Assistant event carries.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Event {
    /// Subscription the event was delivered for.
    #[serde(rename = "id")]
    pub subscription: SubscriptionId,

    /// Event body.
    pub event: Value,
}

impl Event {
    /// Creates an event from its parts.
    #[inline]
    #[must_use]
    pub fn new(subscription: SubscriptionId, event: Value) -> Self {
        Self {
            subscription,
            event,
        }
    }

    /// Returns the `event_type` field, if present.
    #[inline]
    #[must_use]
    pub fn event_type(&self) -> Option<&str> {
        self.event.get("event_type").and_then(Value::as_str)
    }

    /// Returns the `data` field, if present.
    #[inline]
    #[must_use]
    pub fn data(&self) -> Option<&Value> {
        self.event.get("data")
    }

    /// Returns the `origin` field, if present.
    #[inline]
    #[must_use]
    pub fn origin(&self) -> Option<&str> {
        self.event.get("origin").and_then(Value::as_str)
    }

    /// Returns the `time_fired` field, if present.
    #[inline]
    #[must_use]
    pub fn time_fired(&self) -> Option<&str> {
        self.event.get("time_fired").and_then(Value::as_str)
    }
}

// ============================================================================
// Tests
// ============================================================================

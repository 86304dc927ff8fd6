//! Outbound command variants.
//!
//! Every command is serialized as a flat JSON object whose `type` field names
//! the command; see [`Request`](super::Request) for the frame layout.
//!
//! | Variant | `type` | Extra fields |
//! |---------|--------|--------------|
//! | [`Command::Ping`] | `ping` | none |
//! | [`Command::SubscribeEvents`] | `subscribe_events` | `event_type`? |
//! | [`Command::UnsubscribeEvents`] | `unsubscribe_events` | `subscription` |
//! | [`Command::CallService`] | `call_service` | `domain`, `service`, `service_data`? |
//! | [`Command::Custom`] | caller-chosen | caller parameters |

// ============================================================================
// Imports
// ============================================================================

use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::identifiers::SubscriptionId;

// ============================================================================
// Constants
// ============================================================================

/// Field names owned by the frame envelope.
const RESERVED_FIELDS: [&str; 2] = ["id", "type"];

// ============================================================================
// Command
// ============================================================================

/// A command the client can send and correlate a response for.
///
/// The authentication frame is deliberately not a `Command`: it is sent by the
/// handshake and never queued or correlated.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Liveness probe; answered with `pong`.
    Ping,

    /// Subscribe to server events, optionally filtered by event type.
    SubscribeEvents {
        /// Event type filter (`None` = all events).
        event_type: Option<String>,
    },

    /// Cancel a subscription created by `SubscribeEvents`.
    UnsubscribeEvents {
        /// Subscription to cancel.
        subscription: SubscriptionId,
    },

    /// Invoke a service (`domain.service`).
    CallService {
        /// Service domain, e.g. `light`.
        domain: String,
        /// Service name, e.g. `turn_on`.
        service: String,
        /// Optional service data object.
        service_data: Option<Value>,
    },

    /// Any other command type with opaque parameters.
    Custom {
        /// Value of the `type` field.
        command_type: String,
        /// Fields merged into the frame next to `id` and `type`.
        parameters: Map<String, Value>,
    },
}

impl Command {
    /// Creates a `subscribe_events` command.
    #[inline]
    #[must_use]
    pub fn subscribe_events(event_type: Option<impl Into<String>>) -> Self {
        Self::SubscribeEvents {
            event_type: event_type.map(Into::into),
        }
    }

    /// Creates a `call_service` command.
    #[inline]
    #[must_use]
    pub fn call_service(
        domain: impl Into<String>,
        service: impl Into<String>,
        service_data: Option<Value>,
    ) -> Self {
        Self::CallService {
            domain: domain.into(),
            service: service.into(),
            service_data,
        }
    }

    /// Creates a command of arbitrary type.
    ///
    /// # Arguments
    ///
    /// * `command_type` - Value of the `type` field
    /// * `parameters` - A JSON object (or `None`/`null`) merged into the frame
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if the type is empty or `auth`, if
    /// `parameters` is not an object, or if it overrides `id` or `type`.
    pub fn custom(command_type: impl Into<String>, parameters: Option<Value>) -> Result<Self> {
        let command_type = command_type.into();

        if command_type.trim().is_empty() {
            return Err(Error::invalid_argument("command type must not be empty"));
        }
        if command_type == "auth" {
            return Err(Error::invalid_argument(
                "auth frames are sent by the handshake, not as commands",
            ));
        }

        let parameters = match parameters {
            None | Some(Value::Null) => Map::new(),
            Some(Value::Object(map)) => map,
            Some(other) => {
                return Err(Error::invalid_argument(format!(
                    "command parameters must be a JSON object, got {other}"
                )));
            }
        };

        if let Some(field) = RESERVED_FIELDS
            .iter()
            .find(|field| parameters.contains_key(**field))
        {
            return Err(Error::invalid_argument(format!(
                "parameter '{field}' is reserved by the frame envelope"
            )));
        }

        Ok(Self::Custom {
            command_type,
            parameters,
        })
    }

    /// Returns the wire value of the `type` field.
    #[must_use]
    pub fn command_type(&self) -> &str {
        match self {
            Self::Ping => "ping",
            Self::SubscribeEvents { .. } => "subscribe_events",
            Self::UnsubscribeEvents { .. } => "unsubscribe_events",
            Self::CallService { .. } => "call_service",
            Self::Custom { command_type, .. } => command_type,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

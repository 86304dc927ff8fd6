//! Outbound frame serialization.
//!
//! # Format
//!
//! ```json
//! { "type": "auth", "access_token": "..." }
//! { "id": 3, "type": "call_service", "domain": "light", "service": "turn_on" }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::result::Result as StdResult;

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

use crate::error::Result;
use crate::identifiers::CommandId;

use super::Command;

// ============================================================================
// AuthRequest
// ============================================================================

/// The authentication frame sent in reply to `auth_required`.
///
/// Carries no `id`: the verdict arrives as `auth_ok` / `auth_invalid`.
#[derive(Serialize)]
pub struct AuthRequest<'a> {
    #[serde(rename = "type")]
    frame_type: &'static str,
    access_token: &'a str,
}

impl<'a> AuthRequest<'a> {
    /// Creates an auth frame for the given token.
    #[inline]
    #[must_use]
    pub fn new(access_token: &'a str) -> Self {
        Self {
            frame_type: "auth",
            access_token,
        }
    }

    /// Serializes the frame to JSON text.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`](crate::Error::Json) if serialization fails.
    pub fn to_frame(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

// ============================================================================
// Request
// ============================================================================

/// A command paired with its correlation id.
///
/// The `id` field is omitted when the id is [`CommandId::UNASSIGNED`].
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    /// Correlation id.
    pub id: CommandId,

    /// Command type and fields.
    pub command: Command,
}

impl Request {
    /// Creates a request with the given id.
    #[inline]
    #[must_use]
    pub fn new(id: CommandId, command: Command) -> Self {
        Self { id, command }
    }

    /// Serializes the request to JSON text.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`](crate::Error::Json) if a parameter fails to serialize.
    pub fn to_frame(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

impl Serialize for Request {
    fn serialize<S: Serializer>(&self, serializer: S) -> StdResult<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;

        if !self.id.is_unassigned() {
            map.serialize_entry("id", &self.id)?;
        }
        map.serialize_entry("type", self.command.command_type())?;

        match &self.command {
            Command::Ping => {}
            Command::SubscribeEvents { event_type } => {
                if let Some(event_type) = event_type {
                    map.serialize_entry("event_type", event_type)?;
                }
            }
            Command::UnsubscribeEvents { subscription } => {
                map.serialize_entry("subscription", subscription)?;
            }
            Command::CallService {
                domain,
                service,
                service_data,
            } => {
                map.serialize_entry("domain", domain)?;
                map.serialize_entry("service", service)?;
                if let Some(data) = service_data {
                    map.serialize_entry("service_data", data)?;
                }
            }
            Command::Custom { parameters, .. } => {
                for (key, value) in parameters {
                    map.serialize_entry(key, value)?;
                }
            }
        }

        map.end()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::{Value, json};

    use crate::identifiers::SubscriptionId;

    fn frame(request: &Request) -> Value {
        let text = request.to_frame().expect("serialize");
        serde_json::from_str(&text).expect("valid json")
    }

    #[test]
    fn test_auth_frame_has_no_id() {
        let text = AuthRequest::new("secret-token").to_frame().expect("serialize");
        let value: Value = serde_json::from_str(&text).expect("valid json");
        assert_eq!(value, json!({"type": "auth", "access_token": "secret-token"}));
    }

    #[test]
    fn test_ping_frame() {
        let request = Request::new(CommandId::new(1), Command::Ping);
        assert_eq!(frame(&request), json!({"id": 1, "type": "ping"}));
    }

    #[test]
    fn test_subscribe_events_frame() {
        let request = Request::new(
            CommandId::new(4),
            Command::subscribe_events(Some("state_changed")),
        );
        assert_eq!(
            frame(&request),
            json!({"id": 4, "type": "subscribe_events", "event_type": "state_changed"})
        );

        let request = Request::new(CommandId::new(5), Command::subscribe_events(None::<String>));
        assert_eq!(frame(&request), json!({"id": 5, "type": "subscribe_events"}));
    }

    #[test]
    fn test_unsubscribe_events_frame() {
        let request = Request::new(
            CommandId::new(9),
            Command::UnsubscribeEvents {
                subscription: SubscriptionId::new(4),
            },
        );
        assert_eq!(
            frame(&request),
            json!({"id": 9, "type": "unsubscribe_events", "subscription": 4})
        );
    }

    #[test]
    fn test_call_service_frame() {
        let request = Request::new(
            CommandId::new(2),
            Command::call_service(
                "todo",
                "add_item",
                Some(json!({"entity_id": "todo.shopping", "item": "milk"})),
            ),
        );
        assert_eq!(
            frame(&request),
            json!({
                "id": 2,
                "type": "call_service",
                "domain": "todo",
                "service": "add_item",
                "service_data": {"entity_id": "todo.shopping", "item": "milk"}
            })
        );
    }

    #[test]
    fn test_custom_frame_merges_parameters() {
        let command =
            Command::custom("todo/item/list", Some(json!({"entity_id": "todo.shopping"})))
                .expect("valid");
        let request = Request::new(CommandId::new(3), command);
        assert_eq!(
            frame(&request),
            json!({"id": 3, "type": "todo/item/list", "entity_id": "todo.shopping"})
        );
    }
}

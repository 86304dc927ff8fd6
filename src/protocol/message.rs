//! Inbound frame classification.
//!
//! Each text frame is parsed exactly once into an [`InboundMessage`] by its
//! `type` field. Frames with an unknown `type` or a malformed body fail to
//! parse; the session logs and drops them.

// ============================================================================
// Imports
// ============================================================================

use serde::Deserialize;
use serde_json::Value;

use crate::error::{Error, Result};
use crate::identifiers::CommandId;

use super::Event;

// ============================================================================
// InboundMessage
// ============================================================================

/// A frame received from the server.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundMessage {
    /// Server asks for credentials.
    AuthRequired {
        /// Server version, if reported.
        #[serde(default)]
        ha_version: Option<String>,
    },

    /// Credentials accepted.
    AuthOk {
        /// Server version, if reported.
        #[serde(default)]
        ha_version: Option<String>,
    },

    /// Credentials rejected.
    AuthInvalid {
        /// Reason reported by the server.
        #[serde(default)]
        message: Option<String>,
    },

    /// Response to a command.
    Result(CommandResult),

    /// Unsolicited event for a subscription.
    Event(Event),

    /// Response to a `ping`.
    Pong {
        /// Id of the ping being answered.
        id: CommandId,
    },
}

impl InboundMessage {
    /// Parses a raw text frame.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if the frame is not valid JSON or has an
    /// unknown `type`.
    pub fn parse(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Returns the correlation id for `result` and `pong` frames.
    #[inline]
    #[must_use]
    pub fn correlation_id(&self) -> Option<CommandId> {
        match self {
            Self::Result(result) => Some(result.id),
            Self::Pong { id } => Some(*id),
            _ => None,
        }
    }

    /// Returns the wire name of the frame type, for logging.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::AuthRequired { .. } => "auth_required",
            Self::AuthOk { .. } => "auth_ok",
            Self::AuthInvalid { .. } => "auth_invalid",
            Self::Result(_) => "result",
            Self::Event(_) => "event",
            Self::Pong { .. } => "pong",
        }
    }
}

// ============================================================================
// CommandResult
// ============================================================================

/// A `result` frame.
///
/// # Format
///
/// ```json
/// {
///   "id": 3,
///   "type": "result",
///   "success": false,
///   "result": null,
///   "error": { "code": "not_found", "message": "Service not found." }
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CommandResult {
    /// Id of the command being answered.
    pub id: CommandId,

    /// Whether the command succeeded.
    pub success: bool,

    /// Result payload (if success).
    #[serde(default)]
    pub result: Option<Value>,

    /// Error details (if failure).
    #[serde(default)]
    pub error: Option<ResultError>,
}

impl CommandResult {
    /// Converts the frame into the caller-facing outcome.
    ///
    /// A missing payload on success becomes `Value::Null`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CommandRejected`] if `success` is `false`.
    pub fn into_outcome(self) -> Result<Value> {
        if self.success {
            return Ok(self.result.unwrap_or(Value::Null));
        }

        let error = self.error.unwrap_or_default();
        let code = error.code.unwrap_or_else(|| "unknown_error".to_string());
        let message = error.message.unwrap_or_else(|| "Unknown error".to_string());
        Err(Error::command_rejected(code, message))
    }
}

// ============================================================================
// ResultError
// ============================================================================

/// Error details carried by a failed `result` frame.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ResultError {
    /// Machine-readable code.
    #[serde(default)]
    pub code: Option<String>,

    /// Human-readable message.
    #[serde(default)]
    pub message: Option<String>,
}

// ============================================================================
// Tests
// ============================================================================

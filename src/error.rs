//! Error types for the Home Assistant WebSocket client.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use hass_websocket::{Result, Session};
//!
//! async fn example(session: &Session) -> Result<()> {
//!     session.call_service("light", "turn_on", None).await?;
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Configuration | [`Error::Config`], [`Error::InvalidUrl`] |
//! | Transport | [`Error::Connection`], [`Error::ConnectionClosed`], [`Error::LivenessTimeout`], [`Error::HandshakeTimeout`], [`Error::WebSocket`] |
//! | Authentication | [`Error::AuthenticationFailed`] |
//! | Command | [`Error::CommandTimeout`], [`Error::CommandRejected`], [`Error::Timeout`] |
//! | Protocol | [`Error::Protocol`], [`Error::InvalidArgument`], [`Error::Json`] |
//! | Lifecycle | [`Error::NotConnected`], [`Error::Disconnected`], [`Error::SessionFailed`] |

// ============================================================================
// Imports
// ============================================================================

use std::result::Result as StdResult;

use thiserror::Error;
use tokio_tungstenite::tungstenite::Error as WsError;

use crate::identifiers::CommandId;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
///
/// All fallible operations in this crate return this type.
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
///
/// Transport and authentication failures also change the session's
/// [`ConnectionState`](crate::ConnectionState); command-level failures are only
/// ever returned to the caller that issued the command.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned when session configuration or connect arguments are invalid.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    /// Server URL could not be parsed.
    #[error("Invalid server URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    // ========================================================================
    // Transport Errors
    // ========================================================================
    /// WebSocket connection failed.
    ///
    /// Returned when the connection cannot be established (refused, DNS).
    #[error("Connection failed: {message}")]
    Connection {
        /// Description of the connection error.
        message: String,
    },

    /// WebSocket connection closed unexpectedly.
    ///
    /// Commands in flight when the transport drops fail with this error.
    #[error("Connection closed")]
    ConnectionClosed,

    /// No inbound traffic within the liveness deadline.
    #[error("No liveness proof for {elapsed_ms}ms (deadline {deadline_ms}ms)")]
    LivenessTimeout {
        /// Milliseconds since the last inbound frame.
        elapsed_ms: u64,
        /// Configured deadline in milliseconds.
        deadline_ms: u64,
    },

    /// Server did not complete the authentication handshake in time.
    #[error("Authentication handshake timed out after {timeout_ms}ms")]
    HandshakeTimeout {
        /// Milliseconds waited before giving up.
        timeout_ms: u64,
    },

    // ========================================================================
    // Authentication Errors
    // ========================================================================
    /// Server rejected the access token.
    ///
    /// Fatal for the session: no reconnection is attempted.
    #[error("Authentication failed: {message}")]
    AuthenticationFailed {
        /// Message reported by the server, if any.
        message: String,
    },

    // ========================================================================
    // Command Errors
    // ========================================================================
    /// No correlated response within the command timeout.
    ///
    /// The connection itself stays up.
    #[error("Command {id} timed out after {timeout_ms}ms")]
    CommandTimeout {
        /// Id the command was sent with.
        id: CommandId,
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    /// Operation timeout.
    ///
    /// Returned when a wait on the session exceeds its deadline.
    #[error("Timeout after {timeout_ms}ms: {operation}")]
    Timeout {
        /// Description of the operation that timed out.
        operation: String,
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    /// Server answered with `success: false`.
    #[error("Command rejected ({code}): {message}")]
    CommandRejected {
        /// Error code reported by the server.
        code: String,
        /// Error message reported by the server.
        message: String,
    },

    // ========================================================================
    // Protocol Errors
    // ========================================================================
    /// Protocol violation or unexpected message.
    #[error("Protocol error: {message}")]
    Protocol {
        /// Description of the protocol violation.
        message: String,
    },

    /// Invalid argument for an outbound command.
    #[error("Invalid argument: {message}")]
    InvalidArgument {
        /// Description of the invalid argument.
        message: String,
    },

    // ========================================================================
    // Lifecycle Errors
    // ========================================================================
    /// No session is running; call `connect()` first.
    #[error("Not connected")]
    NotConnected,

    /// The session was disconnected deliberately.
    #[error("Session disconnected")]
    Disconnected,

    /// The session gave up and is in the `Failed` state.
    #[error("Session failed: {reason}")]
    SessionFailed {
        /// Reason the session failed.
        reason: String,
    },

    // ========================================================================
    // External Errors
    // ========================================================================
    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a connection error.
    #[inline]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Creates a protocol error.
    #[inline]
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Creates an invalid argument error.
    #[inline]
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Creates an authentication failed error.
    #[inline]
    pub fn authentication_failed(message: impl Into<String>) -> Self {
        Self::AuthenticationFailed {
            message: message.into(),
        }
    }

    /// Creates a command timeout error.
    #[inline]
    pub fn command_timeout(id: CommandId, timeout_ms: u64) -> Self {
        Self::CommandTimeout { id, timeout_ms }
    }

    /// Creates a timeout error.
    #[inline]
    pub fn timeout(operation: impl Into<String>, timeout_ms: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout_ms,
        }
    }

    /// Creates a command rejected error.
    #[inline]
    pub fn command_rejected(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::CommandRejected {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Creates a session failed error.
    #[inline]
    pub fn session_failed(reason: impl Into<String>) -> Self {
        Self::SessionFailed {
            reason: reason.into(),
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this is a timeout error.
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Self::CommandTimeout { .. }
                | Self::Timeout { .. }
                | Self::HandshakeTimeout { .. }
                | Self::LivenessTimeout { .. }
        )
    }

    /// Returns `true` if this is a transport-level error.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. }
                | Self::ConnectionClosed
                | Self::LivenessTimeout { .. }
                | Self::HandshakeTimeout { .. }
                | Self::WebSocket(_)
        )
    }

    /// Returns `true` if the session supervisor retries after this error.
    ///
    /// Authentication failures are never retried.
    #[inline]
    #[must_use]
    pub fn is_retriable(&self) -> bool {
        self.is_connection_error()
    }
}

// ============================================================================
// Tests
// ============================================================================

//! Authentication handshake state machine.
//!
//! Runs once per connection generation, before any command is transmitted:
//!
//! ```text
//! server: auth_required
//! client: {"type":"auth","access_token":"..."}
//! server: auth_ok | auth_invalid
//! ```
//!
//! [`Handshake`] is pure: it consumes inbound messages and tells the
//! supervisor what to do next. It never touches the socket.

// ============================================================================
// Imports
// ============================================================================

use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, warn};

use crate::error::Result;
use crate::protocol::{AuthRequest, InboundMessage};

// ============================================================================
// HandshakePhase
// ============================================================================

/// Progress of the handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) enum HandshakePhase {
    /// Socket open, waiting for `auth_required`.
    #[default]
    AwaitingChallenge,

    /// Auth frame sent, waiting for the verdict.
    AwaitingVerdict,

    /// `auth_ok` received.
    Authenticated,

    /// `auth_invalid` received.
    Rejected,
}

// ============================================================================
// HandshakeStep
// ============================================================================

/// What the supervisor must do after feeding a message to the handshake.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum HandshakeStep {
    /// Write this auth frame directly to the transport.
    SendAuth(String),

    /// The server accepted the credential.
    Authenticated {
        /// Server version, if reported.
        ha_version: Option<String>,
    },

    /// The server rejected the credential.
    Rejected {
        /// Reason reported by the server.
        message: String,
    },

    /// Nothing to do.
    Ignore,
}

// ============================================================================
// Handshake
// ============================================================================

/// Per-connection authentication state.
#[derive(Debug, Default)]
pub(crate) struct Handshake {
    phase: HandshakePhase,
}

impl Handshake {
    /// Creates a handshake awaiting the server challenge.
    #[inline]
    #[must_use]
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Returns the current phase.
    #[cfg(test)]
    #[inline]
    #[must_use]
    pub(crate) fn phase(&self) -> HandshakePhase {
        self.phase
    }

    /// Returns `true` once `auth_ok` has been received.
    #[inline]
    #[must_use]
    pub(crate) fn is_authenticated(&self) -> bool {
        self.phase == HandshakePhase::Authenticated
    }

    /// Advances the handshake with an inbound message.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`](crate::Error::Json) if the auth frame cannot be
    /// serialized.
    pub(crate) fn on_message(
        &mut self,
        message: &InboundMessage,
        token: &SecretString,
    ) -> Result<HandshakeStep> {
        match (self.phase, message) {
            (HandshakePhase::AwaitingChallenge, InboundMessage::AuthRequired { ha_version }) => {
                debug!(?ha_version, "Server requested authentication");
                let frame = AuthRequest::new(token.expose_secret()).to_frame()?;
                self.phase = HandshakePhase::AwaitingVerdict;
                Ok(HandshakeStep::SendAuth(frame))
            }

            (HandshakePhase::AwaitingVerdict, InboundMessage::AuthOk { ha_version }) => {
                self.phase = HandshakePhase::Authenticated;
                Ok(HandshakeStep::Authenticated {
                    ha_version: ha_version.clone(),
                })
            }

            (HandshakePhase::AwaitingVerdict, InboundMessage::AuthInvalid { message }) => {
                self.phase = HandshakePhase::Rejected;
                Ok(HandshakeStep::Rejected {
                    message: message
                        .clone()
                        .unwrap_or_else(|| "invalid access token".to_string()),
                })
            }

            (phase, other) => {
                warn!(?phase, kind = other.kind(), "Unexpected frame during handshake");
                Ok(HandshakeStep::Ignore)
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::{Value, json};

    fn token() -> SecretString {
        SecretString::from("secret-token".to_owned())
    }

    #[test]
    fn test_successful_handshake() {
        let token = token();
        let mut handshake = Handshake::new();
        assert_eq!(handshake.phase(), HandshakePhase::AwaitingChallenge);

        let step = handshake
            .on_message(&InboundMessage::AuthRequired { ha_version: None }, &token)
            .expect("step");
        let HandshakeStep::SendAuth(frame) = step else {
            panic!("expected auth frame, got {step:?}");
        };
        let value: Value = serde_json::from_str(&frame).expect("json");
        assert_eq!(value, json!({"type": "auth", "access_token": "secret-token"}));
        assert_eq!(handshake.phase(), HandshakePhase::AwaitingVerdict);

        let step = handshake
            .on_message(
                &InboundMessage::AuthOk {
                    ha_version: Some("2024.1.0".into()),
                },
                &token,
            )
            .expect("step");
        assert_eq!(
            step,
            HandshakeStep::Authenticated {
                ha_version: Some("2024.1.0".into())
            }
        );
        assert!(handshake.is_authenticated());
    }

    #[test]
    fn test_rejected_handshake() {
        let token = token();
        let mut handshake = Handshake::new();
        handshake
            .on_message(&InboundMessage::AuthRequired { ha_version: None }, &token)
            .expect("step");

        let step = handshake
            .on_message(
                &InboundMessage::AuthInvalid {
                    message: Some("Invalid password".into()),
                },
                &token,
            )
            .expect("step");
        assert_eq!(
            step,
            HandshakeStep::Rejected {
                message: "Invalid password".into()
            }
        );
        assert_eq!(handshake.phase(), HandshakePhase::Rejected);
        assert!(!handshake.is_authenticated());
    }

    #[test]
    fn test_rejection_without_message() {
        let token = token();
        let mut handshake = Handshake::new();
        handshake
            .on_message(&InboundMessage::AuthRequired { ha_version: None }, &token)
            .expect("step");
        let step = handshake
            .on_message(&InboundMessage::AuthInvalid { message: None }, &token)
            .expect("step");
        assert!(matches!(step, HandshakeStep::Rejected { .. }));
    }

    #[test]
    fn test_out_of_order_frames_are_ignored() {
        let token = token();
        let mut handshake = Handshake::new();

        // auth_ok before the challenge
        let step = handshake
            .on_message(&InboundMessage::AuthOk { ha_version: None }, &token)
            .expect("step");
        assert_eq!(step, HandshakeStep::Ignore);
        assert_eq!(handshake.phase(), HandshakePhase::AwaitingChallenge);

        // pong before auth
        let step = handshake
            .on_message(
                &InboundMessage::Pong {
                    id: crate::identifiers::CommandId::new(1),
                },
                &token,
            )
            .expect("step");
        assert_eq!(step, HandshakeStep::Ignore);
    }

    #[test]
    fn test_repeated_challenge_is_ignored() {
        let token = token();
        let mut handshake = Handshake::new();
        handshake
            .on_message(&InboundMessage::AuthRequired { ha_version: None }, &token)
            .expect("step");
        let step = handshake
            .on_message(&InboundMessage::AuthRequired { ha_version: None }, &token)
            .expect("step");
        assert_eq!(step, HandshakeStep::Ignore);
    }
}

//! WebSocket protocol message types.
//!
//! This module defines the JSON text frames exchanged with a Home Assistant
//! style WebSocket API.
//!
//! # Protocol Overview
//!
//! | Message Type | Direction | Purpose |
//! |--------------|-----------|---------|
//! | [`AuthRequest`] | Client → Server | Credential in reply to `auth_required` |
//! | [`Request`] | Client → Server | Command with correlation id |
//! | [`InboundMessage::AuthRequired`] / `AuthOk` / `AuthInvalid` | Server → Client | Handshake |
//! | [`InboundMessage::Result`] | Server → Client | Command response |
//! | [`InboundMessage::Pong`] | Server → Client | Ping response |
//! | [`InboundMessage::Event`] | Server → Client | Unsolicited event |
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `command` | Outbound command variants |
//! | `event` | Event payload type |
//! | `message` | Inbound frame classification |
//! | `request` | Outbound frame serialization |

// ============================================================================
// Submodules
// ============================================================================

/// Outbound command variants.
pub mod command;

/// Event payload type.
pub mod event;

/// Inbound frame classification.
pub mod message;

/// Outbound frame serialization.
pub mod request;

// ============================================================================
// Re-exports
// ============================================================================

pub use command::Command;
pub use event::Event;
pub use message::{CommandResult, InboundMessage, ResultError};
pub use request::{AuthRequest, Request};

//! Home Assistant WebSocket - reconnecting, authenticated API client.
//!
//! This library speaks the JSON WebSocket protocol exposed by Home Assistant
//! at `/api/websocket`: it authenticates, correlates command responses,
//! dispatches pushed events, detects dead connections and reconnects.
//!
//! # Architecture
//!
//! The client follows an actor model:
//!
//! - **Facade**: [`Session`] handles are cloned freely and send requests to
//!   the supervisor task
//! - **Supervisor**: one background task owns the socket, processes inbound
//!   frames in arrival order and retries lost connections
//!
//! Key design principles:
//!
//! - Commands issued before authentication are queued and sent in order
//! - Every command completes exactly once: reply, timeout, or failure
//! - Connection state is observable through a `watch` channel
//! - Command failures never change the session state
//!
//! # Quick Start
//!
//! ```no_run
//! use std::time::Duration;
//! use hass_websocket::{Result, Session};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let session = Session::new();
//!     session
//!         .connect("ws://homeassistant.local:8123/api/websocket", "LONG_LIVED_TOKEN")
//!         .await?;
//!     session.wait_until_authenticated(Duration::from_secs(10)).await?;
//!
//!     let states = session.send_command("get_states", None).await?;
//!     println!("{states}");
//!
//!     session.disconnect().await;
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`session`] | Session facade, configuration and state |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`identifiers`] | Command and subscription ids |
//! | [`protocol`] | WebSocket message types |
//! | [`transport`] | WebSocket transport layer |
//!
//! # Features
//!
//! - `tls`: enables `wss://` endpoints through rustls

// ============================================================================
// Modules
// ============================================================================

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Type-safe identifiers for commands and subscriptions.
pub mod identifiers;

/// WebSocket protocol message types.
///
/// Outbound command frames and inbound frame classification.
pub mod protocol;

/// Session management.
///
/// Use [`Session::new()`] or [`Session::builder()`] to create a session.
pub mod session;

/// WebSocket transport layer.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Session types
pub use session::{
    ConnectionState, KeepAliveConfig, ReconnectConfig, Session, SessionBuilder, SessionConfig,
    SessionRecord,
};

// Protocol types
pub use protocol::{Command, Event};

// Error types
pub use error::{Error, Result};

// Identifier types
pub use identifiers::{CommandId, SubscriptionId};

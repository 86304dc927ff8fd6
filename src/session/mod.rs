//! Session management.
//!
//! Everything above the raw socket: authentication, command correlation,
//! event fan-out, liveness and reconnection.
//!
//! # Components
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Session`] | Public facade |
//! | [`SessionBuilder`] | Fluent configuration builder |
//! | [`SessionConfig`] | Timeouts, limits, keepalive and reconnect policy |
//! | [`ConnectionState`] | Observable lifecycle state |
//! | [`EventBus`] | Keyed event handlers plus broadcast stream |
//!
//! # Concurrency
//!
//! One supervisor task per `connect()` owns the socket, the command
//! dispatcher, the authentication handshake and the keepalive monitor; these
//! are crate-internal. Callers reach it through an unbounded
//! channel; state flows back through a `watch` channel and the event bus.

// ============================================================================
// Submodules
// ============================================================================

/// Fluent builder for sessions.
pub mod builder;

/// Session configuration.
pub mod config;

/// Public session facade.
pub mod core;

/// Command correlation.
pub(crate) mod dispatcher;

/// Event fan-out.
pub mod events;

/// Authentication handshake.
pub(crate) mod handshake;

/// Liveness tracking.
pub(crate) mod keepalive;

/// Connection state.
pub mod state;

/// Background connection task.
mod supervisor;

// ============================================================================
// Re-exports
// ============================================================================

pub use builder::SessionBuilder;
pub use config::{KeepAliveConfig, ReconnectConfig, SessionConfig};
pub use core::Session;
pub use events::{EventBus, EventHandler};
pub use state::{ConnectionState, SessionRecord};

//! WebSocket transport layer.
//!
//! Raw text frames in and out of one client WebSocket. The protocol layer
//! above decides what the frames mean.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐                              ┌─────────────────┐
//! │  Session (Rust) │                              │  Home Assistant │
//! │                 │         WebSocket            │                 │
//! │  Supervisor     │◄────────────────────────────►│  /api/websocket │
//! │  → Transport    │       ws:// or wss://        │                 │
//! └─────────────────┘                              └─────────────────┘
//! ```
//!
//! # Connection Lifecycle
//!
//! 1. `Transport::open` - Connect and upgrade, bounded by a timeout
//! 2. `Transport::send` / `Transport::recv` - Whole text frames
//! 3. `Transport::close` - Idempotent close
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `connection` | WebSocket client connection |

// ============================================================================
// Submodules
// ============================================================================

/// WebSocket client connection.
pub mod connection;

// ============================================================================
// Re-exports
// ============================================================================

pub use connection::{Transport, TransportEvent};

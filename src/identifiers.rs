//! Type-safe identifiers and the command id allocator.
//!
//! Newtype wrappers keep correlation ids and subscription ids from being mixed
//! up with each other or with arbitrary integers.
//!
//! | Type | Description |
//! |------|-------------|
//! | [`CommandId`] | Correlation id of an outbound command (`0` = unassigned) |
//! | [`SubscriptionId`] | Id of an event subscription (the id of its `subscribe_events` command) |
//! | [`CommandIdAllocator`] | Per-connection sequence of command ids starting at 1 |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use serde::{Deserialize, Serialize};

// ============================================================================
// CommandId
// ============================================================================

/// Correlation id linking an outbound command to its inbound response.
///
/// `0` is reserved for frames that expect no correlated response (the
/// authentication frame); such frames are sent without an `id` field.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct CommandId(u64);

impl CommandId {
    /// The reserved id for uncorrelated frames.
    pub const UNASSIGNED: Self = Self(0);

    /// Wraps a raw id.
    #[inline]
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw id.
    #[inline]
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }

    /// Returns `true` for the reserved id `0`.
    #[inline]
    #[must_use]
    pub const fn is_unassigned(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for CommandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// SubscriptionId
// ============================================================================

/// Identifier of a server-side event subscription.
///
/// Home Assistant tags every `event` frame with the id of the
/// `subscribe_events` command that created the subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    /// Wraps a raw subscription id.
    #[inline]
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw id.
    #[inline]
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl From<CommandId> for SubscriptionId {
    #[inline]
    fn from(id: CommandId) -> Self {
        Self(id.get())
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// CommandIdAllocator
// ============================================================================

/// Produces strictly increasing command ids, starting at 1 after every reset.
///
/// Owned by the session supervisor; reset before each connection attempt,
/// once the previous generation's pending commands have been failed.
#[derive(Debug, Default)]
pub struct CommandIdAllocator {
    last: u64,
}

impl CommandIdAllocator {
    /// Creates an allocator whose first id is 1.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self { last: 0 }
    }

    /// Returns the next id. Never returns [`CommandId::UNASSIGNED`].
    #[inline]
    pub fn next_id(&mut self) -> CommandId {
        self.last += 1;
        CommandId(self.last)
    }

    /// Returns the most recently issued id, or `UNASSIGNED` if none yet.
    #[inline]
    #[must_use]
    pub const fn current(&self) -> CommandId {
        CommandId(self.last)
    }

    /// Restarts the sequence at 1.
    #[inline]
    pub fn reset(&mut self) {
        self.last = 0;
    }
}

// ============================================================================
// Tests
// ============================================================================

//! Command correlation.
//!
//! [`CommandDispatcher`] is owned by the supervisor task and is only ever
//! touched from it, so it needs no locking. It tracks two collections:
//!
//! | Collection | Contents | Leaves when |
//! |------------|----------|-------------|
//! | queue | submissions made before authentication | flushed on `auth_ok`, abandoned, or failed |
//! | pending | transmitted commands awaiting a reply | resolved, abandoned, or failed |
//!
//! Ids are allocated at transmission time, so a command queued across a
//! reconnect gets an id from the generation it is actually sent in.
//!
//! Every submission is completed exactly once: the reply slot is a
//! `oneshot::Sender`, consumed by whichever exit path removes the entry.

// ============================================================================
// Imports
// ============================================================================

use std::collections::VecDeque;
use std::time::Instant;

use rustc_hash::FxHashMap;
use serde_json::Value;
use tokio::sync::oneshot;
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::identifiers::{CommandId, CommandIdAllocator};
use crate::protocol::{Command, Request};

// ============================================================================
// Types
// ============================================================================

/// Caller-side handle for a submission, independent of its wire id.
pub(crate) type Ticket = u64;

// ============================================================================
// Submission
// ============================================================================

/// A command handed to the supervisor by a caller.
#[derive(Debug)]
pub(crate) struct Submission {
    /// Caller handle, used to abandon the command.
    pub(crate) ticket: Ticket,

    /// Command to transmit.
    pub(crate) command: Command,

    /// `false` for fire-and-forget commands: completed once written.
    pub(crate) tracked: bool,

    /// Receives the wire id once the frame has been written.
    pub(crate) sent: oneshot::Sender<CommandId>,

    /// Receives the outcome.
    pub(crate) reply: oneshot::Sender<Result<Value>>,
}

impl Submission {
    /// Completes the submission with `error` without transmitting it.
    pub(crate) fn fail(self, error: Error) {
        let _ = self.reply.send(Err(error));
    }

    fn is_abandoned(&self) -> bool {
        self.reply.is_closed()
    }
}

// ============================================================================
// PendingCommand
// ============================================================================

/// A transmitted command awaiting its `result` or `pong`.
#[derive(Debug)]
struct PendingCommand {
    ticket: Ticket,
    /// Serialized frame, kept for diagnostics.
    frame: String,
    sent: Option<oneshot::Sender<CommandId>>,
    reply: oneshot::Sender<Result<Value>>,
    created_at: Instant,
}

// ============================================================================
// Outbound
// ============================================================================

/// A frame ready to write, produced by [`CommandDispatcher::prepare`].
///
/// Hand it back through [`CommandDispatcher::confirm`] or
/// [`CommandDispatcher::reject`] once the write has finished.
#[derive(Debug)]
pub(crate) struct Outbound {
    /// Wire id.
    pub(crate) id: CommandId,

    /// Serialized frame.
    pub(crate) frame: String,

    /// Completion for fire-and-forget commands, which are never registered.
    untracked: Option<(oneshot::Sender<CommandId>, oneshot::Sender<Result<Value>>)>,
}

// ============================================================================
// DispatcherStats
// ============================================================================

/// Snapshot of the dispatcher's collections.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct DispatcherStats {
    /// Commands transmitted and awaiting a reply.
    pub(crate) pending: usize,

    /// Commands waiting for authentication.
    pub(crate) queued: usize,
}

// ============================================================================
// CommandDispatcher
// ============================================================================

/// Pending table and pre-authentication queue.
#[derive(Debug)]
pub(crate) struct CommandDispatcher {
    ids: CommandIdAllocator,
    pending: FxHashMap<CommandId, PendingCommand>,
    tickets: FxHashMap<Ticket, CommandId>,
    queue: VecDeque<Submission>,
    max_pending: usize,
}

impl CommandDispatcher {
    /// Creates an empty dispatcher accepting up to `max_pending` outstanding
    /// commands (pending plus queued).
    #[must_use]
    pub(crate) fn new(max_pending: usize) -> Self {
        Self {
            ids: CommandIdAllocator::new(),
            pending: FxHashMap::default(),
            tickets: FxHashMap::default(),
            queue: VecDeque::new(),
            max_pending,
        }
    }

    // ========================================================================
    // Introspection
    // ========================================================================

    /// Number of commands awaiting a reply.
    #[cfg(test)]
    #[inline]
    #[must_use]
    pub(crate) fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Number of queued commands.
    #[cfg(test)]
    #[inline]
    #[must_use]
    pub(crate) fn queued_len(&self) -> usize {
        self.queue.len()
    }

    /// Returns a snapshot of both collections.
    #[must_use]
    pub(crate) fn stats(&self) -> DispatcherStats {
        DispatcherStats {
            pending: self.pending.len(),
            queued: self.queue.len(),
        }
    }

    fn is_full(&self) -> bool {
        self.pending.len() + self.queue.len() >= self.max_pending
    }

    fn overflow(&self) -> Error {
        Error::protocol(format!(
            "Too many pending commands (max {})",
            self.max_pending
        ))
    }

    // ========================================================================
    // Queue
    // ========================================================================

    /// Queues a submission until authentication.
    ///
    /// Fails the submission immediately if the dispatcher is full.
    pub(crate) fn enqueue(&mut self, submission: Submission) {
        if self.is_full() {
            let error = self.overflow();
            submission.fail(error);
            return;
        }

        trace!(
            ticket = submission.ticket,
            command = submission.command.command_type(),
            "Queued until authenticated"
        );
        self.queue.push_back(submission);
    }

    /// Removes the oldest queued submission.
    pub(crate) fn pop_queued(&mut self) -> Option<Submission> {
        self.queue.pop_front()
    }

    /// Fails every queued submission. Returns how many were failed.
    pub(crate) fn fail_queued(&mut self, make_error: impl Fn() -> Error) -> usize {
        let count = self.queue.len();
        for submission in self.queue.drain(..) {
            submission.fail(make_error());
        }
        if count > 0 {
            debug!(count, "Failed queued commands");
        }
        count
    }

    // ========================================================================
    // Transmission
    // ========================================================================

    /// Allocates an id for `submission`, registers it (if tracked) and
    /// serializes it.
    ///
    /// Returns `None` if the submission was completed instead: its caller
    /// already gave up, the dispatcher is full, or serialization failed.
    pub(crate) fn prepare(&mut self, submission: Submission) -> Option<Outbound> {
        if submission.is_abandoned() {
            trace!(ticket = submission.ticket, "Skipping abandoned command");
            return None;
        }

        if submission.tracked && self.is_full() {
            let error = self.overflow();
            submission.fail(error);
            return None;
        }

        let Submission {
            ticket,
            command,
            tracked,
            sent,
            reply,
        } = submission;

        let id = self.ids.next_id();
        let frame = match Request::new(id, command).to_frame() {
            Ok(frame) => frame,
            Err(e) => {
                let _ = reply.send(Err(e));
                return None;
            }
        };

        if !tracked {
            return Some(Outbound {
                id,
                frame,
                untracked: Some((sent, reply)),
            });
        }

        // Register before the write so a fast reply always finds its entry.
        self.tickets.insert(ticket, id);
        self.pending.insert(
            id,
            PendingCommand {
                ticket,
                frame: frame.clone(),
                sent: Some(sent),
                reply,
                created_at: Instant::now(),
            },
        );

        Some(Outbound {
            id,
            frame,
            untracked: None,
        })
    }

    /// Marks `outbound` as written.
    ///
    /// Tracked commands start their reply timeout; fire-and-forget commands
    /// complete with `Value::Null`.
    pub(crate) fn confirm(&mut self, outbound: Outbound) {
        let id = outbound.id;

        if let Some((sent, reply)) = outbound.untracked {
            let _ = sent.send(id);
            let _ = reply.send(Ok(Value::Null));
            return;
        }

        if let Some(sent) = self.pending.get_mut(&id).and_then(|p| p.sent.take()) {
            let _ = sent.send(id);
        }
        trace!(%id, "Command sent");
    }

    /// Fails `outbound` after its write failed.
    pub(crate) fn reject(&mut self, outbound: Outbound, error: Error) {
        if let Some((_, reply)) = outbound.untracked {
            let _ = reply.send(Err(error));
            return;
        }

        if let Some(pending) = self.remove(outbound.id) {
            let _ = pending.reply.send(Err(error));
        }
    }

    /// Serializes a command with a fresh id that expects no tracked reply.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if the command fails to serialize.
    pub(crate) fn untracked(&mut self, command: Command) -> Result<(CommandId, String)> {
        let id = self.ids.next_id();
        let frame = Request::new(id, command).to_frame()?;
        Ok((id, frame))
    }

    // ========================================================================
    // Completion
    // ========================================================================

    /// Completes the command registered under `id`.
    ///
    /// Returns `false` if no such command is pending (late reply after a
    /// timeout, or a reply to an untracked probe).
    pub(crate) fn resolve(&mut self, id: CommandId, outcome: Result<Value>) -> bool {
        let Some(pending) = self.remove(id) else {
            return false;
        };

        trace!(
            %id,
            elapsed_ms = pending.created_at.elapsed().as_millis() as u64,
            ok = outcome.is_ok(),
            "Command resolved"
        );
        let _ = pending.reply.send(outcome);
        true
    }

    /// Forgets the command with `ticket`, whether pending or queued.
    ///
    /// Returns `true` if something was removed.
    pub(crate) fn abandon(&mut self, ticket: Ticket) -> bool {
        if let Some(id) = self.tickets.get(&ticket).copied() {
            if let Some(pending) = self.remove(id) {
                debug!(%id, frame = %pending.frame, "Removed abandoned command");
            }
            return true;
        }

        let before = self.queue.len();
        self.queue.retain(|submission| submission.ticket != ticket);
        before != self.queue.len()
    }

    /// Fails every pending command. Returns how many were failed.
    pub(crate) fn fail_pending(&mut self, make_error: impl Fn() -> Error) -> usize {
        self.tickets.clear();
        let count = self.pending.len();
        for (_, pending) in self.pending.drain() {
            let _ = pending.reply.send(Err(make_error()));
        }
        if count > 0 {
            debug!(count, "Failed pending commands");
        }
        count
    }

    /// Restarts id allocation at 1.
    ///
    /// # Panics
    ///
    /// Debug builds panic if commands are still pending, since their ids
    /// could be reissued.
    pub(crate) fn reset_ids(&mut self) {
        debug_assert!(self.pending.is_empty(), "reset with pending commands");
        self.ids.reset();
    }

    fn remove(&mut self, id: CommandId) -> Option<PendingCommand> {
        let pending = self.pending.remove(&id)?;
        self.tickets.remove(&pending.ticket);
        Some(pending)
    }
}

// ============================================================================
// Tests
// ============================================================================

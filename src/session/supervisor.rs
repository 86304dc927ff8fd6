//! Background task owning the connection.
//!
//! One [`Supervisor`] runs per `connect()` call. It owns the transport, the
//! handshake, the keepalive monitor and the command dispatcher, and processes
//! inbound frames one at a time in arrival order. The facade talks to it
//! through [`Control`] messages.
//!
//! # Lifecycle
//!
//! ```text
//! Connecting ──open──▶ Connected ──auth_ok──▶ Authenticated
//!     │                    │                       │
//!     └──────── lost ──────┴───────── lost ────────┘
//!                          ▼
//!              Disconnected ─▶ Reconnecting(1) ─▶ … ─▶ Failed
//! ```
//!
//! `auth_invalid` goes straight to `Failed` without retrying. A `Shutdown`
//! control message interrupts any phase, including the backoff sleep. If the
//! task panics, [`supervise`] publishes `Failed` so the state never goes stale.

// ============================================================================
// Imports
// ============================================================================

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use futures_util::FutureExt as _;
use secrecy::SecretString;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, MissedTickBehavior, interval_at, sleep};
use tracing::{debug, error, info, trace, warn};
use url::Url;

use crate::error::{Error, Result};
use crate::protocol::{Command, InboundMessage};
use crate::transport::{Transport, TransportEvent};

use super::config::SessionConfig;
use super::dispatcher::{CommandDispatcher, DispatcherStats, Submission, Ticket};
use super::events::panic_message;
use super::handshake::{Handshake, HandshakeStep};
use super::keepalive::{KeepAlive, KeepAliveCheck};
use super::state::{ConnectionState, SessionShared};

// ============================================================================
// Constants
// ============================================================================

const MAX_ATTEMPTS_REASON: &str = "max reconnection attempts reached";

/// Stand-in for ticks that would lie past what `Instant` can represent.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

// ============================================================================
// Panic Guard
// ============================================================================

/// Runs `task`, turning a panic into a terminal `Failed` state.
///
/// Pending callers see their reply slots dropped; later calls find the control
/// channel closed and report [`Error::SessionFailed`].
pub(crate) async fn supervise(shared: Arc<SessionShared>, task: impl Future<Output = ()>) {
    if let Err(panic) = AssertUnwindSafe(task).catch_unwind().await {
        let reason = format!("session task panicked: {}", panic_message(panic.as_ref()));
        error!(%reason, "Supervisor task panicked");
        shared.set_state(ConnectionState::Failed { reason });
    }
}

/// First keepalive tick, one `period` from `now` or as far out as representable.
fn first_tick(now: Instant, period: Duration) -> Instant {
    now.checked_add(period)
        .or_else(|| now.checked_add(FAR_FUTURE))
        .unwrap_or(now)
}

// ============================================================================
// Control
// ============================================================================

/// Messages from the facade to the supervisor task.
#[derive(Debug)]
pub(crate) enum Control {
    /// Transmit (or queue) a command.
    Execute(Submission),
    /// The caller stopped waiting; forget the command.
    Abandon(Ticket),
    /// Report dispatcher counters.
    Inspect(oneshot::Sender<DispatcherStats>),
    /// Close the connection and stop.
    Shutdown,
}

// ============================================================================
// Internal Types
// ============================================================================

/// How one connection generation ended.
#[derive(Debug)]
enum Generation {
    /// Transport failure; retriable.
    Lost(Error),
    /// Credential rejected; fatal.
    Rejected(String),
    /// Shutdown requested.
    Shutdown,
}

/// Result of handling one inbound frame.
enum Flow {
    Continue,
    Authenticated,
    End(Generation),
}

// ============================================================================
// Supervisor
// ============================================================================

/// Connection owner for one session run.
pub(crate) struct Supervisor {
    url: Url,
    token: SecretString,
    config: SessionConfig,
    shared: Arc<SessionShared>,
    control_rx: mpsc::UnboundedReceiver<Control>,
    dispatcher: CommandDispatcher,
    keepalive: KeepAlive,
    attempts: u32,
}

impl Supervisor {
    pub(crate) fn new(
        url: Url,
        token: SecretString,
        config: SessionConfig,
        shared: Arc<SessionShared>,
        control_rx: mpsc::UnboundedReceiver<Control>,
    ) -> Self {
        let dispatcher = CommandDispatcher::new(config.max_pending);
        let keepalive = KeepAlive::new(config.keepalive);
        Self {
            url,
            token,
            config,
            shared,
            control_rx,
            dispatcher,
            keepalive,
            attempts: 0,
        }
    }

    /// Runs until shutdown, authentication failure, or reconnect exhaustion.
    pub(crate) async fn run(mut self) {
        self.shared.update_record(|record| record.reconnect_attempts = 0);
        self.shared.set_state(ConnectionState::Connecting);

        loop {
            self.dispatcher.reset_ids();

            let url = self.url.clone();
            let connect_timeout = self.config.connect_timeout;
            let opened = self
                .until_shutdown(Transport::open(&url, connect_timeout))
                .await;

            let generation = match opened {
                None => Generation::Shutdown,
                Some(Ok(transport)) => {
                    self.shared.set_state(ConnectionState::Connected);
                    self.drive(transport).await
                }
                Some(Err(e)) => Generation::Lost(e),
            };

            match generation {
                Generation::Shutdown => {
                    self.stop();
                    return;
                }

                Generation::Rejected(message) => {
                    error!(%message, "Authentication rejected; not reconnecting");
                    self.fail(format!("authentication failed: {message}"), || {
                        Error::authentication_failed(message.clone())
                    });
                    return;
                }

                Generation::Lost(cause) => {
                    warn!(error = %cause, "Connection lost");

                    if !self.shared.state().is_reconnecting() {
                        self.shared.set_state(ConnectionState::Disconnected);
                    }

                    self.attempts += 1;
                    let attempt = self.attempts;
                    self.shared
                        .update_record(|record| record.reconnect_attempts = attempt);

                    if attempt > self.config.reconnect.max_attempts {
                        error!(
                            attempts = self.config.reconnect.max_attempts,
                            "Giving up reconnecting"
                        );
                        self.fail(MAX_ATTEMPTS_REASON.to_string(), || {
                            Error::session_failed(MAX_ATTEMPTS_REASON)
                        });
                        return;
                    }

                    self.shared
                        .set_state(ConnectionState::Reconnecting { attempt });

                    let delay = self.config.reconnect.delay_for(attempt);
                    info!(attempt, delay_ms = delay.as_millis() as u64, "Reconnecting");

                    if self.until_shutdown(sleep(delay)).await.is_none() {
                        self.stop();
                        return;
                    }
                }
            }
        }
    }

    // ========================================================================
    // Connection Generation
    // ========================================================================

    /// Drives one open transport until it ends.
    async fn drive(&mut self, mut transport: Transport) -> Generation {
        let mut handshake = Handshake::new();

        let handshake_deadline = sleep(self.config.handshake_timeout);
        tokio::pin!(handshake_deadline);

        let period = self.keepalive.interval();
        let mut ticker = interval_at(first_tick(Instant::now(), period), period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let generation = loop {
            tokio::select! {
                event = transport.recv() => match event {
                    TransportEvent::Message(text) => {
                        self.keepalive.record();
                        match self.on_frame(&mut transport, &mut handshake, &text).await {
                            Flow::Continue => {}
                            Flow::Authenticated => {
                                ticker.reset_at(first_tick(Instant::now(), period));
                            }
                            Flow::End(generation) => break generation,
                        }
                    }

                    TransportEvent::Closed { code, reason } => {
                        debug!(?code, %reason, "Transport closed");
                        break Generation::Lost(Error::ConnectionClosed);
                    }

                    TransportEvent::Error(e) => break Generation::Lost(e),
                },

                control = self.control_rx.recv() => match control {
                    Some(Control::Execute(submission)) => {
                        if !handshake.is_authenticated() {
                            self.dispatcher.enqueue(submission);
                        } else if let Err(e) = self.transmit(&mut transport, submission).await {
                            break Generation::Lost(e);
                        }
                    }

                    Some(Control::Abandon(ticket)) => {
                        self.dispatcher.abandon(ticket);
                    }

                    Some(Control::Inspect(reply)) => {
                        let _ = reply.send(self.dispatcher.stats());
                    }

                    Some(Control::Shutdown) | None => break Generation::Shutdown,
                },

                () = &mut handshake_deadline, if !handshake.is_authenticated() => {
                    break Generation::Lost(Error::HandshakeTimeout {
                        timeout_ms: self.config.handshake_timeout.as_millis() as u64,
                    });
                }

                _ = ticker.tick(), if self.keepalive.is_active() => {
                    if let Err(e) = self.on_tick(&mut transport).await {
                        break Generation::Lost(e);
                    }
                }
            }
        };

        self.keepalive.stop();
        transport.close().await;

        match generation {
            Generation::Shutdown => self.dispatcher.fail_pending(|| Error::Disconnected),
            _ => self.dispatcher.fail_pending(|| Error::ConnectionClosed),
        };

        generation
    }

    /// Handles one inbound text frame.
    async fn on_frame(
        &mut self,
        transport: &mut Transport,
        handshake: &mut Handshake,
        text: &str,
    ) -> Flow {
        let message = match InboundMessage::parse(text) {
            Ok(message) => message,
            Err(e) => {
                warn!(error = %e, frame = %text, "Dropping malformed frame");
                return Flow::Continue;
            }
        };

        if !handshake.is_authenticated() {
            let step = match handshake.on_message(&message, &self.token) {
                Ok(step) => step,
                Err(e) => return Flow::End(Generation::Lost(e)),
            };

            return match step {
                HandshakeStep::SendAuth(frame) => match transport.send(frame).await {
                    Ok(()) => Flow::Continue,
                    Err(e) => Flow::End(Generation::Lost(e)),
                },

                HandshakeStep::Authenticated { ha_version } => {
                    self.on_authenticated(ha_version);
                    while let Some(submission) = self.dispatcher.pop_queued() {
                        if let Err(e) = self.transmit(transport, submission).await {
                            return Flow::End(Generation::Lost(e));
                        }
                    }
                    Flow::Authenticated
                }

                HandshakeStep::Rejected { message } => Flow::End(Generation::Rejected(message)),

                HandshakeStep::Ignore => Flow::Continue,
            };
        }

        match message {
            InboundMessage::Result(result) => {
                let id = result.id;
                if !self.dispatcher.resolve(id, result.into_outcome()) {
                    trace!(%id, "Result for unknown command");
                }
            }

            InboundMessage::Pong { id } => {
                if !self.dispatcher.resolve(id, Ok(Value::Null)) {
                    trace!(%id, "Pong for untracked ping");
                }
            }

            InboundMessage::Event(event) => self.shared.events.publish(&event),

            other => {
                warn!(kind = other.kind(), "Unexpected handshake frame after authentication");
            }
        }

        Flow::Continue
    }

    fn on_authenticated(&mut self, ha_version: Option<String>) {
        info!(?ha_version, "Authenticated");

        self.attempts = 0;
        self.shared.update_record(|record| {
            record.reconnect_attempts = 0;
            record.last_authenticated_at = Some(SystemTime::now());
            record.server_version = ha_version;
        });
        self.shared.set_state(ConnectionState::Authenticated);
        self.keepalive.start();
    }

    /// Keepalive tick: declare the connection dead or send a probe.
    async fn on_tick(&mut self, transport: &mut Transport) -> Result<()> {
        match self.keepalive.check(Instant::now()) {
            Some(KeepAliveCheck::Expired { elapsed }) => {
                warn!(elapsed_ms = elapsed.as_millis() as u64, "Liveness deadline exceeded");
                Err(Error::LivenessTimeout {
                    elapsed_ms: elapsed.as_millis() as u64,
                    deadline_ms: self.keepalive.deadline().as_millis() as u64,
                })
            }

            Some(KeepAliveCheck::Probe) => {
                let (id, frame) = self.dispatcher.untracked(Command::Ping)?;
                trace!(%id, "Sending keepalive ping");
                transport.send(frame).await
            }

            None => Ok(()),
        }
    }

    /// Writes one submission. A write error ends the generation.
    async fn transmit(
        &mut self,
        transport: &mut Transport,
        submission: Submission,
    ) -> Result<()> {
        let Some(outbound) = self.dispatcher.prepare(submission) else {
            return Ok(());
        };

        match transport.send(outbound.frame.clone()).await {
            Ok(()) => {
                self.dispatcher.confirm(outbound);
                Ok(())
            }
            Err(e) => {
                self.dispatcher
                    .reject(outbound, Error::connection(format!("write failed: {e}")));
                Err(e)
            }
        }
    }

    // ========================================================================
    // Idle Phases
    // ========================================================================

    /// Awaits `future` while still serving control messages.
    ///
    /// Returns `None` if a shutdown was requested first.
    async fn until_shutdown<F: Future>(&mut self, future: F) -> Option<F::Output> {
        tokio::pin!(future);

        loop {
            tokio::select! {
                output = &mut future => return Some(output),

                control = self.control_rx.recv() => match control {
                    Some(Control::Execute(submission)) => self.dispatcher.enqueue(submission),
                    Some(Control::Abandon(ticket)) => {
                        self.dispatcher.abandon(ticket);
                    }
                    Some(Control::Inspect(reply)) => {
                        let _ = reply.send(self.dispatcher.stats());
                    }
                    Some(Control::Shutdown) | None => return None,
                },
            }
        }
    }

    // ========================================================================
    // Termination
    // ========================================================================

    /// Deliberate shutdown.
    fn stop(&mut self) {
        debug!("Supervisor stopping");
        self.dispatcher.fail_queued(|| Error::Disconnected);
        self.close_control(|| Error::Disconnected);
        self.shared.set_state(ConnectionState::Disconnected);
    }

    /// Terminal failure.
    fn fail(&mut self, reason: String, make_error: impl Fn() -> Error) {
        self.dispatcher.fail_queued(&make_error);
        self.shared.set_state(ConnectionState::Failed { reason });
        self.close_control(make_error);
    }

    /// Refuses further control messages and completes those already sent.
    fn close_control(&mut self, make_error: impl Fn() -> Error) {
        self.control_rx.close();
        while let Ok(control) = self.control_rx.try_recv() {
            match control {
                Control::Execute(submission) => submission.fail(make_error()),
                Control::Inspect(reply) => {
                    let _ = reply.send(self.dispatcher.stats());
                }
                Control::Abandon(_) | Control::Shutdown => {}
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

    use std::time::Duration;

    use crate::session::config::ReconnectConfig;

    async fn refused_url() -> Url {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let addr = listener.local_addr().expect("addr");
        drop(listener);
        Url::parse(&format!("ws://{addr}")).expect("url")
    }

    async fn spawn(config: SessionConfig) -> (Arc<SessionShared>, mpsc::UnboundedSender<Control>) {
        let shared = Arc::new(SessionShared::new(8));
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let supervisor = Supervisor::new(
            refused_url().await,
            SecretString::from("token".to_owned()),
            config,
            Arc::clone(&shared),
            control_rx,
        );
        tokio::spawn(supervisor.run());
        (shared, control_tx)
    }

    #[test]
    fn test_first_tick_saturates() {
        let now = Instant::now();
        assert_eq!(first_tick(now, Duration::from_secs(30)), now + Duration::from_secs(30));
        assert_eq!(first_tick(now, Duration::MAX), now + FAR_FUTURE);
    }

    #[tokio::test]
    async fn test_panic_publishes_failed() {
        let shared = Arc::new(SessionShared::new(8));
        shared.set_state(ConnectionState::Authenticated);

        supervise(Arc::clone(&shared), async { panic!("boom"); }).await;

        match shared.state() {
            ConnectionState::Failed { reason } => assert!(reason.contains("boom")),
            other => panic!("unexpected state {other}"),
        }
    }

    #[tokio::test]
    async fn test_clean_exit_keeps_state() {
        let shared = Arc::new(SessionShared::new(8));
        shared.set_state(ConnectionState::Disconnected);

        supervise(Arc::clone(&shared), async {}).await;
        assert_eq!(shared.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let config = SessionConfig::new().with_reconnect(
            ReconnectConfig::new()
                .with_initial_delay(Duration::from_millis(5))
                .with_max_delay(Duration::from_millis(10))
                .with_max_attempts(2),
        );
        let (shared, _control) = spawn(config).await;

        let mut rx = shared.watch_state();
        let state = tokio::time::timeout(
            Duration::from_secs(5),
            rx.wait_for(ConnectionState::is_terminal),
        )
        .await
        .expect("deadline")
        .expect("watch")
        .clone();

        assert_eq!(
            state,
            ConnectionState::Failed {
                reason: MAX_ATTEMPTS_REASON.to_string()
            }
        );
        assert_eq!(shared.record().reconnect_attempts, 3);
    }

    #[tokio::test]
    async fn test_shutdown_interrupts_backoff() {
        let config = SessionConfig::new().with_reconnect(
            ReconnectConfig::new()
                .with_initial_delay(Duration::from_secs(60))
                .with_max_delay(Duration::from_secs(60)),
        );
        let (shared, control) = spawn(config).await;

        let mut rx = shared.watch_state();
        tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|s| s.is_reconnecting()))
            .await
            .expect("deadline")
            .expect("watch");

        // Queued while waiting to reconnect.
        let (sent_tx, _sent_rx) = oneshot::channel();
        let (reply_tx, reply_rx) = oneshot::channel();
        control
            .send(Control::Execute(Submission {
                ticket: 1,
                command: Command::Ping,
                tracked: true,
                sent: sent_tx,
                reply: reply_tx,
            }))
            .expect("send");
        control.send(Control::Shutdown).expect("shutdown");

        let outcome = tokio::time::timeout(Duration::from_secs(5), reply_rx)
            .await
            .expect("deadline")
            .expect("reply");
        assert!(matches!(outcome, Err(Error::Disconnected)));

        tokio::time::timeout(
            Duration::from_secs(5),
            rx.wait_for(|s| *s == ConnectionState::Disconnected),
        )
        .await
        .expect("deadline")
        .expect("watch");
    }
}

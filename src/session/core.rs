//! Public session facade.
//!
//! A [`Session`] is a cheap, cloneable handle. `connect()` spawns the
//! supervisor task that owns the socket; every other call either talks to
//! that task or reads state it publishes.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use hass_websocket::Session;
//!
//! # async fn example() -> hass_websocket::Result<()> {
//! let session = Session::new();
//! session.connect("ws://homeassistant.local:8123/api/websocket", "TOKEN").await?;
//! session.wait_until_authenticated(Duration::from_secs(10)).await?;
//!
//! session.register_event_callback("log", |event| {
//!     println!("{:?}", event.event_type());
//! });
//! let subscription = session.subscribe_to_events(Some("state_changed")).await?;
//!
//! session
//!     .call_service("light", "turn_on", Some(serde_json::json!({"entity_id": "light.kitchen"})))
//!     .await?;
//!
//! session.unsubscribe_from_events(subscription).await?;
//! session.disconnect().await;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime};

use parking_lot::Mutex;
use secrecy::SecretString;
use serde_json::Value;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{Error, Result};
use crate::identifiers::{CommandId, SubscriptionId};
use crate::protocol::{Command, Event};

use super::builder::SessionBuilder;
use super::config::SessionConfig;
use super::dispatcher::{DispatcherStats, Submission, Ticket};
use super::state::{ConnectionState, SessionRecord, SessionShared};
use super::supervisor::{Control, Supervisor, supervise};

// ============================================================================
// Types
// ============================================================================

/// Channel and task of a running supervisor.
struct Link {
    control: mpsc::UnboundedSender<Control>,
    task: JoinHandle<()>,
}

/// Internal shared state for the session.
pub(crate) struct SessionInner {
    /// Configuration applied to every connection.
    config: SessionConfig,

    /// State published by the supervisor.
    shared: Arc<SessionShared>,

    /// Running supervisor, if any.
    link: Mutex<Option<Link>>,

    /// Source of submission tickets.
    tickets: AtomicU64,
}

// ============================================================================
// Session
// ============================================================================

/// Handle to one logical Home Assistant session.
///
/// A session spans any number of transport reconnects between `connect()`
/// and `disconnect()`. Clones share the same session.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("state", &self.state())
            .field("handlers", &self.inner.shared.events.handler_count())
            .finish_non_exhaustive()
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Session - Construction
// ============================================================================

impl Session {
    /// Creates a session with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::from_config(SessionConfig::default())
    }

    /// Creates a session with `config`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the configuration is invalid.
    pub fn with_config(config: SessionConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::from_config(config))
    }

    /// Creates a configuration builder.
    #[inline]
    #[must_use]
    pub fn builder() -> SessionBuilder {
        SessionBuilder::new()
    }

    pub(crate) fn from_config(config: SessionConfig) -> Self {
        let shared = Arc::new(SessionShared::new(config.event_buffer));
        Self {
            inner: Arc::new(SessionInner {
                config,
                shared,
                link: Mutex::new(None),
                tickets: AtomicU64::new(1),
            }),
        }
    }

    /// Returns the configuration.
    #[inline]
    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }
}

// ============================================================================
// Session - Lifecycle
// ============================================================================

impl Session {
    /// Starts the session against `url`, authenticating with `token`.
    ///
    /// Any previous run is shut down first. Returns once the background task
    /// is running; observe [`state`](Self::state) or use
    /// [`wait_until_authenticated`](Self::wait_until_authenticated) to know
    /// when commands flow. Commands issued before then are queued.
    ///
    /// # Arguments
    ///
    /// * `url` - `ws://` or `wss://` endpoint, e.g. `ws://host:8123/api/websocket`
    /// * `token` - Long-lived access token
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidUrl`] if `url` does not parse
    /// - [`Error::Config`] if the scheme is unsupported or the token is empty
    pub async fn connect(&self, url: &str, token: impl Into<String>) -> Result<()> {
        let url = parse_server_url(url)?;

        let token = token.into();
        if token.trim().is_empty() {
            return Err(Error::config("access token must not be empty"));
        }

        self.disconnect().await;

        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let supervisor = Supervisor::new(
            url.clone(),
            SecretString::from(token),
            self.inner.config.clone(),
            Arc::clone(&self.inner.shared),
            control_rx,
        );
        let task = tokio::spawn(supervise(
            Arc::clone(&self.inner.shared),
            supervisor.run(),
        ));

        let stale = self.inner.link.lock().replace(Link {
            control: control_tx,
            task,
        });
        if let Some(stale) = stale {
            let _ = stale.control.send(Control::Shutdown);
        }

        info!(%url, "Session started");
        Ok(())
    }

    /// Ends the session.
    ///
    /// Cancels any reconnection in progress, fails outstanding commands with
    /// [`Error::Disconnected`] and leaves the state `Disconnected`. Safe to
    /// call at any time, including repeatedly.
    pub async fn disconnect(&self) {
        let link = self.inner.link.lock().take();

        if let Some(link) = link {
            let _ = link.control.send(Control::Shutdown);
            if let Err(e) = link.task.await {
                warn!(error = %e, "Supervisor task ended abnormally");
            }
            debug!("Session disconnected");
        }

        self.inner.shared.set_state(ConnectionState::Disconnected);
    }
}

// ============================================================================
// Session - Commands
// ============================================================================

impl Session {
    /// Sends a command and waits for its result.
    ///
    /// `parameters`, if given, must be a JSON object; its fields are merged
    /// into the frame next to `id` and `type`.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidArgument`] if the type or parameters are unusable
    /// - [`Error::NotConnected`] if `connect()` was never called
    /// - [`Error::CommandTimeout`] if no reply arrives in time
    /// - [`Error::CommandRejected`] if the server answers `success: false`
    /// - [`Error::ConnectionClosed`] if the connection drops while waiting
    /// - [`Error::Disconnected`] if `disconnect()` is called while waiting
    /// - [`Error::SessionFailed`] / [`Error::AuthenticationFailed`] if the
    ///   session gives up while the command is queued
    pub async fn send_command(&self, command_type: &str, parameters: Option<Value>) -> Result<Value> {
        let command = Command::custom(command_type, parameters)?;
        self.execute(command, true).await.map(|(_, value)| value)
    }

    /// Sends a command without waiting for a reply.
    ///
    /// Returns once the frame has been written. Any reply the server sends is
    /// discarded.
    ///
    /// # Errors
    ///
    /// Same as [`send_command`](Self::send_command), minus the reply errors.
    pub async fn send_untracked(&self, command_type: &str, parameters: Option<Value>) -> Result<()> {
        let command = Command::custom(command_type, parameters)?;
        self.execute(command, false).await.map(|_| ())
    }

    /// Calls `domain.service` with optional service data.
    ///
    /// # Errors
    ///
    /// Same as [`send_command`](Self::send_command).
    pub async fn call_service(
        &self,
        domain: &str,
        service: &str,
        service_data: Option<Value>,
    ) -> Result<Value> {
        let command = Command::call_service(domain, service, service_data);
        self.execute(command, true).await.map(|(_, value)| value)
    }

    /// Sends a correlated `ping` and waits for the `pong`.
    ///
    /// # Errors
    ///
    /// Same as [`send_command`](Self::send_command).
    pub async fn ping(&self) -> Result<()> {
        self.execute(Command::Ping, true).await.map(|_| ())
    }

    /// Subscribes to server events, optionally filtered by type.
    ///
    /// Events are delivered to registered callbacks and to
    /// [`events`](Self::events) streams. Subscriptions are not restored after
    /// a reconnect.
    ///
    /// # Errors
    ///
    /// Same as [`send_command`](Self::send_command).
    pub async fn subscribe_to_events(&self, event_type: Option<&str>) -> Result<SubscriptionId> {
        let (id, _) = self
            .execute(Command::subscribe_events(event_type), true)
            .await?;
        debug!(%id, ?event_type, "Subscribed to events");
        Ok(SubscriptionId::from(id))
    }

    /// Cancels a subscription.
    ///
    /// # Errors
    ///
    /// Same as [`send_command`](Self::send_command).
    pub async fn unsubscribe_from_events(&self, subscription: SubscriptionId) -> Result<()> {
        self.execute(Command::UnsubscribeEvents { subscription }, true)
            .await
            .map(|_| ())
    }

    /// Hands `command` to the supervisor and waits for its outcome.
    async fn execute(&self, command: Command, tracked: bool) -> Result<(CommandId, Value)> {
        let control = self.control()?;
        let ticket = self.inner.tickets.fetch_add(1, Ordering::Relaxed);

        let (sent_tx, sent_rx) = oneshot::channel();
        let (reply_tx, mut reply_rx) = oneshot::channel();

        control
            .send(Control::Execute(Submission {
                ticket,
                command,
                tracked,
                sent: sent_tx,
                reply: reply_tx,
            }))
            .map_err(|_| self.closed_error())?;

        let guard = AbandonGuard::new(control, ticket);

        // The sent slot is dropped unfilled when the command fails before
        // transmission; the reply slot then carries the error.
        let Ok(id) = sent_rx.await else {
            guard.disarm();
            return match reply_rx.await {
                Ok(outcome) => outcome.map(|value| (CommandId::UNASSIGNED, value)),
                Err(_) => Err(self.closed_error()),
            };
        };

        let command_timeout = self.inner.config.command_timeout;
        match timeout(command_timeout, &mut reply_rx).await {
            Ok(Ok(outcome)) => {
                guard.disarm();
                outcome.map(|value| (id, value))
            }
            Ok(Err(_)) => {
                guard.disarm();
                Err(self.closed_error())
            }
            Err(_) => {
                debug!(%id, "Command timed out");
                Err(Error::command_timeout(
                    id,
                    command_timeout.as_millis() as u64,
                ))
            }
        }
    }

    fn control(&self) -> Result<mpsc::UnboundedSender<Control>> {
        self.inner
            .link
            .lock()
            .as_ref()
            .map(|link| link.control.clone())
            .ok_or(Error::NotConnected)
    }

    /// Error for a command whose supervisor went away.
    fn closed_error(&self) -> Error {
        match self.state() {
            ConnectionState::Failed { reason } => Error::session_failed(reason),
            ConnectionState::Disconnected => Error::Disconnected,
            _ => Error::ConnectionClosed,
        }
    }
}

// ============================================================================
// Session - Events
// ============================================================================

impl Session {
    /// Registers `handler` under `key`, replacing any handler with that key.
    ///
    /// Handlers run synchronously on the inbound path, in registration order;
    /// keep them short.
    pub fn register_event_callback<F>(&self, key: impl Into<String>, handler: F)
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.inner.shared.events.subscribe(key, Arc::new(handler));
    }

    /// Removes the handler registered under `key`. Returns `true` if one existed.
    pub fn unregister_event_callback(&self, key: &str) -> bool {
        self.inner.shared.events.unsubscribe(key)
    }

    /// Returns a stream of every event received after this call.
    #[must_use]
    pub fn events(&self) -> broadcast::Receiver<Event> {
        self.inner.shared.events.stream()
    }
}

// ============================================================================
// Session - State
// ============================================================================

impl Session {
    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.inner.shared.state()
    }

    /// Returns `true` while commands are transmitted immediately.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.state().is_authenticated()
    }

    /// Observer of the connection state.
    ///
    /// A `watch` receiver only keeps the latest value: an observer that
    /// falls behind sees the newest state, not every intermediate one.
    #[must_use]
    pub fn state_receiver(&self) -> watch::Receiver<ConnectionState> {
        self.inner.shared.watch_state()
    }

    /// Stream of every state transition after this call, in order.
    ///
    /// Unlike [`state_receiver`](Self::state_receiver), intermediate states
    /// are not coalesced (up to a buffer of 64 transitions).
    #[must_use]
    pub fn state_changes(&self) -> broadcast::Receiver<ConnectionState> {
        self.inner.shared.transitions()
    }

    /// Waits until the state satisfies `predicate`, returning that state.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Timeout`] if `wait` elapses first.
    pub async fn wait_for_state(
        &self,
        mut predicate: impl FnMut(&ConnectionState) -> bool,
        wait: Duration,
    ) -> Result<ConnectionState> {
        let mut rx = self.state_receiver();
        match timeout(wait, rx.wait_for(|state| predicate(state))).await {
            Ok(Ok(state)) => Ok(state.clone()),
            Ok(Err(_)) => Err(Error::ConnectionClosed),
            Err(_) => Err(Error::timeout(
                "waiting for connection state",
                wait.as_millis() as u64,
            )),
        }
    }

    /// Waits until the session is authenticated.
    ///
    /// # Errors
    ///
    /// - [`Error::SessionFailed`] if the session fails first
    /// - [`Error::Timeout`] if `wait` elapses first
    pub async fn wait_until_authenticated(&self, wait: Duration) -> Result<()> {
        let state = self
            .wait_for_state(|s| s.is_authenticated() || s.is_terminal(), wait)
            .await?;

        match state {
            ConnectionState::Failed { reason } => Err(Error::session_failed(reason)),
            _ => Ok(()),
        }
    }

    /// Session facts that survive reconnects.
    #[must_use]
    pub fn record(&self) -> SessionRecord {
        self.inner.shared.record()
    }

    /// When the last successful authentication happened.
    #[must_use]
    pub fn last_authenticated_at(&self) -> Option<SystemTime> {
        self.record().last_authenticated_at
    }

    /// Reconnection attempts since the last successful authentication.
    #[must_use]
    pub fn reconnect_attempts(&self) -> u32 {
        self.record().reconnect_attempts
    }

    /// Server version reported by the last handshake.
    #[must_use]
    pub fn server_version(&self) -> Option<String> {
        self.record().server_version
    }

    /// Number of commands awaiting a reply.
    pub async fn pending_count(&self) -> usize {
        self.dispatcher_stats().await.pending
    }

    /// Number of commands queued until authentication.
    pub async fn queued_count(&self) -> usize {
        self.dispatcher_stats().await.queued
    }

    async fn dispatcher_stats(&self) -> DispatcherStats {
        let Ok(control) = self.control() else {
            return DispatcherStats::default();
        };

        let (tx, rx) = oneshot::channel();
        if control.send(Control::Inspect(tx)).is_err() {
            return DispatcherStats::default();
        }
        rx.await.unwrap_or_default()
    }
}

// ============================================================================
// AbandonGuard
// ============================================================================

/// Tells the supervisor to forget a command unless disarmed.
///
/// Covers both timeouts and callers dropping the `execute` future.
struct AbandonGuard {
    control: Option<mpsc::UnboundedSender<Control>>,
    ticket: Ticket,
}

impl AbandonGuard {
    fn new(control: mpsc::UnboundedSender<Control>, ticket: Ticket) -> Self {
        Self {
            control: Some(control),
            ticket,
        }
    }

    fn disarm(mut self) {
        self.control = None;
    }
}

impl Drop for AbandonGuard {
    fn drop(&mut self) {
        if let Some(control) = self.control.take() {
            let _ = control.send(Control::Abandon(self.ticket));
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Parses and checks a server URL.
fn parse_server_url(raw: &str) -> Result<Url> {
    let url = Url::parse(raw)?;

    match url.scheme() {
        "ws" => Ok(url),
        "wss" if cfg!(feature = "tls") => Ok(url),
        "wss" => Err(Error::config(
            "wss:// endpoints require the `tls` feature",
        )),
        other => Err(Error::config(format!(
            "unsupported URL scheme '{other}', expected ws or wss"
        ))),
    }
}

// ============================================================================
// Tests
// ============================================================================

#![allow(
    clippy::unwrap_used,
    clippy::missing_panics_doc,
    reason = "Test scaffolding panics on setup failures"
)]
#![allow(
    unused,
    reason = "Not every test file uses every helper"
)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use futures_util::{SinkExt as _, StreamExt as _};
use hass_websocket::{ConnectionState, ReconnectConfig, Session, SessionConfig};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;

pub const TOKEN: &str = "test-token";
pub const HA_VERSION: &str = "2024.1.0";

/// How the mock answers the handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    /// `auth_ok` for [`TOKEN`], `auth_invalid` otherwise.
    Accept,
    /// Always `auth_invalid`.
    Reject,
    /// Sends `auth_required` but leaves the verdict to the test.
    Manual,
    /// Never sends `auth_required`.
    Mute,
}

#[derive(Debug, Clone)]
enum Action {
    Send(String),
    Close,
}

/// In-process Home Assistant WebSocket endpoint.
pub struct MockServer {
    addr: SocketAddr,
    /// Every frame received from any client, parsed.
    frames_rx: mpsc::UnboundedReceiver<Value>,
    /// Actions for all live connections.
    action_tx: broadcast::Sender<Action>,
    connections: Arc<AtomicUsize>,
    refuse: Arc<AtomicBool>,
}

impl MockServer {
    /// Starts a server answering pings automatically.
    pub async fn start(auth: AuthMode) -> Self {
        Self::start_with(auth, true).await
    }

    /// Starts a server; `auto_pong` controls whether pings are answered.
    pub async fn start_with(auth: AuthMode, auto_pong: bool) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (frames_tx, frames_rx) = mpsc::unbounded_channel::<Value>();
        let (action_tx, _) = broadcast::channel::<Action>(100);
        let connections = Arc::new(AtomicUsize::new(0));
        let refuse = Arc::new(AtomicBool::new(false));

        let actions = action_tx.clone();
        let accepted = Arc::clone(&connections);
        let refusing = Arc::clone(&refuse);

        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    break;
                };

                if refusing.load(Ordering::SeqCst) {
                    drop(stream);
                    continue;
                }

                let Ok(ws_stream) = tokio_tungstenite::accept_async(stream).await else {
                    continue;
                };
                accepted.fetch_add(1, Ordering::SeqCst);

                let (mut write, mut read) = ws_stream.split();
                let mut action_rx = actions.subscribe();
                let frames = frames_tx.clone();

                tokio::spawn(async move {
                    if auth != AuthMode::Mute {
                        let challenge = json!({"type": "auth_required", "ha_version": HA_VERSION});
                        if write
                            .send(Message::Text(challenge.to_string().into()))
                            .await
                            .is_err()
                        {
                            return;
                        }
                    }

                    loop {
                        tokio::select! {
                            msg = read.next() => {
                                let text = match msg {
                                    Some(Ok(Message::Text(text))) => text.as_str().to_owned(),
                                    Some(Ok(_)) => continue,
                                    _ => break,
                                };
                                let Ok(frame) = serde_json::from_str::<Value>(&text) else {
                                    continue;
                                };

                                let reply = match frame["type"].as_str() {
                                    Some("auth") => match auth {
                                        AuthMode::Accept if frame["access_token"] == TOKEN => {
                                            Some(json!({"type": "auth_ok", "ha_version": HA_VERSION}))
                                        }
                                        AuthMode::Accept | AuthMode::Reject => {
                                            Some(json!({"type": "auth_invalid", "message": "Invalid password"}))
                                        }
                                        AuthMode::Manual | AuthMode::Mute => None,
                                    },
                                    Some("ping") if auto_pong => {
                                        Some(json!({"id": frame["id"], "type": "pong"}))
                                    }
                                    _ => None,
                                };

                                drop(frames.send(frame));

                                if let Some(reply) = reply
                                    && write.send(Message::Text(reply.to_string().into())).await.is_err()
                                {
                                    break;
                                }
                            }

                            action = action_rx.recv() => match action {
                                Ok(Action::Send(text)) => {
                                    if write.send(Message::Text(text.into())).await.is_err() {
                                        break;
                                    }
                                }
                                Ok(Action::Close) | Err(_) => {
                                    drop(write.send(Message::Close(None)).await);
                                    break;
                                }
                            },
                        }
                    }
                });
            }
        });

        Self {
            addr,
            frames_rx,
            action_tx,
            connections,
            refuse,
        }
    }

    pub fn url(&self) -> String {
        format!("ws://{}/api/websocket", self.addr)
    }

    /// Sends a frame to every live connection.
    pub fn send(&self, frame: &Value) {
        drop(self.action_tx.send(Action::Send(frame.to_string())));
    }

    /// Closes every live connection.
    pub fn close_connections(&self) {
        drop(self.action_tx.send(Action::Close));
    }

    /// While set, new TCP connections are dropped before the upgrade.
    pub fn refuse_connections(&self, refuse: bool) {
        self.refuse.store(refuse, Ordering::SeqCst);
    }

    /// Number of upgraded connections so far.
    pub fn connection_count(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    /// Next frame from any client.
    pub async fn recv_frame(&mut self) -> Value {
        timeout(Duration::from_secs(2), self.frames_rx.recv())
            .await
            .expect("no frame within 2s")
            .expect("server stopped")
    }

    /// Next frame that is not an auth frame.
    pub async fn recv_command(&mut self) -> Value {
        loop {
            let frame = self.recv_frame().await;
            if frame["type"] != "auth" {
                return frame;
            }
        }
    }

    /// A frame already received, if any.
    pub fn try_recv_frame(&mut self) -> Option<Value> {
        self.frames_rx.try_recv().ok()
    }

    /// Answers the command with `result`.
    pub fn reply(&self, id: &Value, result: Value) {
        self.send(&json!({"id": id, "type": "result", "success": true, "result": result}));
    }
}

/// Configuration with short delays for tests.
pub fn fast_config() -> SessionConfig {
    SessionConfig::new()
        .with_command_timeout(Duration::from_secs(2))
        .with_handshake_timeout(Duration::from_secs(2))
        .with_reconnect(
            ReconnectConfig::new()
                .with_initial_delay(Duration::from_millis(20))
                .with_max_delay(Duration::from_millis(100))
                .with_max_attempts(3),
        )
}

/// Connects to `server` and waits for authentication.
pub async fn connected_session(server: &MockServer, config: SessionConfig) -> Session {
    let session = Session::with_config(config).unwrap();
    session.connect(&server.url(), TOKEN).await.unwrap();
    session
        .wait_until_authenticated(Duration::from_secs(2))
        .await
        .unwrap();
    session
}

/// Waits for `state`, failing the test after 2s.
pub async fn wait_for(session: &Session, state: ConnectionState) {
    session
        .wait_for_state(|s| *s == state, Duration::from_secs(2))
        .await
        .unwrap();
}

/// Collects transitions from `changes` up to and including the first one
/// matching `last`, failing the test if none arrives within 2s.
pub async fn collect_until(
    changes: &mut broadcast::Receiver<ConnectionState>,
    mut last: impl FnMut(&ConnectionState) -> bool,
) -> Vec<ConnectionState> {
    let mut seen = Vec::new();
    loop {
        let state = timeout(Duration::from_secs(2), changes.recv())
            .await
            .expect("no state change within 2s")
            .unwrap();
        let done = last(&state);
        seen.push(state);
        if done {
            return seen;
        }
    }
}

pub fn init_tracing() {
    drop(
        tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init(),
    );
}

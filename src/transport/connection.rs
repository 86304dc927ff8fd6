//! WebSocket client connection.
//!
//! A [`Transport`] owns one open WebSocket: it writes whole text frames and
//! reads inbound frames as [`TransportEvent`]s. It knows nothing about the
//! protocol; the session supervisor drives it.

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, trace, warn};
use url::Url;

use crate::error::{Error, Result};

// ============================================================================
// Types
// ============================================================================

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

// ============================================================================
// TransportEvent
// ============================================================================

/// Something observed on the inbound side of a transport.
#[derive(Debug)]
pub enum TransportEvent {
    /// A text frame.
    Message(String),

    /// The connection was closed (by the peer or because the stream ended).
    Closed {
        /// Close code sent by the peer, if any.
        code: Option<u16>,
        /// Close reason sent by the peer.
        reason: String,
    },

    /// The connection failed.
    Error(Error),
}

// ============================================================================
// Transport
// ============================================================================

/// An open WebSocket connection.
///
/// `send` writes one complete frame per call, so frames never interleave.
/// `close` is idempotent.
pub struct Transport {
    /// Write half.
    sink: SplitSink<WsStream, Message>,
    /// Read half.
    stream: SplitStream<WsStream>,
    /// Set once closed locally or by the peer.
    closed: bool,
}

impl Transport {
    /// Opens a WebSocket connection to `url`.
    ///
    /// # Arguments
    ///
    /// * `url` - `ws://` or `wss://` endpoint
    /// * `connect_timeout` - Upper bound for TCP connect plus upgrade
    ///
    /// # Errors
    ///
    /// - [`Error::Connection`] if the connection is refused, the host cannot be
    ///   resolved, the upgrade fails, or `connect_timeout` elapses
    pub async fn open(url: &Url, connect_timeout: Duration) -> Result<Self> {
        debug!(%url, "Opening WebSocket");

        let (ws_stream, response) = timeout(connect_timeout, connect_async(url.as_str()))
            .await
            .map_err(|_| {
                Error::connection(format!(
                    "{url}: no connection after {}ms",
                    connect_timeout.as_millis()
                ))
            })?
            .map_err(|e| Error::connection(format!("{url}: {e}")))?;

        debug!(status = %response.status(), "WebSocket upgraded");

        let (sink, stream) = ws_stream.split();
        Ok(Self {
            sink,
            stream,
            closed: false,
        })
    }

    /// Returns `true` until the transport has been closed.
    #[inline]
    #[must_use]
    pub fn is_open(&self) -> bool {
        !self.closed
    }

    /// Writes one text frame.
    ///
    /// # Errors
    ///
    /// - [`Error::ConnectionClosed`] if the transport is already closed
    /// - [`Error::WebSocket`] if the write fails
    pub async fn send(&mut self, text: String) -> Result<()> {
        if self.closed {
            return Err(Error::ConnectionClosed);
        }

        trace!(frame = %text, "Sending frame");
        self.sink.send(Message::Text(text.into())).await?;
        Ok(())
    }

    /// Waits for the next inbound event.
    ///
    /// Binary frames and WebSocket-level ping/pong frames are skipped. After a
    /// `Closed` or `Error` event the transport reports itself closed.
    ///
    /// Cancel-safe: no frame is lost if the future is dropped.
    pub async fn recv(&mut self) -> TransportEvent {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => {
                    return TransportEvent::Message(text.as_str().to_owned());
                }

                Some(Ok(Message::Close(frame))) => {
                    self.closed = true;
                    let (code, reason) = frame
                        .map(|f| (Some(u16::from(f.code)), f.reason.as_str().to_owned()))
                        .unwrap_or((None, String::new()));
                    debug!(?code, %reason, "WebSocket closed by remote");
                    return TransportEvent::Closed { code, reason };
                }

                Some(Err(e)) => {
                    self.closed = true;
                    warn!(error = %e, "WebSocket error");
                    return TransportEvent::Error(Error::WebSocket(e));
                }

                None => {
                    self.closed = true;
                    debug!("WebSocket stream ended");
                    return TransportEvent::Closed {
                        code: None,
                        reason: "stream ended".to_string(),
                    };
                }

                // Ignore Binary, Ping, Pong, raw frames
                Some(Ok(_)) => {}
            }
        }
    }

    /// Closes the connection. Safe to call repeatedly.
    pub async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        if let Err(e) = self.sink.close().await {
            debug!(error = %e, "Error while closing WebSocket");
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

//! One WebSocket session against the feed endpoint.
//!
//! A session owns the socket for its whole life: it is opened once,
//! delivers inbound frames and lifecycle events to its owner over a
//! channel, and is done the moment the connection drops. There is no
//! retry and no resubscribe here; the owner decides what a dropped
//! connection means.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::time;
use tokio_tungstenite::tungstenite::Message;

use monwatch_core::error::TransportError;
use monwatch_core::wire::JsonRpcRequest;

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique session identity.
///
/// Owners tag every delivered event with the id, so events from a
/// session that was already replaced can be recognized and dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(u64);

impl SessionId {
    /// Allocate a fresh id.
    pub fn next() -> Self {
        Self(NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Configuration for a session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Handshake deadline.
    pub connect_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
        }
    }
}

/// Lifecycle and data events delivered to the session owner, in the
/// order they occurred on the socket.
#[derive(Debug)]
pub enum SessionEvent {
    /// The socket is established and frames may flow.
    Opened,
    /// One inbound text frame, decoded as JSON.
    Frame(Value),
    /// Receive or send error. A `Closed` follows.
    Error(String),
    /// The socket is gone, with the close code if the peer sent one.
    Closed(Option<u16>),
}

enum SessionCommand {
    Send(String),
    Close,
}

/// Handle to one live WebSocket session.
///
/// Dropping the handle closes the socket.
pub struct WsSession {
    id: SessionId,
    url: String,
    cmd_tx: mpsc::UnboundedSender<SessionCommand>,
    open: Arc<AtomicBool>,
}

impl WsSession {
    /// Perform the handshake and start the background socket task.
    ///
    /// Events arrive on the returned receiver, starting with
    /// [`SessionEvent::Opened`] and ending with exactly one
    /// [`SessionEvent::Closed`].
    pub async fn open(
        url: impl Into<String>,
        config: SessionConfig,
    ) -> Result<(Self, mpsc::UnboundedReceiver<(SessionId, SessionEvent)>), TransportError> {
        let url = url.into();
        let id = SessionId::next();

        tracing::info!(url = %url, session = %id, "connecting via WebSocket");
        let connect = tokio_tungstenite::connect_async(&url);
        let (ws_stream, _) = time::timeout(config.connect_timeout, connect)
            .await
            .map_err(|_| TransportError::ConnectTimeout {
                ms: config.connect_timeout.as_millis() as u64,
            })?
            .map_err(|e| TransportError::Connect(e.to_string()))?;

        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let open = Arc::new(AtomicBool::new(true));

        let task_open = open.clone();
        tokio::spawn(async move {
            session_task(id, ws_stream, cmd_rx, event_tx, task_open).await;
        });

        Ok((
            Self {
                id,
                url,
                cmd_tx,
                open,
            },
            event_rx,
        ))
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Returns `true` until the socket closes or `close` is called.
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Relaxed)
    }

    /// Queue one request frame. Fails fast with [`TransportError::NotOpen`]
    /// when the session is no longer open; nothing is ever buffered for a
    /// dead connection.
    pub fn send(&self, req: &JsonRpcRequest) -> Result<(), TransportError> {
        if !self.is_open() {
            return Err(TransportError::NotOpen);
        }
        let text = serde_json::to_string(req)
            .map_err(|e| TransportError::WebSocket(e.to_string()))?;
        self.cmd_tx
            .send(SessionCommand::Send(text))
            .map_err(|_| TransportError::NotOpen)
    }

    /// Close the socket. Idempotent.
    pub fn close(&self) {
        if self.open.swap(false, Ordering::Relaxed) {
            let _ = self.cmd_tx.send(SessionCommand::Close);
        }
    }
}

impl Drop for WsSession {
    fn drop(&mut self) {
        self.close();
    }
}

async fn session_task(
    id: SessionId,
    ws_stream: tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >,
    mut cmd_rx: mpsc::UnboundedReceiver<SessionCommand>,
    event_tx: mpsc::UnboundedSender<(SessionId, SessionEvent)>,
    open: Arc<AtomicBool>,
) {
    let (mut sink, mut stream) = ws_stream.split();
    let _ = event_tx.send((id, SessionEvent::Opened));

    let close_code = loop {
        tokio::select! {
            cmd = cmd_rx.recv() => {
                match cmd {
                    None | Some(SessionCommand::Close) => {
                        let _ = sink.send(Message::Close(None)).await;
                        break None;
                    }
                    Some(SessionCommand::Send(text)) => {
                        if let Err(e) = sink.send(Message::Text(text)).await {
                            let _ = event_tx.send((id, SessionEvent::Error(e.to_string())));
                            break None;
                        }
                    }
                }
            }
            msg = stream.next() => {
                match msg {
                    None => break None,
                    Some(Err(e)) => {
                        tracing::warn!(session = %id, error = %e, "WS receive error");
                        let _ = event_tx.send((id, SessionEvent::Error(e.to_string())));
                        break None;
                    }
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<Value>(text.as_str()) {
                            Ok(frame) => {
                                let _ = event_tx.send((id, SessionEvent::Frame(frame)));
                            }
                            Err(_) => {
                                tracing::debug!(session = %id, "non-JSON text frame dropped");
                            }
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        break frame.map(|f| u16::from(f.code));
                    }
                    // Ping/pong handled by tungstenite; binary is not
                    // part of the feed protocol.
                    Some(Ok(_)) => {}
                }
            }
        }
    };

    open.store(false, Ordering::Relaxed);
    tracing::info!(session = %id, code = ?close_code, "WS session closed");
    let _ = event_tx.send((id, SessionEvent::Closed(close_code)));
}

//! WebSocket session management for the link gateway.
//!
//! Each login attempt gets its own WebSocket connection to the gateway. The
//! conversation is short and one-sided: the agent introduces itself with a
//! single `hello` frame, then the gateway streams linking events back until
//! the session reaches a verdict.
//!
//! ```text
//! Agent                                Gateway
//! ─────                                ───────
//! hello {device_id, resume}  ───►
//!                            ◄───  qr {code}            (may repeat)
//!                            ◄───  pair-success {device} → verdict Ok
//!                            ◄───  stream-error {status} → verdict Err
//! (socket close without a verdict    → verdict Err, status = None)
//! ```
//!
//! # Design
//!
//! [`WsGateway`] implements the `Transport` port from `pairlink-core`. Every
//! [`open_session`](WsGateway::open_session) splits the socket and spawns one
//! reader task that pumps frames until the first verdict, then sends that
//! verdict through a oneshot channel. The returned [`WsSessionHandle`] owns
//! the other end: `ready()` awaits the verdict, `close()` sends a best-effort
//! close frame and aborts the reader.
//!
//! The gateway keeps the device id it introduced in `hello` across calls, so
//! a session opened with `resume_existing = true` (the reconnect path after a
//! restart-required error) presents the same registration instead of starting
//! a new one.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};
use uuid::Uuid;

use pairlink_core::{Transport, TransportFailure, TransportHandle};

use crate::domain::messages::{AgentToGatewayMsg, GatewayToAgentMsg};
use crate::infrastructure::storage::credentials::{CredentialRecord, FileCredentialStore};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, WsMessage>;
type WsSource = SplitStream<WsStream>;

/// Error type for opening a gateway session.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The TCP connect or WebSocket upgrade failed.
    #[error("could not reach the link gateway at {url}: {source}")]
    Connect {
        url: String,
        #[source]
        source: tokio_tungstenite::tungstenite::Error,
    },

    /// The connect plus upgrade did not finish within the configured budget.
    #[error("gateway handshake timed out after {0:?}")]
    HandshakeTimeout(Duration),

    /// The hello frame could not be written to the fresh socket.
    #[error("could not send hello to the gateway: {0}")]
    Hello(#[source] tokio_tungstenite::tungstenite::Error),

    /// The hello frame could not be encoded (should never happen in practice).
    #[error("could not encode hello frame: {0}")]
    Encode(#[from] serde_json::Error),
}

/// WebSocket-backed implementation of the `Transport` port.
pub struct WsGateway {
    url: String,
    handshake_timeout: Duration,
    credentials: Arc<FileCredentialStore>,
    /// Registration id presented in `hello`. Survives across sessions so the
    /// resume path re-presents the same registration.
    session_device: Mutex<Option<Uuid>>,
}

impl WsGateway {
    /// Creates a gateway client for `url`.
    ///
    /// `credentials` is where a pair-success frame persists its record; the
    /// write happens inside the reader task, before the verdict settles, so
    /// a caller that observes the connected state always finds the file in
    /// place.
    pub fn new(
        url: impl Into<String>,
        handshake_timeout: Duration,
        credentials: Arc<FileCredentialStore>,
    ) -> Self {
        Self {
            url: url.into(),
            handshake_timeout,
            credentials,
            session_device: Mutex::new(None),
        }
    }

    /// Dials the gateway, performs the upgrade, and sends the hello frame.
    ///
    /// Returns the open stream together with the device id the hello frame
    /// introduced.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError`] when the connect/upgrade fails or times out,
    /// or when the hello frame cannot be sent.
    async fn dial(&self, resume_existing: bool) -> Result<(WsStream, Uuid), GatewayError> {
        debug!("dialling link gateway at {}", self.url);
        let (mut ws, _response) =
            match timeout(self.handshake_timeout, connect_async(self.url.as_str())).await {
                Ok(Ok(pair)) => pair,
                Ok(Err(source)) => {
                    return Err(GatewayError::Connect {
                        url: self.url.clone(),
                        source,
                    })
                }
                Err(_) => return Err(GatewayError::HandshakeTimeout(self.handshake_timeout)),
            };

        let device_id = {
            let mut slot = self.session_device.lock().await;
            match *slot {
                // Resume re-presents the registration the previous session
                // started.
                Some(id) if resume_existing => id,
                _ => {
                    let id = Uuid::new_v4();
                    *slot = Some(id);
                    id
                }
            }
        };

        let hello = AgentToGatewayMsg::Hello {
            device_id,
            resume: resume_existing,
        };
        let frame = serde_json::to_string(&hello)?;
        ws.send(WsMessage::Text(frame))
            .await
            .map_err(GatewayError::Hello)?;

        debug!("gateway session open (device {device_id}, resume={resume_existing})");
        Ok((ws, device_id))
    }
}

#[async_trait]
impl Transport for WsGateway {
    async fn open_session(
        &self,
        resume_existing: bool,
        verbose: bool,
        linking_code_tx: Option<oneshot::Sender<String>>,
    ) -> Result<Arc<dyn TransportHandle>, String> {
        let (ws, device_id) = self
            .dial(resume_existing)
            .await
            .map_err(|e| e.to_string())?;

        let (sink, source) = ws.split();
        let (verdict_tx, verdict_rx) = oneshot::channel();

        let credentials = Arc::clone(&self.credentials);
        let reader = tokio::spawn(async move {
            let verdict =
                pump_gateway(source, linking_code_tx, &credentials, device_id, verbose).await;
            // The receiver is gone when the handle was closed first; the
            // verdict is moot then.
            let _ = verdict_tx.send(verdict);
        });

        Ok(Arc::new(WsSessionHandle {
            verdict_rx: Mutex::new(Some(verdict_rx)),
            sink: Mutex::new(Some(sink)),
            reader,
        }))
    }
}

/// One open gateway session, handed to the login attempt.
pub struct WsSessionHandle {
    /// Taken by the first `ready()` call.
    verdict_rx: Mutex<Option<oneshot::Receiver<Result<(), TransportFailure>>>>,
    /// Taken by the first `close()` call to send the close frame.
    sink: Mutex<Option<WsSink>>,
    reader: JoinHandle<()>,
}

#[async_trait]
impl TransportHandle for WsSessionHandle {
    async fn ready(&self) -> Result<(), TransportFailure> {
        let rx = self.verdict_rx.lock().await.take();
        match rx {
            Some(rx) => rx
                .await
                .unwrap_or_else(|_| Err(TransportFailure::new(None, "gateway session closed"))),
            // The verdict was already consumed. A second caller parks
            // instead of inventing a new one.
            None => std::future::pending().await,
        }
    }

    async fn close(&self) {
        if let Some(mut sink) = self.sink.lock().await.take() {
            // Best effort: the socket may already be gone.
            let _ = sink.send(WsMessage::Close(None)).await;
        }
        self.reader.abort();
    }
}

/// What the reader does after routing one gateway frame.
enum Routed {
    /// Keep reading; no verdict yet.
    Continue,
    /// The session reached its verdict; the reader stops.
    Settled(Result<(), TransportFailure>),
}

/// Routes one WebSocket frame from the gateway.
///
/// Text frames carry [`GatewayToAgentMsg`] JSON; everything else is protocol
/// plumbing. Unparseable frames are logged and skipped rather than failing
/// the session, so a gateway that grows new event types does not break older
/// agents mid-login.
fn route_frame(
    frame: WsMessage,
    code_tx: &mut Option<oneshot::Sender<String>>,
    credentials: &FileCredentialStore,
    device_id: Uuid,
    verbose: bool,
) -> Routed {
    match frame {
        WsMessage::Text(text) => {
            if verbose {
                debug!("gateway frame: {text}");
            }
            let event: GatewayToAgentMsg = match serde_json::from_str(&text) {
                Ok(event) => event,
                Err(e) => {
                    warn!("discarding unparseable gateway frame: {e}");
                    return Routed::Continue;
                }
            };
            match event {
                GatewayToAgentMsg::Qr { code } => {
                    match code_tx.take() {
                        Some(tx) => {
                            // The receiver may have timed out already; that
                            // is the caller's business, not ours.
                            let _ = tx.send(code);
                        }
                        // Rotated codes after the first have no consumer.
                        None => debug!("ignoring rotated linking code"),
                    }
                    Routed::Continue
                }
                GatewayToAgentMsg::PairSuccess { device } => {
                    let record = CredentialRecord {
                        device_id,
                        display_id: device,
                    };
                    if let Err(e) = credentials.save(&record) {
                        warn!("could not persist link credentials: {e}");
                    }
                    Routed::Settled(Ok(()))
                }
                GatewayToAgentMsg::StreamError { status, message } => {
                    let text = message.unwrap_or_else(|| match status {
                        Some(code) => format!("stream error (status {code})"),
                        None => "stream error".to_string(),
                    });
                    Routed::Settled(Err(TransportFailure::new(status, text)))
                }
            }
        }
        WsMessage::Close(_) => Routed::Settled(Err(TransportFailure::new(
            None,
            "gateway closed the connection",
        ))),
        // tungstenite answers pings on its own; nothing to route.
        WsMessage::Ping(_) | WsMessage::Pong(_) => Routed::Continue,
        WsMessage::Binary(_) => {
            warn!("ignoring unexpected binary frame from gateway");
            Routed::Continue
        }
        WsMessage::Frame(_) => Routed::Continue,
    }
}

/// Pumps gateway frames until the session settles.
///
/// Returns the session verdict: `Ok(())` after a pair-success frame, or the
/// mapped failure. A transport error or end-of-stream without a verdict maps
/// to a failure with no status code.
async fn pump_gateway(
    mut source: WsSource,
    mut code_tx: Option<oneshot::Sender<String>>,
    credentials: &FileCredentialStore,
    device_id: Uuid,
    verbose: bool,
) -> Result<(), TransportFailure> {
    while let Some(frame) = source.next().await {
        let frame = match frame {
            Ok(frame) => frame,
            Err(e) => {
                return Err(TransportFailure::new(
                    None,
                    format!("gateway connection error: {e}"),
                ))
            }
        };
        if let Routed::Settled(verdict) =
            route_frame(frame, &mut code_tx, credentials, device_id, verbose)
        {
            return verdict;
        }
    }
    Err(TransportFailure::new(
        None,
        "gateway connection closed before the link settled",
    ))
}

// ── Tests ─────────────────────────────────────────────────────────────────────

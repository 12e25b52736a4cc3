//! Integration tests for the WebSocket gateway adapter.
//!
//! Purpose: exercise `WsGateway` against a real WebSocket server instead of
//! routing frames by hand. Each test spins up a scripted gateway on a
//! loopback port, lets the adapter dial it, and checks the verdict the
//! session handle reports plus the side effects on the credential store.
//!
//! ```text
//! ┌────────────┐  ws://127.0.0.1:PORT/link  ┌──────────────────┐
//! │  WsGateway │ ─────────────────────────► │ scripted gateway │
//! │ (under     │  hello {device_id,resume}  │ (accept_async,   │
//! │  test)     │ ◄───────────────────────── │  replays frames, │
//! └────────────┘  qr / pair-success / ...   │  then hangs up)  │
//!                                           └──────────────────┘
//! ```
//!
//! The scripted gateway reads the hello frame, reports it back to the test
//! through a channel, replays its scripted frames in order, and drops the
//! socket. That mirrors the real gateway closely enough to cover the happy
//! path, the error verdicts, and the resume handshake.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message;
use uuid::Uuid;

use pairlink_agent::domain::messages::{AgentToGatewayMsg, GatewayToAgentMsg};
use pairlink_agent::infrastructure::storage::credentials::FileCredentialStore;
use pairlink_agent::infrastructure::WsGateway;
use pairlink_core::{Transport, TransportHandle};

/// Generous budget for the connect plus upgrade in tests.
const TEST_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// Starts a scripted gateway on a loopback port.
///
/// The script holds one frame list per expected connection. For each
/// connection the server completes the WebSocket upgrade, reads the hello
/// frame and forwards it through the returned channel, replays the scripted
/// frames, and drops the socket.
async fn spawn_scripted_gateway(
    script: Vec<Vec<GatewayToAgentMsg>>,
) -> (String, mpsc::UnboundedReceiver<AgentToGatewayMsg>) {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind scripted gateway");
    let url = format!("ws://{}/link", listener.local_addr().expect("local addr"));
    let (hello_tx, hello_rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        for frames in script {
            let (stream, _) = listener.accept().await.expect("accept connection");
            let mut ws = tokio_tungstenite::accept_async(stream)
                .await
                .expect("websocket upgrade");

            let hello = match ws.next().await {
                Some(Ok(Message::Text(text))) => {
                    serde_json::from_str::<AgentToGatewayMsg>(&text).expect("hello frame decodes")
                }
                other => panic!("expected a hello text frame, got {other:?}"),
            };
            hello_tx.send(hello).expect("report hello to the test");

            for frame in frames {
                let text = serde_json::to_string(&frame).expect("encode scripted frame");
                ws.send(Message::Text(text)).await.expect("send scripted frame");
            }
            // Dropping the socket ends the session without a close frame,
            // which is how the real gateway behaves on stream errors too.
        }
    });

    (url, hello_rx)
}

/// Credential store over a unique temp path, so tests cannot see each
/// other's files.
fn temp_credentials() -> (Arc<FileCredentialStore>, PathBuf) {
    let dir = std::env::temp_dir().join(format!("pairlink_session_{}", Uuid::new_v4()));
    let store = Arc::new(FileCredentialStore::new(dir.join("creds.json")));
    (store, dir)
}

/// Happy path: the gateway issues a code, the user scans it, and the session
/// settles connected. The linking code must come through the oneshot channel
/// and the credential record must be on disk by the time `ready()` returns.
#[tokio::test]
async fn test_session_delivers_code_and_persists_credentials() {
    // Arrange
    let (url, mut hello_rx) = spawn_scripted_gateway(vec![vec![
        GatewayToAgentMsg::Qr {
            code: "2@alpha,beta".to_string(),
        },
        GatewayToAgentMsg::PairSuccess {
            device: "+15550001111".to_string(),
        },
    ]])
    .await;
    let (store, dir) = temp_credentials();
    let gateway = WsGateway::new(url, TEST_HANDSHAKE_TIMEOUT, Arc::clone(&store));

    // Act
    let (code_tx, code_rx) = oneshot::channel();
    let handle = gateway
        .open_session(false, false, Some(code_tx))
        .await
        .expect("session opens");

    // Assert
    let hello = hello_rx.recv().await.expect("hello observed");
    assert!(
        matches!(hello, AgentToGatewayMsg::Hello { resume: false, .. }),
        "a fresh session must not ask to resume"
    );
    assert_eq!(code_rx.await.expect("linking code"), "2@alpha,beta");
    handle.ready().await.expect("session settles connected");

    let record = store.load().expect("read store").expect("record present");
    assert_eq!(record.display_id, "+15550001111");
    std::fs::remove_dir_all(&dir).ok();
}

/// A stream-error frame must surface as a failed verdict that keeps the
/// gateway's status code, so the caller can tell restart-required apart from
/// logged-out.
#[tokio::test]
async fn test_stream_error_verdict_carries_status_and_message() {
    let (url, _hello_rx) = spawn_scripted_gateway(vec![vec![GatewayToAgentMsg::StreamError {
        status: Some(515),
        message: Some("restart required".to_string()),
    }]])
    .await;
    let (store, dir) = temp_credentials();
    let gateway = WsGateway::new(url, TEST_HANDSHAKE_TIMEOUT, Arc::clone(&store));

    let handle = gateway
        .open_session(false, false, None)
        .await
        .expect("session opens");
    let failure = handle
        .ready()
        .await
        .expect_err("stream error must fail the session");

    assert_eq!(failure.status, Some(515));
    assert!(failure.is_restart_required());
    assert_eq!(failure.message, "restart required");
    assert!(
        store.load().expect("read store").is_none(),
        "a failed session must not write credentials"
    );
    std::fs::remove_dir_all(&dir).ok();
}

/// A gateway that hangs up before any verdict maps to a statusless failure,
/// not a panic or a hang.
#[tokio::test]
async fn test_disconnect_without_verdict_maps_to_statusless_failure() {
    let (url, _hello_rx) = spawn_scripted_gateway(vec![vec![GatewayToAgentMsg::Qr {
        code: "2@orphan".to_string(),
    }]])
    .await;
    let (store, dir) = temp_credentials();
    let gateway = WsGateway::new(url, TEST_HANDSHAKE_TIMEOUT, Arc::clone(&store));

    let (code_tx, code_rx) = oneshot::channel();
    let handle = gateway
        .open_session(false, false, Some(code_tx))
        .await
        .expect("session opens");

    // The code still arrives; the hangup only affects the verdict.
    assert_eq!(code_rx.await.expect("linking code"), "2@orphan");
    let failure = handle
        .ready()
        .await
        .expect_err("hangup must fail the session");

    assert_eq!(failure.status, None);
    assert!(
        failure.message.contains("gateway connection"),
        "unexpected message: {}",
        failure.message
    );
    std::fs::remove_dir_all(&dir).ok();
}

/// The restart-required recovery path reopens the session with
/// `resume_existing = true`. The second hello must present the same device
/// id the first session registered, with the resume flag set.
#[tokio::test]
async fn test_resume_presents_the_same_device_id() {
    // Arrange: two connections, neither of which settles.
    let (url, mut hello_rx) = spawn_scripted_gateway(vec![Vec::new(), Vec::new()]).await;
    let (store, dir) = temp_credentials();
    let gateway = WsGateway::new(url, TEST_HANDSHAKE_TIMEOUT, Arc::clone(&store));

    // Act: first session registers, second session resumes.
    let first = gateway
        .open_session(false, false, None)
        .await
        .expect("first session opens");
    let AgentToGatewayMsg::Hello {
        device_id: first_id,
        resume: first_resume,
    } = hello_rx.recv().await.expect("first hello");
    first.close().await;

    let _second = gateway
        .open_session(true, false, None)
        .await
        .expect("second session opens");
    let AgentToGatewayMsg::Hello {
        device_id: second_id,
        resume: second_resume,
    } = hello_rx.recv().await.expect("second hello");

    // Assert
    assert!(!first_resume);
    assert!(second_resume, "the reopened session must ask to resume");
    assert_eq!(second_id, first_id, "resume must reuse the registration");
    std::fs::remove_dir_all(&dir).ok();
}

/// Nothing listening on the port: `open_session` must come back with an
/// error string that names the gateway, not hang or panic.
#[tokio::test]
async fn test_unreachable_gateway_reports_connect_error() {
    // Grab a port that nothing listens on by binding and dropping.
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let url = format!("ws://{}/link", listener.local_addr().expect("local addr"));
    drop(listener);

    let (store, dir) = temp_credentials();
    let gateway = WsGateway::new(url, TEST_HANDSHAKE_TIMEOUT, store);

    let error = gateway
        .open_session(false, false, None)
        .await
        .err()
        .expect("connect must fail");

    assert!(
        error.contains("could not reach the link gateway"),
        "unexpected error: {error}"
    );
    std::fs::remove_dir_all(&dir).ok();
}

/// A gateway that accepts TCP but never answers the upgrade must trip the
/// handshake timeout instead of stalling the login forever.
#[tokio::test]
async fn test_silent_gateway_trips_the_handshake_timeout() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let url = format!("ws://{}/link", listener.local_addr().expect("local addr"));
    tokio::spawn(async move {
        // Accept and hold the socket without speaking WebSocket.
        let _held = listener.accept().await.expect("accept connection");
        std::future::pending::<()>().await;
    });

    let (store, dir) = temp_credentials();
    let gateway = WsGateway::new(url, Duration::from_millis(200), store);

    let error = gateway
        .open_session(false, false, None)
        .await
        .err()
        .expect("handshake must time out");

    assert!(
        error.contains("handshake timed out"),
        "unexpected error: {error}"
    );
    std::fs::remove_dir_all(&dir).ok();
}

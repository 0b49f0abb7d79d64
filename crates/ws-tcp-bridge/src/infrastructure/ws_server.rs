//! WebSocket server: accept loop and per-session lifecycle.
//!
//! This module is responsible for:
//!
//! 1. Binding a TCP listener on the configured address.
//! 2. Accepting incoming TCP connections.
//! 3. Upgrading each connection to a WebSocket session (any request path).
//! 4. Dialing the backend TCP service once per session.
//! 5. Handing both streams to the relay and waiting for it to finish.
//! 6. Stopping the accept loop when the `running` flag is cleared.
//!
//! Each session runs in its own Tokio task and owns its two streams outright,
//! so sessions share nothing and one misbehaving peer cannot affect another.
//! A session failure is logged inside its task and never reaches the accept
//! loop.  The only error [`run_server`] returns is a failure to bind.

use std::net::SocketAddr;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::Context;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tracing::{debug, error, info, warn};

use crate::application::relay::{self, RelayReport};
use crate::domain::{BridgeConfig, SessionError, SessionId, SessionState, UpgradeError};
use crate::infrastructure::backend_conn;
use crate::infrastructure::ws_stream::WsByteStream;

/// How often the accept loop wakes up to check the shutdown flag.
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(200);

// ── Public API ────────────────────────────────────────────────────────────────

/// Binds `config.listen_addr` and runs the accept loop until `running` is set
/// to `false`.
///
/// # Errors
///
/// Returns an error if the listener cannot be bound (port in use, missing
/// permission, unresolvable host).  This is the only process-fatal error.
pub async fn run_server(config: BridgeConfig, running: Arc<AtomicBool>) -> anyhow::Result<()> {
    let listener = bind(&config.listen_addr).await?;
    serve(listener, Arc::new(config), running).await
}

/// Binds the WebSocket listener.
///
/// # Errors
///
/// Returns an error naming the address if the bind fails.
pub async fn bind(listen_addr: &str) -> anyhow::Result<TcpListener> {
    TcpListener::bind(listen_addr)
        .await
        .with_context(|| format!("failed to bind WebSocket listener on {listen_addr}"))
}

/// Runs the accept loop on an already-bound listener.
///
/// Split out from [`run_server`] so tests can bind port 0 and learn the real
/// address before serving.
pub async fn serve(
    listener: TcpListener,
    config: Arc<BridgeConfig>,
    running: Arc<AtomicBool>,
) -> anyhow::Result<()> {
    let local_addr = listener
        .local_addr()
        .context("failed to read listener address")?;
    info!(
        listen_addr = %local_addr,
        backend_addr = %config.backend_addr,
        "WebSocket bridge listening"
    );

    loop {
        if !running.load(Ordering::Relaxed) {
            info!("shutdown flag set; stopping accept loop");
            break;
        }

        // Bounded accept so the loop notices the shutdown flag even when no
        // clients are connecting.
        match timeout(ACCEPT_POLL_INTERVAL, listener.accept()).await {
            Ok(Ok((stream, peer_addr))) => {
                let cfg = Arc::clone(&config);
                tokio::spawn(async move {
                    handle_connection(stream, peer_addr, cfg).await;
                });
            }
            Ok(Err(e)) => {
                // Transient (e.g. out of file descriptors); keep serving.
                error!("accept error: {e}");
            }
            Err(_) => {}
        }
    }

    Ok(())
}

// ── Per-session handler ───────────────────────────────────────────────────────

/// Entry point of each per-session task: assigns the correlation id, runs the
/// session and logs how it ended.
async fn handle_connection(stream: TcpStream, peer_addr: SocketAddr, config: Arc<BridgeConfig>) {
    let session_id = SessionId::new();
    info!(session_id = %session_id, peer_addr = %peer_addr, "session started");

    match run_session(session_id, stream, &config).await {
        Ok(report) => info!(
            session_id = %session_id,
            state = %SessionState::Closed,
            client_to_backend = report.client_to_backend,
            backend_to_client = report.backend_to_client,
            error = report.first_error.as_ref().map(tracing::field::display),
            "session ended"
        ),
        Err(SessionError::Upgrade(e)) => warn!(
            session_id = %session_id,
            state = %SessionState::Closed,
            error = %e,
            "websocket upgrade failed"
        ),
        Err(SessionError::Connect(e)) => warn!(
            session_id = %session_id,
            state = %SessionState::Closed,
            backend_addr = %e.addr,
            error = %e.source,
            "backend dial failed"
        ),
    }
}

/// Runs one session through `Upgrading → Dialing → Bridging` and returns the
/// relay's report.
///
/// Every stream created here is owned by a local or moved into the relay, so
/// it is closed on every exit path, including an early `?` return.
///
/// # Errors
///
/// - [`SessionError::Upgrade`] if the client stays idle, the handshake times
///   out, or the request is not a valid WebSocket upgrade.  No dial happens.
/// - [`SessionError::Connect`] if the backend cannot be reached.  The
///   upgraded stream is dropped, which closes the client connection.
pub(crate) async fn run_session(
    session_id: SessionId,
    stream: TcpStream,
    config: &BridgeConfig,
) -> Result<RelayReport, SessionError> {
    let mut state = SessionState::Upgrading;

    if let Err(e) = stream.set_nodelay(true) {
        debug!(session_id = %session_id, "failed to set TCP_NODELAY on client connection: {e}");
    }

    // ── Upgrading ─────────────────────────────────────────────────────────────
    match timeout(config.idle_timeout, stream.readable()).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => return Err(UpgradeError::Io(e).into()),
        Err(_) => return Err(UpgradeError::Idle.into()),
    }

    let log_request = move |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
        info!(
            session_id = %session_id,
            method = %req.method(),
            uri = %req.uri(),
            protocol = ?req.version(),
            headers = ?req.headers(),
            "upgrade request"
        );
        Ok(resp)
    };
    let ws = match timeout(config.read_timeout, accept_hdr_async(stream, log_request)).await {
        Ok(Ok(ws)) => ws,
        Ok(Err(e)) => return Err(UpgradeError::Handshake(e).into()),
        Err(_) => return Err(UpgradeError::TimedOut.into()),
    };

    // ── Dialing ───────────────────────────────────────────────────────────────
    transition(session_id, &mut state, SessionState::Dialing);
    let backend = backend_conn::connect(&config.backend_addr, config.dial_timeout).await?;
    debug!(
        session_id = %session_id,
        backend_addr = %config.backend_addr,
        "connected to backend"
    );

    // ── Bridging ──────────────────────────────────────────────────────────────
    transition(session_id, &mut state, SessionState::Bridging);
    let report = relay::run(
        session_id,
        WsByteStream::new(ws),
        backend,
        config.write_timeout,
    )
    .await;
    transition(session_id, &mut state, SessionState::Closed);

    Ok(report)
}

fn transition(session_id: SessionId, state: &mut SessionState, next: SessionState) {
    debug_assert!(
        state.can_transition_to(next),
        "illegal session transition {state} -> {next}"
    );
    let from = *state;
    debug!(session_id = %session_id, from = %from, to = %next, "session state");
    *state = next;
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    const TEST_LIMIT: Duration = Duration::from_secs(5);

    /// Returns (accepted server-side stream, connected client-side stream).
    async fn tcp_pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (client, accepted) = tokio::join!(TcpStream::connect(addr), listener.accept());
        (accepted.unwrap().0, client.unwrap())
    }

    async fn closed_port() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_silent_client_hits_idle_timeout() {
        let (server_side, _client) = tcp_pair().await;
        let config = BridgeConfig {
            idle_timeout: Duration::from_millis(100),
            ..BridgeConfig::default()
        };

        let result = timeout(TEST_LIMIT, run_session(SessionId::new(), server_side, &config))
            .await
            .unwrap();

        assert!(matches!(result, Err(SessionError::Upgrade(UpgradeError::Idle))));
    }

    #[tokio::test]
    async fn test_incomplete_request_hits_read_timeout() {
        let (server_side, mut client) = tcp_pair().await;
        let config = BridgeConfig {
            read_timeout: Duration::from_millis(100),
            ..BridgeConfig::default()
        };

        // Start a request but never finish the header block.
        client.write_all(b"GET / HTTP/1.1\r\nHost: x\r\n").await.unwrap();

        let result = timeout(TEST_LIMIT, run_session(SessionId::new(), server_side, &config))
            .await
            .unwrap();

        assert!(matches!(result, Err(SessionError::Upgrade(UpgradeError::TimedOut))));
    }

    #[tokio::test]
    async fn test_plain_http_request_is_rejected_without_dialing() {
        let (server_side, mut client) = tcp_pair().await;
        // Point at a closed port: if a dial were attempted the error would be
        // Connect, not Upgrade.
        let config = BridgeConfig {
            backend_addr: closed_port().await,
            ..BridgeConfig::default()
        };

        client
            .write_all(b"GET /status HTTP/1.1\r\nHost: x\r\n\r\n")
            .await
            .unwrap();

        let result = timeout(TEST_LIMIT, run_session(SessionId::new(), server_side, &config))
            .await
            .unwrap();

        assert!(matches!(result, Err(SessionError::Upgrade(UpgradeError::Handshake(_)))));

        // The client connection is closed once the session gives up.
        let mut rest = Vec::new();
        timeout(TEST_LIMIT, client.read_to_end(&mut rest))
            .await
            .expect("client connection must be closed");
    }

    #[tokio::test]
    async fn test_refused_backend_yields_connect_error() {
        let (server_side, client) = tcp_pair().await;
        let backend_addr = closed_port().await;
        let config = BridgeConfig {
            backend_addr: backend_addr.clone(),
            ..BridgeConfig::default()
        };

        let (result, handshake) = timeout(TEST_LIMIT, async {
            tokio::join!(
                run_session(SessionId::new(), server_side, &config),
                tokio_tungstenite::client_async("ws://bridge.test/", client),
            )
        })
        .await
        .unwrap();

        // The upgrade itself succeeds; only the dial fails.
        let (mut ws, _) = handshake.expect("upgrade must complete before the dial");
        match result {
            Err(SessionError::Connect(e)) => {
                assert_eq!(e.addr, backend_addr);
                assert_eq!(e.source.kind(), std::io::ErrorKind::ConnectionRefused);
            }
            other => panic!("expected connect error, got {other:?}"),
        }

        // The upgraded client connection is dropped without relaying anything.
        use futures_util::StreamExt;
        let next = timeout(TEST_LIMIT, ws.next())
            .await
            .expect("client connection must be closed");
        assert!(!matches!(next, Some(Ok(tokio_tungstenite::tungstenite::Message::Binary(_)))));
    }

    #[test]
    #[should_panic(expected = "illegal session transition")]
    #[cfg(debug_assertions)]
    fn test_illegal_transition_is_caught_in_debug_builds() {
        let mut state = SessionState::Upgrading;
        transition(SessionId::new(), &mut state, SessionState::Bridging);
    }
}

//! TCP connection to the backend service.
//!
//! Each WebSocket session gets its own TCP connection to the backend.  The
//! backend sees the bridge as an ordinary TCP client.
//!
//! A dial is attempted exactly once.  Whether a failed session should ever be
//! retried is the client's decision, not the bridge's.

use std::future::Future;
use std::io;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

use crate::domain::ConnectError;

/// Opens a TCP connection to `addr` (`host:port`), giving up after
/// `dial_timeout`.
///
/// DNS resolution counts against the timeout.  When the hostname resolves to
/// several addresses they are tried in order, as `TcpStream::connect` does.
///
/// # Errors
///
/// Returns [`ConnectError`] if resolution fails, every address refuses or is
/// unreachable, or the timeout elapses first.  In the timeout case the source
/// error has kind [`io::ErrorKind::TimedOut`].  No socket is left open on
/// failure: dropping the pending connect closes any half-open attempt.
///
/// # Example
///
/// ```no_run
/// use std::time::Duration;
/// use ws_tcp_bridge::infrastructure::backend_conn::connect;
///
/// # async fn example() -> Result<(), ws_tcp_bridge::domain::ConnectError> {
/// let stream = connect("127.0.0.1:31415", Duration::from_secs(2)).await?;
/// # Ok(())
/// # }
/// ```
pub async fn connect(addr: &str, dial_timeout: Duration) -> Result<TcpStream, ConnectError> {
    connect_with(addr, dial_timeout, TcpStream::connect(addr)).await
}

/// Runs `dial` under `dial_timeout` and maps the outcome onto [`ConnectError`].
async fn connect_with<F>(addr: &str, dial_timeout: Duration, dial: F) -> Result<TcpStream, ConnectError>
where
    F: Future<Output = io::Result<TcpStream>>,
{
    let stream = match timeout(dial_timeout, dial).await {
        Ok(Ok(stream)) => stream,
        Ok(Err(source)) => {
            return Err(ConnectError {
                addr: addr.to_string(),
                source,
            })
        }
        Err(_) => {
            return Err(ConnectError {
                addr: addr.to_string(),
                source: io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("dial timed out after {dial_timeout:?}"),
                ),
            })
        }
    };

    // Relayed traffic is often small interactive writes; do not hold them
    // back waiting for an ACK.
    if let Err(e) = stream.set_nodelay(true) {
        debug!("failed to set TCP_NODELAY on backend connection to {addr}: {e}");
    }

    Ok(stream)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

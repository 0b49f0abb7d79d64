//! Error types for a bridge session.
//!
//! All of these are per-session failures.  None of them is ever allowed to
//! reach the accept loop: the session task logs them and ends.

use std::io;

use thiserror::Error;

/// The backend TCP service could not be reached.
///
/// Timeouts, DNS failures, refused and unreachable connections all map to
/// this one kind; the underlying cause is kept as the error source.  A dial
/// that ran out of time carries an [`io::ErrorKind::TimedOut`] source.
#[derive(Debug, Error)]
#[error("failed to connect to backend at {addr}")]
pub struct ConnectError {
    /// The `host:port` that was dialed.
    pub addr: String,
    #[source]
    pub source: io::Error,
}

impl ConnectError {
    /// Returns `true` if the dial was aborted by the dial timeout.
    pub fn is_timeout(&self) -> bool {
        self.source.kind() == io::ErrorKind::TimedOut
    }
}

/// Why the client's upgrade request could not be turned into a WebSocket.
#[derive(Debug, Error)]
pub enum UpgradeError {
    /// The connection sent nothing within the idle timeout.
    #[error("client sent no request within the idle timeout")]
    Idle,

    /// The handshake did not complete within the read timeout.
    #[error("handshake did not complete within the read timeout")]
    TimedOut,

    /// The request was not a valid WebSocket upgrade, or the socket failed
    /// mid-handshake.
    #[error("websocket handshake failed: {0}")]
    Handshake(#[from] tokio_tungstenite::tungstenite::Error),

    /// The socket failed while waiting for the request to start.
    #[error("socket error before handshake: {0}")]
    Io(#[from] io::Error),
}

/// Terminal failure of a session, one variant per failure stage.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The upgrade failed; no backend dial was attempted.
    #[error(transparent)]
    Upgrade(#[from] UpgradeError),

    /// The backend dial failed; the upgraded stream was closed.
    #[error(transparent)]
    Connect(#[from] ConnectError),
}

// ── Tests ─────────────────────────────────────────────────────────────────────

//! Full-duplex byte relay between two streams.
//!
//! [`run`] splits both streams into read/write halves and spawns two copy
//! tasks:
//!
//! ```text
//!   client ──read──► [client_to_backend task] ──write──► backend
//!   client ◄─write── [backend_to_client task] ◄──read─── backend
//! ```
//!
//! Each task copies until its reader reports EOF or an I/O error.  When
//! either task ends it raises a shared [`CloseSignal`] and shuts down its own
//! write side.  The sibling observes the signal, abandons whatever read or
//! write it is suspended on, and shuts down its write side too.  Once both
//! tasks have returned every half has been dropped, so both streams are
//! closed.
//!
//! This is what prevents the half-open hang a proxy must avoid: a client that
//! vanishes while the backend is silent would otherwise leave the
//! backend→client task blocked on `read()` forever.
//!
//! The relay imposes no timeout on an established session.  The only bounded
//! operation is the write-side shutdown at teardown.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::debug;

use crate::domain::{Direction, SessionId};

/// Size of the per-direction copy buffer.
pub const COPY_BUFFER_SIZE: usize = 32 * 1024;

/// Outcome of a finished relay.
#[derive(Debug, Default)]
pub struct RelayReport {
    /// Bytes read from the client and fully written to the backend.
    pub client_to_backend: u64,
    /// Bytes read from the backend and fully written to the client.
    pub backend_to_client: u64,
    /// The first I/O error observed by either direction, if any.
    ///
    /// A clean EOF is not an error, and neither is a direction being torn
    /// down because its sibling finished.
    pub first_error: Option<io::Error>,
}

/// Shared "tear the session down" signal.
///
/// Closing is idempotent and may be called concurrently from both copy
/// tasks; every call after the first is a no-op.
#[derive(Debug, Clone)]
pub struct CloseSignal {
    tx: Arc<watch::Sender<bool>>,
}

impl CloseSignal {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Raises the signal.  Never blocks.
    pub fn close(&self) {
        self.tx.send_replace(true);
    }

    /// Returns `true` once [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        *self.tx.borrow()
    }

    /// Completes once the signal has been raised (immediately if it already
    /// was).
    pub async fn closed(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives as long as `self`, so this cannot fail.
        let _ = rx.wait_for(|closed| *closed).await;
    }

    /// Returns a guard that raises the signal when dropped.
    ///
    /// Held by each copy task so that a panic inside the task still releases
    /// the sibling.
    fn guard(&self) -> CloseGuard {
        CloseGuard(self.clone())
    }
}

impl Default for CloseSignal {
    fn default() -> Self {
        Self::new()
    }
}

struct CloseGuard(CloseSignal);

impl Drop for CloseGuard {
    fn drop(&mut self) {
        self.0.close();
    }
}

/// Result of one copy direction.
#[derive(Debug)]
struct DirectionOutcome {
    direction: Direction,
    copied: u64,
    error: Option<io::Error>,
}

/// Relays bytes between `client` and `backend` until both directions have
/// finished, then returns the byte counts and the first error.
///
/// Both streams are owned by the relay and are closed when it returns.
/// `shutdown_timeout` bounds each direction's write-side shutdown during
/// teardown so that a peer that stopped reading cannot stall it.
pub async fn run<C, B>(
    session_id: SessionId,
    client: C,
    backend: B,
    shutdown_timeout: Duration,
) -> RelayReport
where
    C: AsyncRead + AsyncWrite + Send + 'static,
    B: AsyncRead + AsyncWrite + Send + 'static,
{
    let (client_read, client_write) = tokio::io::split(client);
    let (backend_read, backend_write) = tokio::io::split(backend);
    let close = CloseSignal::new();

    let mut client_to_backend = spawn_direction(
        session_id,
        Direction::ClientToBackend,
        client_read,
        backend_write,
        close.clone(),
        shutdown_timeout,
    );
    let mut backend_to_client = spawn_direction(
        session_id,
        Direction::BackendToClient,
        backend_read,
        client_write,
        close,
        shutdown_timeout,
    );

    // Whichever direction finishes first carries the error that caused the
    // teardown, so it is consulted first.
    let (first, second) = tokio::select! {
        done = &mut client_to_backend => (
            join_outcome(done, Direction::ClientToBackend),
            join_outcome(backend_to_client.await, Direction::BackendToClient),
        ),
        done = &mut backend_to_client => (
            join_outcome(done, Direction::BackendToClient),
            join_outcome(client_to_backend.await, Direction::ClientToBackend),
        ),
    };

    let mut report = RelayReport::default();
    for outcome in [first, second] {
        match outcome.direction {
            Direction::ClientToBackend => report.client_to_backend = outcome.copied,
            Direction::BackendToClient => report.backend_to_client = outcome.copied,
        }
        if report.first_error.is_none() {
            report.first_error = outcome.error;
        }
    }
    report
}

fn spawn_direction<R, W>(
    session_id: SessionId,
    direction: Direction,
    reader: R,
    writer: W,
    close: CloseSignal,
    shutdown_timeout: Duration,
) -> JoinHandle<DirectionOutcome>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let _guard = close.guard();
        let (copied, error) = copy_until_closed(reader, writer, &close, shutdown_timeout).await;

        debug!(
            session_id = %session_id,
            direction = %direction,
            bytes = copied,
            error = error.as_ref().map(tracing::field::display),
            "copy finished"
        );

        DirectionOutcome {
            direction,
            copied,
            error,
        }
    })
}

/// A copy task that panicked or was cancelled still counts as a finished
/// direction; its byte count is lost.
fn join_outcome(
    joined: Result<DirectionOutcome, tokio::task::JoinError>,
    direction: Direction,
) -> DirectionOutcome {
    joined.unwrap_or_else(|e| DirectionOutcome {
        direction,
        copied: 0,
        error: Some(io::Error::other(format!("copy task failed: {e}"))),
    })
}

/// Copies `reader` into `writer` until EOF, an I/O error, or `close` is
/// raised by the sibling direction.
///
/// Always raises `close` and shuts down `writer` before returning.
async fn copy_until_closed<R, W>(
    mut reader: R,
    mut writer: W,
    close: &CloseSignal,
    shutdown_timeout: Duration,
) -> (u64, Option<io::Error>)
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; COPY_BUFFER_SIZE];
    let mut copied: u64 = 0;

    let result: io::Result<()> = loop {
        let n = tokio::select! {
            biased;
            _ = close.closed() => break Ok(()),
            read = reader.read(&mut buf) => match read {
                Ok(0) => break Ok(()),
                Ok(n) => n,
                Err(e) => break Err(e),
            },
        };

        let write = async {
            writer.write_all(&buf[..n]).await?;
            writer.flush().await
        };
        tokio::select! {
            biased;
            _ = close.closed() => break Ok(()),
            written = write => {
                if let Err(e) = written {
                    break Err(e);
                }
            }
        }
        copied += n as u64;
    };

    close.close();
    shutdown_quietly(&mut writer, shutdown_timeout).await;

    (copied, result.err())
}

/// Shuts down a write half, ignoring errors.
///
/// The peer may already be gone, in which case shutdown fails with
/// `NotConnected` or similar; at teardown that is expected.
async fn shutdown_quietly<W: AsyncWrite + Unpin>(writer: &mut W, limit: Duration) {
    match timeout(limit, writer.shutdown()).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => debug!("write-side shutdown failed: {e}"),
        Err(_) => debug!("write-side shutdown timed out after {limit:?}"),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use tokio::io::{duplex, ReadBuf};

    const TEST_LIMIT: Duration = Duration::from_secs(5);
    const SHUTDOWN: Duration = Duration::from_secs(1);

    /// A stream whose reads fail with `ConnectionReset` and whose writes are
    /// swallowed.
    struct ResetStream;

    impl AsyncRead for ResetStream {
        fn poll_read(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            Poll::Ready(Err(io::Error::from(io::ErrorKind::ConnectionReset)))
        }
    }

    impl AsyncWrite for ResetStream {
        fn poll_write(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &[u8],
        ) -> Poll<io::Result<usize>> {
            Poll::Ready(Ok(buf.len()))
        }
        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn test_bytes_flow_both_ways_and_are_counted() {
        // Arrange: two in-memory pipes; the relay owns the near ends.
        let (client_near, mut client_far) = duplex(1024);
        let (backend_near, mut backend_far) = duplex(1024);
        let relay = tokio::spawn(run(SessionId::new(), client_near, backend_near, SHUTDOWN));

        // Act: client → backend
        client_far.write_all(b"hello backend").await.unwrap();
        let mut got = [0u8; 13];
        backend_far.read_exact(&mut got).await.unwrap();
        assert_eq!(&got, b"hello backend");

        // backend → client
        backend_far.write_all(b"hi").await.unwrap();
        let mut got = [0u8; 2];
        client_far.read_exact(&mut got).await.unwrap();
        assert_eq!(&got, b"hi");

        // Client hangs up.
        drop(client_far);
        let report = timeout(TEST_LIMIT, relay).await.unwrap().unwrap();

        // Assert
        assert_eq!(report.client_to_backend, 13);
        assert_eq!(report.backend_to_client, 2);
        assert!(report.first_error.is_none(), "clean EOF is not an error");
    }

    #[tokio::test]
    async fn test_client_close_closes_backend_stream() {
        let (client_near, client_far) = duplex(1024);
        let (backend_near, mut backend_far) = duplex(1024);
        let relay = tokio::spawn(run(SessionId::new(), client_near, backend_near, SHUTDOWN));

        drop(client_far);

        // The backend side sees EOF even though it never sent anything.
        let mut buf = [0u8; 16];
        let n = timeout(TEST_LIMIT, backend_far.read(&mut buf))
            .await
            .expect("backend must observe the close")
            .unwrap();
        assert_eq!(n, 0);
        timeout(TEST_LIMIT, relay).await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_backend_close_closes_client_stream() {
        let (client_near, mut client_far) = duplex(1024);
        let (backend_near, backend_far) = duplex(1024);
        let relay = tokio::spawn(run(SessionId::new(), client_near, backend_near, SHUTDOWN));

        drop(backend_far);

        let mut buf = [0u8; 16];
        let n = timeout(TEST_LIMIT, client_far.read(&mut buf))
            .await
            .expect("client must observe the close")
            .unwrap();
        assert_eq!(n, 0);
        let report = timeout(TEST_LIMIT, relay).await.unwrap().unwrap();
        assert!(report.first_error.is_none());
    }

    #[tokio::test]
    async fn test_bytes_sent_before_close_are_delivered() {
        // The client sends its last bytes and hangs up in one go; the backend
        // must still receive them before EOF.
        let (client_near, mut client_far) = duplex(1024);
        let (backend_near, mut backend_far) = duplex(1024);
        let relay = tokio::spawn(run(SessionId::new(), client_near, backend_near, SHUTDOWN));

        client_far.write_all(b"last words").await.unwrap();
        drop(client_far);

        let mut received = Vec::new();
        timeout(TEST_LIMIT, backend_far.read_to_end(&mut received))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(received, b"last words");
        let report = timeout(TEST_LIMIT, relay).await.unwrap().unwrap();
        assert_eq!(report.client_to_backend, 10);
    }

    #[tokio::test]
    async fn test_read_error_is_reported_and_tears_down_sibling() {
        // The backend reset on its first read; the client side is idle and
        // would otherwise keep the client→backend task blocked forever.
        let (client_near, _client_far) = duplex(1024);
        let report = timeout(
            TEST_LIMIT,
            run(SessionId::new(), client_near, ResetStream, SHUTDOWN),
        )
        .await
        .expect("relay must terminate after a reset");

        assert_eq!(report.client_to_backend, 0);
        assert_eq!(report.backend_to_client, 0);
        let err = report.first_error.expect("reset must be reported");
        assert_eq!(err.kind(), io::ErrorKind::ConnectionReset);
    }

    #[tokio::test]
    async fn test_blocked_writer_is_released_when_other_direction_ends() {
        // Arrange: the client never reads, so backend→client fills the tiny
        // pipe and blocks in write.  The client hanging up must release it.
        let (client_near, client_far) = duplex(8);
        let (backend_near, mut backend_far) = duplex(64 * 1024);
        let relay = tokio::spawn(run(SessionId::new(), client_near, backend_near, SHUTDOWN));

        backend_far.write_all(&[7u8; 4096]).await.unwrap();

        // Act
        drop(client_far);

        // Assert
        let report = timeout(TEST_LIMIT, relay)
            .await
            .expect("relay must not hang on a blocked write")
            .unwrap();
        assert!(report.backend_to_client < 4096);
    }

    #[tokio::test]
    async fn test_both_peers_closing_at_once_does_not_deadlock() {
        let (client_near, client_far) = duplex(1024);
        let (backend_near, backend_far) = duplex(1024);
        let relay = tokio::spawn(run(SessionId::new(), client_near, backend_near, SHUTDOWN));

        drop(client_far);
        drop(backend_far);

        let report = timeout(TEST_LIMIT, relay).await.unwrap().unwrap();
        assert_eq!(report.client_to_backend, 0);
        assert_eq!(report.backend_to_client, 0);
    }

    #[tokio::test]
    async fn test_close_signal_is_idempotent() {
        let close = CloseSignal::new();
        assert!(!close.is_closed());

        close.close();
        close.close();

        assert!(close.is_closed());
        timeout(TEST_LIMIT, close.closed()).await.unwrap();
    }

    #[tokio::test]
    async fn test_close_signal_concurrent_closers_wake_waiter() {
        let close = CloseSignal::new();
        let waiter = {
            let close = close.clone();
            tokio::spawn(async move { close.closed().await })
        };

        let closers: Vec<_> = (0..8)
            .map(|_| {
                let close = close.clone();
                tokio::spawn(async move { close.close() })
            })
            .collect();
        for c in closers {
            c.await.unwrap();
        }

        timeout(TEST_LIMIT, waiter).await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_close_guard_fires_on_drop() {
        let close = CloseSignal::new();
        {
            let _guard = close.guard();
        }
        assert!(close.is_closed());
    }
}

//! Byte-stream view of an upgraded WebSocket connection.
//!
//! The relay copies plain bytes; it knows nothing about frames.
//! [`WsByteStream`] bridges the two worlds:
//!
//! - **Reading** concatenates the payloads of incoming binary messages.
//!   Message boundaries are not preserved.  A Close frame (or the underlying
//!   socket ending) reads as EOF.  Ping/Pong are consumed silently;
//!   tungstenite queues the Pong reply itself.
//! - **Writing** sends each `write` call as one binary message.
//! - **Shutdown** starts the WebSocket close handshake.
//!
//! Text messages are refused with [`io::ErrorKind::InvalidData`]: the bridge
//! carries opaque bytes, and a text frame means the client is speaking a
//! different protocol.

use std::io;
use std::pin::Pin;
use std::task::{ready, Context, Poll};

use futures_util::{Sink, Stream};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio_tungstenite::tungstenite::{Error as WsError, Message as WsMessage};
use tokio_tungstenite::WebSocketStream;

/// An upgraded WebSocket presented as `AsyncRead + AsyncWrite`.
pub struct WsByteStream<S> {
    inner: WebSocketStream<S>,
    /// Payload of the binary message currently being read out.
    pending: Vec<u8>,
    /// Read position inside `pending`.
    offset: usize,
    /// Set once a Close frame or end of stream has been seen.
    eof: bool,
}

impl<S> WsByteStream<S> {
    pub fn new(inner: WebSocketStream<S>) -> Self {
        Self {
            inner,
            pending: Vec::new(),
            offset: 0,
            eof: false,
        }
    }
}

impl<S> AsyncRead for WsByteStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();

        loop {
            if this.offset < this.pending.len() {
                let available = &this.pending[this.offset..];
                let n = available.len().min(buf.remaining());
                buf.put_slice(&available[..n]);
                this.offset += n;
                if this.offset == this.pending.len() {
                    this.pending.clear();
                    this.offset = 0;
                }
                return Poll::Ready(Ok(()));
            }

            if this.eof {
                return Poll::Ready(Ok(()));
            }

            match ready!(Pin::new(&mut this.inner).poll_next(cx)) {
                Some(Ok(WsMessage::Binary(data))) => {
                    // Empty binary messages carry nothing; keep polling.
                    this.pending = data;
                    this.offset = 0;
                }
                Some(Ok(WsMessage::Text(_))) => {
                    return Poll::Ready(Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        "expected binary websocket message, got text",
                    )));
                }
                Some(Ok(WsMessage::Ping(_) | WsMessage::Pong(_) | WsMessage::Frame(_))) => {}
                Some(Ok(WsMessage::Close(_))) | None => {
                    this.eof = true;
                }
                Some(Err(WsError::ConnectionClosed | WsError::AlreadyClosed)) => {
                    this.eof = true;
                }
                Some(Err(e)) => return Poll::Ready(Err(into_io_error(e))),
            }
        }
    }
}

impl<S> AsyncWrite for WsByteStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        if buf.is_empty() {
            return Poll::Ready(Ok(0));
        }
        let this = self.get_mut();
        ready!(Pin::new(&mut this.inner).poll_ready(cx)).map_err(into_io_error)?;
        Pin::new(&mut this.inner)
            .start_send(WsMessage::Binary(buf.to_vec()))
            .map_err(into_io_error)?;
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner)
            .poll_flush(cx)
            .map_err(into_io_error)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        // Closing twice, or closing after the peer already closed, is fine.
        match ready!(Pin::new(&mut self.get_mut().inner).poll_close(cx)) {
            Ok(()) | Err(WsError::ConnectionClosed | WsError::AlreadyClosed) => Poll::Ready(Ok(())),
            Err(e) => Poll::Ready(Err(into_io_error(e))),
        }
    }
}

/// Maps a tungstenite error onto the closest `io::Error`.
fn into_io_error(err: WsError) -> io::Error {
    match err {
        WsError::Io(e) => e,
        WsError::ConnectionClosed | WsError::AlreadyClosed => {
            io::Error::new(io::ErrorKind::NotConnected, err)
        }
        other => io::Error::other(other),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

//! Application layer for ws-tcp-bridge.
//!
//! The application layer knows *what* a bridged session does: copy bytes
//! both ways and tear both streams down together.  It works on any
//! `AsyncRead + AsyncWrite` pair and never touches sockets, listeners or the
//! WebSocket handshake itself.
//!
//! # What does NOT belong here?
//!
//! - Binding listeners or dialing the backend (that is infrastructure)
//! - WebSocket framing (handled by `infrastructure::ws_stream`)

pub mod relay;

pub use relay::{run as run_relay, CloseSignal, RelayReport};

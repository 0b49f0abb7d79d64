//! ws-tcp-bridge library crate.
//!
//! Relays a browser-facing WebSocket connection to a backend TCP service,
//! copying binary frames as raw bytes in both directions so a TCP service can
//! be reached from environments that only allow WebSocket traffic.
//!
//! # Architecture
//!
//! ```text
//! Browser (binary WebSocket frames)
//!         ↕
//! [ws-tcp-bridge]
//!   ├── domain/           Pure types: BridgeConfig, SessionId, errors
//!   ├── application/      Relay: two copy tasks with joint teardown
//!   └── infrastructure/
//!         ├── ws_server/    Accept loop, upgrade, per-session task
//!         ├── ws_stream/    WebSocket ↔ byte-stream adapter
//!         └── backend_conn/ Bounded TCP dial to the backend
//!         ↕
//! Backend service (raw TCP)
//! ```
//!
//! # Layer rules
//!
//! - `domain` performs no I/O.
//! - `application` depends on `domain` and on tokio's I/O traits only; it
//!   never opens a socket.
//! - `infrastructure` depends on all other layers plus `tokio` and
//!   `tokio-tungstenite`.

/// Domain layer: configuration, session identity, error types.
pub mod domain;

/// Application layer: the full-duplex relay.
pub mod application;

/// Infrastructure layer: WebSocket server and backend TCP connection.
pub mod infrastructure;

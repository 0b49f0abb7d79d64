//! Infrastructure layer for ws-tcp-bridge.
//!
//! Everything that touches a socket lives here.
//!
//! # Responsibilities
//!
//! - Binding the listener and accepting connections (`ws_server`)
//! - Performing the WebSocket upgrade handshake (`ws_server`)
//! - Presenting the upgraded WebSocket as a byte stream (`ws_stream`)
//! - Dialing the backend TCP service (`backend_conn`)
//! - Spawning per-session Tokio tasks and handling the shutdown flag
//!
//! # What does NOT belong here?
//!
//! - The relay's copy and teardown logic (that is the application layer)
//! - Configuration parsing (that is done in `main.rs`)

pub mod backend_conn;
pub mod ws_server;
pub mod ws_stream;

pub use ws_server::{bind, run_server, serve};
pub use ws_stream::WsByteStream;

//! Domain layer for ws-tcp-bridge.
//!
//! Pure types with no I/O: the runtime configuration, session identity and
//! lifecycle states, and the typed errors a session can end with.
//!
//! # What does NOT belong here?
//!
//! - Any `tokio` sockets or WebSocket streams
//! - Flag parsing or environment variable reading (that is `main.rs`)
//! - Anything that could block

pub mod config;
pub mod error;
pub mod session;

pub use config::BridgeConfig;
pub use error::{ConnectError, SessionError, UpgradeError};
pub use session::{Direction, SessionId, SessionState};

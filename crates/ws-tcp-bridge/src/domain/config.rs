//! Bridge configuration types.
//!
//! [`BridgeConfig`] is the single source of truth for all runtime settings.
//! It is built once at startup from CLI arguments (see `main.rs`) or from
//! [`BridgeConfig::default`] in tests, then shared read-only across every
//! session task.
//!
//! The core never reads environment variables or flags directly: everything
//! it needs arrives through this struct.

use std::time::Duration;

/// Default address the WebSocket listener binds to.
pub const DEFAULT_LISTEN_ADDR: &str = "localhost:8080";

/// Default `host:port` of the backend TCP service.
pub const DEFAULT_BACKEND_ADDR: &str = "localhost:31415";

/// Default upper bound on a single backend dial.
pub const DEFAULT_DIAL_TIMEOUT: Duration = Duration::from_secs(2);

/// Default time an accepted connection may stay silent before its upgrade
/// request starts arriving.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Default bound on reading the upgrade request and completing the handshake.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(60);

/// Default bound on flushing and closing a stream's write side at teardown.
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(60);

/// All runtime configuration for the WebSocket-to-TCP bridge.
///
/// Immutable for the lifetime of the process. Wrap it in an `Arc` to share it
/// with session tasks.
///
/// # Example
///
/// ```rust
/// use ws_tcp_bridge::domain::BridgeConfig;
///
/// let cfg = BridgeConfig::default();
/// assert_eq!(cfg.backend_addr, "localhost:31415");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeConfig {
    /// `host:port` the WebSocket listener binds to.
    ///
    /// A hostname is allowed here (e.g. `localhost:8080`); it is resolved when
    /// the listener is bound.
    pub listen_addr: String,

    /// `host:port` of the backend TCP service.
    ///
    /// Resolved on every dial, so a DNS change is picked up by the next
    /// session without a restart.
    pub backend_addr: String,

    /// Maximum time a single backend dial may take, DNS lookup included.
    pub dial_timeout: Duration,

    /// Maximum time an accepted connection may sit without sending any bytes
    /// before the bridge drops it.
    pub idle_timeout: Duration,

    /// Maximum time allowed for reading the upgrade request and completing
    /// the WebSocket handshake once the first bytes have arrived.
    pub read_timeout: Duration,

    /// Maximum time allowed for flushing buffered frames and shutting down a
    /// stream's write side when a session is torn down.
    pub write_timeout: Duration,
}

impl Default for BridgeConfig {
    /// | Field          | Default           |
    /// |----------------|-------------------|
    /// | listen_addr    | `localhost:8080`  |
    /// | backend_addr   | `localhost:31415` |
    /// | dial_timeout   | 2 seconds         |
    /// | idle_timeout   | 5 minutes         |
    /// | read_timeout   | 1 minute          |
    /// | write_timeout  | 1 minute          |
    fn default() -> Self {
        Self {
            listen_addr: DEFAULT_LISTEN_ADDR.to_string(),
            backend_addr: DEFAULT_BACKEND_ADDR.to_string(),
            dial_timeout: DEFAULT_DIAL_TIMEOUT,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            read_timeout: DEFAULT_READ_TIMEOUT,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

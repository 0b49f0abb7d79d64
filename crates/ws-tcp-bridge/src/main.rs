//! ws-tcp-bridge entry point.
//!
//! Accepts WebSocket connections on the listen address and relays each one,
//! byte for byte, to a fresh TCP connection to the backend address.  Browsers
//! cannot open raw TCP sockets; this process lets them talk to a TCP service
//! anyway, without translating or inspecting the payload.
//!
//! # Usage
//!
//! ```text
//! ws-tcp-bridge [OPTIONS]
//!
//! Options:
//!   --listen-addr   <HOST:PORT>  WebSocket listen address [default: localhost:8080]
//!   --backend-addr  <HOST:PORT>  Backend TCP address [default: localhost:31415]
//!   --dial-timeout  <SECS>       Backend dial timeout [default: 2]
//!   --idle-timeout  <SECS>       Max silence before the upgrade request [default: 300]
//!   --read-timeout  <SECS>       Max time to complete the upgrade [default: 60]
//!   --write-timeout <SECS>       Max time to close a stream at teardown [default: 60]
//!   --log-level     <FILTER>     Log filter when RUST_LOG is unset [default: info]
//!   --log-format    <FORMAT>     json or text [default: json]
//! ```
//!
//! # Environment variable overrides
//!
//! Every option can also come from the environment.  CLI args take
//! precedence when both are present.
//!
//! | Variable                   | Default           |
//! |----------------------------|-------------------|
//! | `WS_BRIDGE_LISTEN`         | `localhost:8080`  |
//! | `WS_BRIDGE_BACKEND`        | `localhost:31415` |
//! | `WS_BRIDGE_DIAL_TIMEOUT`   | `2`               |
//! | `WS_BRIDGE_IDLE_TIMEOUT`   | `300`             |
//! | `WS_BRIDGE_READ_TIMEOUT`   | `60`              |
//! | `WS_BRIDGE_WRITE_TIMEOUT`  | `60`              |
//! | `WS_BRIDGE_LOG_LEVEL`      | `info`            |
//! | `WS_BRIDGE_LOG_FORMAT`     | `json`            |

use std::collections::BTreeMap;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::{bail, Context};
use clap::{Parser, ValueEnum};
use tracing::info;
use tracing_subscriber::EnvFilter;

use ws_tcp_bridge::domain::config::{
    BridgeConfig, DEFAULT_BACKEND_ADDR, DEFAULT_LISTEN_ADDR,
};
use ws_tcp_bridge::infrastructure::run_server;

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Output format of the log sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    /// One JSON object per line.
    Json,
    /// Human-readable lines.
    Text,
}

/// WebSocket-to-TCP bridge.
///
/// Relays binary WebSocket frames to a backend TCP service as raw bytes, and
/// backend bytes back as binary frames.
#[derive(Debug, Parser)]
#[command(
    name = "ws-tcp-bridge",
    about = "Relays WebSocket binary frames to a backend TCP service",
    version
)]
struct Cli {
    /// `host:port` the WebSocket server listens on.
    #[arg(long, default_value = DEFAULT_LISTEN_ADDR, env = "WS_BRIDGE_LISTEN")]
    listen_addr: String,

    /// `host:port` of the backend TCP service.
    ///
    /// Resolved on every dial.
    #[arg(long, default_value = DEFAULT_BACKEND_ADDR, env = "WS_BRIDGE_BACKEND")]
    backend_addr: String,

    /// Backend dial timeout in seconds.
    #[arg(long, default_value_t = 2, env = "WS_BRIDGE_DIAL_TIMEOUT")]
    dial_timeout: u64,

    /// Seconds an accepted connection may stay silent before its upgrade
    /// request begins.
    #[arg(long, default_value_t = 300, env = "WS_BRIDGE_IDLE_TIMEOUT")]
    idle_timeout: u64,

    /// Seconds allowed to read the upgrade request and finish the handshake.
    #[arg(long, default_value_t = 60, env = "WS_BRIDGE_READ_TIMEOUT")]
    read_timeout: u64,

    /// Seconds allowed to flush and close a stream's write side at teardown.
    #[arg(long, default_value_t = 60, env = "WS_BRIDGE_WRITE_TIMEOUT")]
    write_timeout: u64,

    /// Log filter (e.g. `debug`, `ws_tcp_bridge=trace`).  `RUST_LOG` wins
    /// when set.
    #[arg(long, default_value = "info", env = "WS_BRIDGE_LOG_LEVEL")]
    log_level: String,

    /// Log output format.
    #[arg(long, value_enum, default_value_t = LogFormat::Json, env = "WS_BRIDGE_LOG_FORMAT")]
    log_format: LogFormat,
}

impl Cli {
    /// Converts the parsed CLI arguments into a [`BridgeConfig`].
    ///
    /// # Errors
    ///
    /// Returns an error if an address is not of the form `host:port` or any
    /// timeout is zero.
    fn into_bridge_config(self) -> anyhow::Result<BridgeConfig> {
        validate_host_port(&self.listen_addr).context("invalid --listen-addr")?;
        validate_host_port(&self.backend_addr).context("invalid --backend-addr")?;

        Ok(BridgeConfig {
            listen_addr: self.listen_addr,
            backend_addr: self.backend_addr,
            dial_timeout: seconds("--dial-timeout", self.dial_timeout)?,
            idle_timeout: seconds("--idle-timeout", self.idle_timeout)?,
            read_timeout: seconds("--read-timeout", self.read_timeout)?,
            write_timeout: seconds("--write-timeout", self.write_timeout)?,
        })
    }
}

/// Checks that `addr` looks like `host:port` with a numeric port.
///
/// Resolution is left to bind/connect time; this only catches typos early.
fn validate_host_port(addr: &str) -> anyhow::Result<()> {
    let Some((host, port)) = addr.rsplit_once(':') else {
        bail!("'{addr}' is missing a port (expected host:port)");
    };
    if host.is_empty() {
        bail!("'{addr}' is missing a host (expected host:port)");
    }
    port.parse::<u16>()
        .with_context(|| format!("'{addr}' has an invalid port '{port}'"))?;
    Ok(())
}

fn seconds(flag: &str, secs: u64) -> anyhow::Result<Duration> {
    if secs == 0 {
        bail!("{flag} must be greater than zero");
    }
    Ok(Duration::from_secs(secs))
}

// ── Logging and build info ────────────────────────────────────────────────────

/// Installs the global tracing subscriber.
///
/// `RUST_LOG` takes precedence over `--log-level` so a deployment can turn
/// on per-module filters without changing its command line.
fn init_logging(log_level: &str, format: LogFormat) -> anyhow::Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(log_level)
            .with_context(|| format!("invalid --log-level '{log_level}'"))?,
    };

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
    Ok(())
}

/// Facts about this binary, logged once at startup.
fn build_info() -> BTreeMap<&'static str, &'static str> {
    BTreeMap::from([
        ("name", env!("CARGO_PKG_NAME")),
        ("version", env!("CARGO_PKG_VERSION")),
        ("target_os", std::env::consts::OS),
        ("target_arch", std::env::consts::ARCH),
        (
            "profile",
            if cfg!(debug_assertions) {
                "debug"
            } else {
                "release"
            },
        ),
    ])
}

// ── Entry point ───────────────────────────────────────────────────────────────

/// Program entry point.
///
/// 1. CLI arguments are parsed (exits with usage on bad input).
/// 2. Logging is installed using the parsed level and format.
/// 3. A [`BridgeConfig`] is built and validated.
/// 4. A Ctrl+C handler clears a shared `AtomicBool` to stop the accept loop.
/// 5. [`run_server`] binds and serves.  A bind failure is the only error that
///    ends the process; per-session errors stay inside their tasks.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level, cli.log_format)?;

    let config = cli.into_bridge_config()?;

    info!(
        build_info = ?build_info(),
        listen_addr = %config.listen_addr,
        backend_addr = %config.backend_addr,
        dial_timeout = ?config.dial_timeout,
        "ws-tcp-bridge starting"
    );

    let running = Arc::new(AtomicBool::new(true));
    let running_clone = Arc::clone(&running);

    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("received Ctrl+C; initiating graceful shutdown");
                running_clone.store(false, Ordering::Relaxed);
            }
            Err(e) => {
                tracing::error!("failed to listen for Ctrl+C signal: {e}");
            }
        }
    });

    run_server(config, running).await?;

    info!("ws-tcp-bridge stopped");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

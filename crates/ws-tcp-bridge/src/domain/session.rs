//! Session identity and lifecycle types.
//!
//! A session is one client's complete lifecycle: upgrade, backend dial,
//! relay, teardown.  Nothing here performs I/O; the orchestrator in
//! `infrastructure::ws_server` drives a session through these states and tags
//! every log event with its [`SessionId`].

use std::fmt;

use uuid::Uuid;

/// Opaque per-session correlation identifier.
///
/// Used only to group log lines that belong to the same session.  A random
/// v4 UUID keeps ids unique across restarts and across bridge instances
/// writing to the same log sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(Uuid);

impl SessionId {
    /// Generates a fresh random identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Lifecycle state of a session.
///
/// ```text
/// Upgrading ──► Dialing ──► Bridging ──► Closed
///     │            │
///     └────────────┴──────────────────► Closed   (upgrade or dial failed)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Waiting for the client's HTTP upgrade request and answering it.
    Upgrading,
    /// Upgrade done; opening the backend TCP connection.
    Dialing,
    /// Both streams open; the two copy directions are running.
    Bridging,
    /// Both streams closed.  Terminal.
    Closed,
}

impl SessionState {
    /// Returns `true` if `next` is a legal successor of `self`.
    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (Upgrading, Dialing)
                | (Upgrading, Closed)
                | (Dialing, Bridging)
                | (Dialing, Closed)
                | (Bridging, Closed)
        )
    }

    /// Short lowercase name used as a structured log field.
    pub fn as_str(self) -> &'static str {
        match self {
            SessionState::Upgrading => "upgrading",
            SessionState::Dialing => "dialing",
            SessionState::Bridging => "bridging",
            SessionState::Closed => "closed",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One of the two copy directions of a bridged session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// WebSocket client → backend TCP service.
    ClientToBackend,
    /// Backend TCP service → WebSocket client.
    BackendToClient,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::ClientToBackend => "client_to_backend",
            Direction::BackendToClient => "backend_to_client",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

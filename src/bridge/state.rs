//! Per-connection lifecycle state
//!
//! Pure functions only; the connection loop feeds observations in and
//! publishes the resulting [`ConnectionStatus`] on a watch channel.

use serde::Serialize;
use std::fmt;

/// Lifecycle state of one broker connection
///
/// The cycle `Disconnected -> Connecting -> Connected -> Disconnected -> ...`
/// has no terminal state; only shutdown leaves it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the connection loop observed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// About to wait on the transport for the next event
    Polling,
    /// The transport reported an established session
    SessionUp,
    /// The session was closed or the attempt failed
    SessionDown,
}

/// Transition function for [`ConnectionState`]
///
/// `Polling` only moves a disconnected connection to `Connecting`; an already
/// connected one stays connected while it waits for traffic.
pub fn next_state(current: ConnectionState, event: LifecycleEvent) -> ConnectionState {
    match (current, event) {
        (ConnectionState::Disconnected, LifecycleEvent::Polling) => ConnectionState::Connecting,
        (state, LifecycleEvent::Polling) => state,
        (_, LifecycleEvent::SessionUp) => ConnectionState::Connected,
        (_, LifecycleEvent::SessionDown) => ConnectionState::Disconnected,
    }
}

/// Observable snapshot of a connection
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConnectionStatus {
    pub state: ConnectionState,
    /// Patterns requested on the current session, in rule order
    pub subscriptions: Vec<String>,
    /// Sessions established so far (initial connect included)
    pub sessions: u64,
    pub last_disconnect: Option<String>,
}

impl ConnectionStatus {
    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }
}

//! Connection lifecycle and status reporting contract

use std::fmt;
use std::sync::Arc;

/// Status surfaced to the host's status display
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// Socket is being opened
    Connecting,
    /// Connected and operational
    Ok,
    /// Connect failed or the socket errored
    ConnectionFailure,
    /// No connection (not configured, shut down, or reconfiguring)
    Disconnected,
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionStatus::Connecting => write!(f, "connecting"),
            ConnectionStatus::Ok => write!(f, "ok"),
            ConnectionStatus::ConnectionFailure => write!(f, "connection_failure"),
            ConnectionStatus::Disconnected => write!(f, "disconnected"),
        }
    }
}

/// Internal connection state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Failed,
}

impl ConnectionState {
    /// Status reported to the host for this state
    pub fn status(self) -> ConnectionStatus {
        match self {
            ConnectionState::Disconnected => ConnectionStatus::Disconnected,
            ConnectionState::Connecting => ConnectionStatus::Connecting,
            ConnectionState::Connected => ConnectionStatus::Ok,
            ConnectionState::Failed => ConnectionStatus::ConnectionFailure,
        }
    }
}

/// Type alias for connection status callbacks: (status, human-readable message)
pub type StatusCallback = Arc<dyn Fn(ConnectionStatus, String) + Send + Sync>;

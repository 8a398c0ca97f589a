//! Connection state as observed from outside the connection task.

use std::time::Duration;

use uuid::Uuid;

/// Lifecycle state of a gateway connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No socket has been requested yet.
    Idle,
    /// Socket requested, hello not yet received.
    Connecting,
    /// Hello received, heartbeat loop running.
    Connected,
    /// Socket closed and timer released. Terminal for this connection.
    Closed,
}

impl ConnectionState {
    pub fn is_active(&self) -> bool {
        matches!(self, ConnectionState::Connecting | ConnectionState::Connected)
    }
}

/// Snapshot of a connection, published by the connection task on every
/// transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionInfo {
    /// Unique id of this connection attempt.
    pub id: Uuid,
    pub state: ConnectionState,
    /// Interval announced by the hello frame.
    pub heartbeat_interval: Option<Duration>,
    /// Jittered period actually scheduled (the first one, when re-jittering).
    pub heartbeat_period: Option<Duration>,
}

impl ConnectionInfo {
    pub(crate) fn connecting(id: Uuid) -> Self {
        Self {
            id,
            state: ConnectionState::Connecting,
            heartbeat_interval: None,
            heartbeat_period: None,
        }
    }
}

//! Caller-facing hooks for connection lifecycle and inbound frames.

use std::fmt;

use async_trait::async_trait;
use gateway_common::ControlFrame;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::error::{Error, Result};

/// Receives connection events.
///
/// All hooks for one connection run on that connection's task, one at a time
/// and in the order the events happened. A slow hook delays heartbeats, so
/// hand long work off to another task.
#[async_trait]
pub trait GatewayHandler: Send + Sync {
    /// The socket is open. Identify (or any other opening frame) is the
    /// caller's job; send it through `session.sender()`.
    async fn on_open(&self, _session: &Session) {}

    /// A decoded inbound frame, after hello bookkeeping. The hello frame
    /// itself is delivered here too.
    async fn on_frame(&self, _session: &Session, _frame: ControlFrame) {}

    /// Informational. Transport, decode and send errors leave the connection
    /// up. A protocol violation in the hello is followed by a 1002 close and
    /// `on_close`.
    async fn on_error(&self, _session: &Session, _error: Error) {}

    /// Fires exactly once per connection, after the heartbeat timer is gone.
    async fn on_close(&self, _session: &Session, _code: u16, _reason: String) {}
}

/// Sends frames on a connection. Cheap to clone.
///
/// Frames are queued behind whatever the connection is doing, so they never
/// interleave with a heartbeat write or a close.
#[derive(Debug, Clone)]
pub struct GatewaySender {
    connection_id: Uuid,
    frames: mpsc::UnboundedSender<ControlFrame>,
}

impl GatewaySender {
    pub(crate) fn new(connection_id: Uuid, frames: mpsc::UnboundedSender<ControlFrame>) -> Self {
        Self {
            connection_id,
            frames,
        }
    }

    pub fn connection_id(&self) -> Uuid {
        self.connection_id
    }

    /// Queue a frame. Fails with [`Error::Closed`] once the connection ended.
    pub fn send(&self, frame: ControlFrame) -> Result<()> {
        self.frames.send(frame).map_err(|_| Error::Closed)
    }

    pub fn is_closed(&self) -> bool {
        self.frames.is_closed()
    }
}

/// Per-connection context handed to every hook.
#[derive(Clone)]
pub struct Session {
    id: Uuid,
    token: String,
    sender: GatewaySender,
}

impl Session {
    pub(crate) fn new(id: Uuid, token: String, sender: GatewaySender) -> Self {
        Self { id, token, sender }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Credential passed to `connect`, for building identify.
    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn sender(&self) -> &GatewaySender {
        &self.sender
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("token", &"<redacted>")
            .finish()
    }
}

/// Connection events as plain values.
#[derive(Debug)]
pub enum GatewayEvent {
    Open {
        connection_id: Uuid,
    },
    Frame {
        connection_id: Uuid,
        frame: ControlFrame,
    },
    Error {
        connection_id: Uuid,
        error: Error,
    },
    Close {
        connection_id: Uuid,
        code: u16,
        reason: String,
    },
}

impl GatewayEvent {
    pub fn connection_id(&self) -> Uuid {
        match self {
            GatewayEvent::Open { connection_id }
            | GatewayEvent::Frame { connection_id, .. }
            | GatewayEvent::Error { connection_id, .. }
            | GatewayEvent::Close { connection_id, .. } => *connection_id,
        }
    }
}

/// Handler that forwards every event into an unbounded channel.
///
/// Events are dropped silently once the receiver is gone.
#[derive(Debug, Clone)]
pub struct ChannelHandler {
    tx: mpsc::UnboundedSender<GatewayEvent>,
}

impl ChannelHandler {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<GatewayEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn emit(&self, event: GatewayEvent) {
        let _ = self.tx.send(event);
    }
}

#[async_trait]
impl GatewayHandler for ChannelHandler {
    async fn on_open(&self, session: &Session) {
        self.emit(GatewayEvent::Open {
            connection_id: session.id(),
        });
    }

    async fn on_frame(&self, session: &Session, frame: ControlFrame) {
        self.emit(GatewayEvent::Frame {
            connection_id: session.id(),
            frame,
        });
    }

    async fn on_error(&self, session: &Session, error: Error) {
        self.emit(GatewayEvent::Error {
            connection_id: session.id(),
            error,
        });
    }

    async fn on_close(&self, session: &Session, code: u16, reason: String) {
        self.emit(GatewayEvent::Close {
            connection_id: session.id(),
            code,
            reason,
        });
    }
}

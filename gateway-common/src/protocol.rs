//! WebSocket protocol types for client-gateway communication.
//!
//! # Protocol Overview
//!
//! The gateway speaks JSON-encoded text frames. Every frame is an object with an
//! integer `op` (opcode) and a payload `d` whose shape depends on the opcode.
//! Dispatch frames additionally carry a sequence number `s` and an event name `t`,
//! which are passed through untouched.
//!
//! ## Connection Flow
//!
//! 1. Client opens the WebSocket
//! 2. Gateway sends `Hello` (op 10) with `d.heartbeat_interval` in milliseconds
//! 3. Client answers with a `Heartbeat` (op 1, `d = null`) right away
//! 4. Client keeps sending heartbeats on the announced cadence, plus jitter
//! 5. Everything else (identify, dispatch events) belongs to the caller

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Well-known gateway opcodes.
///
/// Only `HELLO` and `HEARTBEAT` are interpreted by the client; the rest are
/// named here for callers handling frames themselves.
pub mod opcode {
    pub const DISPATCH: i64 = 0;
    pub const HEARTBEAT: i64 = 1;
    pub const IDENTIFY: i64 = 2;
    pub const RECONNECT: i64 = 7;
    pub const INVALID_SESSION: i64 = 9;
    pub const HELLO: i64 = 10;
    pub const HEARTBEAT_ACK: i64 = 11;
}

/// A single gateway frame, inbound or outbound.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlFrame {
    /// Opcode identifying the frame type.
    pub op: i64,
    /// Opcode-specific payload. Missing payloads decode as `null`.
    #[serde(default)]
    pub d: Value,
    /// Sequence number (dispatch frames only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub s: Option<u64>,
    /// Event name (dispatch frames only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub t: Option<String>,
}

impl ControlFrame {
    pub fn new(op: i64, d: Value) -> Self {
        Self { op, d, s: None, t: None }
    }

    /// The client-to-server liveness frame: `{"op":1,"d":null}`.
    pub fn heartbeat() -> Self {
        Self::new(opcode::HEARTBEAT, Value::Null)
    }

    pub fn is_hello(&self) -> bool {
        self.op == opcode::HELLO
    }

    pub fn is_heartbeat(&self) -> bool {
        self.op == opcode::HEARTBEAT
    }
}

/// Handshake payload announced by the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hello {
    /// Heartbeat cadence in milliseconds. Always positive once parsed.
    pub heartbeat_interval: u64,
}

impl Hello {
    /// Validate the payload of a frame already known to be a hello.
    ///
    /// The interval must be a positive integer; zero, negatives, fractions and
    /// non-numbers are all rejected.
    pub fn from_frame(frame: &ControlFrame) -> Result<Self, ProtocolViolation> {
        let raw = frame
            .d
            .get("heartbeat_interval")
            .ok_or(ProtocolViolation::MissingHeartbeatInterval)?;

        match raw.as_u64() {
            Some(interval) if interval > 0 => Ok(Self {
                heartbeat_interval: interval,
            }),
            _ => Err(ProtocolViolation::InvalidHeartbeatInterval(raw.to_string())),
        }
    }
}

/// Handshake failures. Any of these is fatal for the connection.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolViolation {
    #[error("hello payload has no heartbeat_interval")]
    MissingHeartbeatInterval,

    #[error("hello heartbeat_interval must be a positive integer, got {0}")]
    InvalidHeartbeatInterval(String),
}

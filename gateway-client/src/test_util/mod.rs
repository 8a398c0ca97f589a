//! Test doubles for exercising the gateway client without a network.

pub mod mock_transport;

pub use mock_transport::{MockConnector, MockRemote};

use gateway_common::{opcode, ControlFrame};
use serde_json::json;

/// Hello frame announcing `interval_ms`.
pub fn hello_frame(interval_ms: u64) -> ControlFrame {
    ControlFrame::new(opcode::HELLO, json!({ "heartbeat_interval": interval_ms }))
}

/// Dispatch frame with event name `t` and sequence number `s`.
pub fn dispatch_frame(t: &str, s: u64, d: serde_json::Value) -> ControlFrame {
    ControlFrame {
        op: opcode::DISPATCH,
        d,
        s: Some(s),
        t: Some(t.to_string()),
    }
}

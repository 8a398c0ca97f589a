//! Gateway WebSocket client.
//!
//! This module handles the connection to the push gateway: the hello
//! handshake, the jittered heartbeat loop, and delivery of lifecycle events
//! and inbound frames to a caller-supplied handler.

mod client;
mod connection;
mod handler;
mod heartbeat;
mod state;
mod transport;

pub use client::GatewayClient;
pub use connection::{CLOSE_NORMAL, CLOSE_PROTOCOL_ERROR, DISCONNECT_REASON};
pub use handler::{ChannelHandler, GatewayEvent, GatewayHandler, GatewaySender, Session};
pub use heartbeat::{jittered_period, HeartbeatTimer};
pub use state::{ConnectionInfo, ConnectionState};
pub use transport::{
    Connector, Transport, TransportEvent, WsConnector, WsTransport, CLOSE_ABNORMAL, CLOSE_NO_STATUS,
};

//! Gateway Client
//!
//! Keeps a heartbeating session to a real-time push gateway and reports what
//! happens on it through [`gateway::GatewayHandler`].

pub mod config;
pub mod error;
pub mod gateway;
pub mod logging;
pub mod test_util;

pub use config::{Config, GatewayConfig, LoggingConfig};
pub use error::{Error, Result};
pub use gateway::{
    ChannelHandler, ConnectionInfo, ConnectionState, GatewayClient, GatewayEvent, GatewayHandler,
    GatewaySender, Session,
};
pub use gateway_common::{opcode, ControlFrame, Hello, ProtocolViolation};

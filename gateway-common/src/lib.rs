//! Gateway Common Types
//!
//! Wire-level types shared by the gateway client and anything that needs to
//! speak the gateway protocol (including test doubles).

pub mod protocol;

pub use protocol::{opcode, ControlFrame, Hello, ProtocolViolation};

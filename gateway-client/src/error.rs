//! Error types for the gateway client.

use gateway_common::ProtocolViolation;
use tokio_tungstenite::tungstenite;

/// Errors surfaced by the gateway client.
///
/// Inside a running connection these are never returned to the caller of
/// `connect`; they are delivered through `GatewayHandler::on_error`.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Protocol violation: {0}")]
    Protocol(#[from] ProtocolViolation),

    #[error("Malformed frame: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Connection closed")]
    Closed,

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_error_message() {
        let err = Error::from(ProtocolViolation::MissingHeartbeatInterval);
        assert_eq!(
            err.to_string(),
            "Protocol violation: hello payload has no heartbeat_interval"
        );
    }

    #[test]
    fn test_transport_error_message() {
        let err = Error::Transport("connection reset".to_string());
        assert_eq!(err.to_string(), "Transport error: connection reset");
    }

    #[test]
    fn test_decode_error_from_serde() {
        let serde_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err = Error::from(serde_err);
        assert!(matches!(err, Error::Decode(_)));
        assert!(err.to_string().starts_with("Malformed frame: "));
    }
}

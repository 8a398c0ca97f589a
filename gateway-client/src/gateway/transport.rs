//! Socket abstraction between the connection task and the network.
//!
//! The connection task only ever talks to a [`Transport`], so tests can swap
//! the WebSocket for an in-memory double (see `crate::test_util`).

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::error::{Error, Result};

/// Close code used when the stream ends without a close frame.
pub const CLOSE_ABNORMAL: u16 = 1006;
/// Close code reported when the peer's close frame carries no status.
pub const CLOSE_NO_STATUS: u16 = 1005;

/// Something the socket reported.
#[derive(Debug)]
pub enum TransportEvent {
    /// A text frame.
    Text(String),
    /// A transport-level error. The socket may still be usable.
    Error(Error),
    /// The socket closed. Nothing follows this event.
    Closed { code: u16, reason: String },
}

/// An open, bidirectional text socket.
#[async_trait]
pub trait Transport: Send {
    /// Next event from the socket. Must be cancel safe.
    async fn recv(&mut self) -> TransportEvent;

    /// Write one text frame.
    async fn send(&mut self, text: String) -> Result<()>;

    /// Start a local close. Does not wait for the peer to acknowledge.
    async fn close(&mut self, code: u16, reason: &str) -> Result<()>;

    /// Whether frames can still be written.
    fn is_open(&self) -> bool;
}

/// Opens transports. One call per connection attempt.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, url: &str) -> Result<Box<dyn Transport>>;
}

/// Connector for real WebSocket endpoints (`ws://` and `wss://`).
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, url: &str) -> Result<Box<dyn Transport>> {
        let (stream, response) = connect_async(url).await?;
        tracing::debug!("WebSocket handshake completed with status {}", response.status());
        Ok(Box::new(WsTransport::new(stream)))
    }
}

/// [`Transport`] over tokio-tungstenite.
pub struct WsTransport {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    open: bool,
}

impl WsTransport {
    pub fn new(stream: WebSocketStream<MaybeTlsStream<TcpStream>>) -> Self {
        Self { stream, open: true }
    }

    fn closed(&mut self, code: u16, reason: String) -> TransportEvent {
        self.open = false;
        TransportEvent::Closed { code, reason }
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn recv(&mut self) -> TransportEvent {
        if !self.open {
            return TransportEvent::Closed {
                code: CLOSE_ABNORMAL,
                reason: "transport already closed".to_string(),
            };
        }

        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => return TransportEvent::Text(text),
                Some(Ok(Message::Binary(data))) => match String::from_utf8(data) {
                    Ok(text) => return TransportEvent::Text(text),
                    Err(e) => {
                        return TransportEvent::Error(Error::Transport(format!(
                            "binary frame is not UTF-8: {}",
                            e
                        )))
                    }
                },
                Some(Ok(Message::Close(frame))) => {
                    let (code, reason) = match frame {
                        Some(frame) => (u16::from(frame.code), frame.reason.into_owned()),
                        None => (CLOSE_NO_STATUS, String::new()),
                    };
                    return self.closed(code, reason);
                }
                // tungstenite queues the pong for a ping and flushes it on the next read.
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    use tokio_tungstenite::tungstenite::Error as WsError;
                    return match e {
                        WsError::ConnectionClosed | WsError::AlreadyClosed => {
                            self.closed(CLOSE_ABNORMAL, e.to_string())
                        }
                        other => TransportEvent::Error(other.into()),
                    };
                }
                None => return self.closed(CLOSE_ABNORMAL, "stream ended".to_string()),
            }
        }
    }

    async fn send(&mut self, text: String) -> Result<()> {
        if !self.open {
            return Err(Error::Closed);
        }
        self.stream.send(Message::Text(text)).await?;
        Ok(())
    }

    async fn close(&mut self, code: u16, reason: &str) -> Result<()> {
        if !self.open {
            return Ok(());
        }
        self.open = false;
        let frame = CloseFrame {
            code: CloseCode::from(code),
            reason: reason.to_string().into(),
        };
        self.stream.close(Some(frame)).await?;
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open
    }
}

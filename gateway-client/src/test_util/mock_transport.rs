//! In-memory transport.
//!
//! Each `connect` on a [`MockConnector`] yields a [`MockRemote`], which plays
//! the gateway's side of that socket.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use gateway_common::ControlFrame;
use tokio::sync::mpsc;

use crate::error::{Error, Result};
use crate::gateway::{Connector, Transport, TransportEvent, CLOSE_ABNORMAL};

use super::hello_frame;

#[derive(Debug, Default)]
struct SocketState {
    closed: AtomicBool,
    local_close: Mutex<Option<(u16, String)>>,
}

impl SocketState {
    fn is_open(&self) -> bool {
        !self.closed.load(Ordering::SeqCst)
    }

    fn mark_closed(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Connector handing out in-memory sockets.
#[derive(Debug)]
pub struct MockConnector {
    remotes: mpsc::UnboundedSender<MockRemote>,
    refuse: Option<String>,
}

impl MockConnector {
    /// Connector whose sockets show up on the returned receiver, one per
    /// `connect`.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<MockRemote>) {
        let (remotes, rx) = mpsc::unbounded_channel();
        (
            Self {
                remotes,
                refuse: None,
            },
            rx,
        )
    }

    /// Connector that fails every `connect` with `reason`.
    pub fn refusing(reason: &str) -> Self {
        let (remotes, _) = mpsc::unbounded_channel();
        Self {
            remotes,
            refuse: Some(reason.to_string()),
        }
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, url: &str) -> Result<Box<dyn Transport>> {
        if let Some(reason) = &self.refuse {
            return Err(Error::Transport(reason.clone()));
        }

        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let state = Arc::new(SocketState::default());

        let remote = MockRemote {
            url: url.to_string(),
            inbound: inbound_tx,
            outbound: outbound_rx,
            state: state.clone(),
        };
        self.remotes
            .send(remote)
            .map_err(|_| Error::Transport("mock connector receiver dropped".to_string()))?;

        Ok(Box::new(MockTransport {
            inbound: inbound_rx,
            outbound: outbound_tx,
            state,
        }))
    }
}

struct MockTransport {
    inbound: mpsc::UnboundedReceiver<TransportEvent>,
    outbound: mpsc::UnboundedSender<String>,
    state: Arc<SocketState>,
}

#[async_trait]
impl Transport for MockTransport {
    async fn recv(&mut self) -> TransportEvent {
        match self.inbound.recv().await {
            Some(TransportEvent::Closed { code, reason }) => {
                self.state.mark_closed();
                TransportEvent::Closed { code, reason }
            }
            Some(event) => event,
            None => {
                self.state.mark_closed();
                TransportEvent::Closed {
                    code: CLOSE_ABNORMAL,
                    reason: "mock remote dropped".to_string(),
                }
            }
        }
    }

    async fn send(&mut self, text: String) -> Result<()> {
        if !self.state.is_open() {
            return Err(Error::Closed);
        }
        self.outbound
            .send(text)
            .map_err(|_| Error::Transport("mock remote dropped".to_string()))
    }

    async fn close(&mut self, code: u16, reason: &str) -> Result<()> {
        self.state.mark_closed();
        *self
            .state
            .local_close
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some((code, reason.to_string()));
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.state.is_open()
    }
}

/// The gateway's end of an in-memory socket.
#[derive(Debug)]
pub struct MockRemote {
    url: String,
    inbound: mpsc::UnboundedSender<TransportEvent>,
    outbound: mpsc::UnboundedReceiver<String>,
    state: Arc<SocketState>,
}

impl MockRemote {
    /// URL the client connected to.
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn send_text(&self, text: impl Into<String>) {
        let _ = self.inbound.send(TransportEvent::Text(text.into()));
    }

    pub fn send_frame(&self, frame: &ControlFrame) {
        if let Ok(text) = serde_json::to_string(frame) {
            self.send_text(text);
        }
    }

    pub fn send_hello(&self, interval_ms: u64) {
        self.send_frame(&hello_frame(interval_ms));
    }

    /// Report a transport error without closing.
    pub fn send_error(&self, message: &str) {
        let _ = self
            .inbound
            .send(TransportEvent::Error(Error::Transport(message.to_string())));
    }

    /// Close from the gateway's side.
    pub fn close(&self, code: u16, reason: &str) {
        let _ = self.inbound.send(TransportEvent::Closed {
            code,
            reason: reason.to_string(),
        });
    }

    /// Make the socket unwritable without telling the client.
    pub fn sever(&self) {
        self.state.mark_closed();
    }

    /// Next text frame the client wrote, raw.
    pub async fn next_text(&mut self) -> Option<String> {
        self.outbound.recv().await
    }

    /// Next frame the client wrote. `None` once the client side is gone.
    pub async fn next_frame(&mut self) -> Option<ControlFrame> {
        let text = self.outbound.recv().await?;
        serde_json::from_str(&text).ok()
    }

    /// A frame the client already wrote, without waiting.
    pub fn try_next_frame(&mut self) -> Option<ControlFrame> {
        let text = self.outbound.try_recv().ok()?;
        serde_json::from_str(&text).ok()
    }

    pub fn is_open(&self) -> bool {
        self.state.is_open()
    }

    /// Close code and reason if the client closed the socket.
    pub fn local_close(&self) -> Option<(u16, String)> {
        self.state
            .local_close
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

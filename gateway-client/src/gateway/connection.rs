//! Connection task: owns the socket and the heartbeat timer for one connection.
//!
//! Everything that can happen to a connection (caller frames, shutdown,
//! socket events, heartbeat ticks) is handled here, one event at a time, so a
//! heartbeat can never race a close.

use std::sync::Arc;
use std::time::Duration;

use gateway_common::{ControlFrame, Hello};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::timeout;
use uuid::Uuid;

use crate::error::Error;

use super::handler::{GatewayHandler, GatewaySender, Session};
use super::heartbeat::HeartbeatTimer;
use super::state::{ConnectionInfo, ConnectionState};
use super::transport::{Connector, Transport, TransportEvent, CLOSE_ABNORMAL};

pub const CLOSE_NORMAL: u16 = 1000;
pub const CLOSE_PROTOCOL_ERROR: u16 = 1002;
pub const DISCONNECT_REASON: &str = "client disconnect";

/// How a connection ended: close code and reason reported to `on_close`.
type CloseOutcome = (u16, String);

pub(crate) struct ConnectionSettings {
    pub url: String,
    pub rejitter: bool,
    pub close_timeout: Duration,
}

pub(crate) struct ConnectionTask {
    id: Uuid,
    settings: ConnectionSettings,
    connector: Arc<dyn Connector>,
    handler: Arc<dyn GatewayHandler>,
    session: Session,
    frames: mpsc::UnboundedReceiver<ControlFrame>,
    shutdown: oneshot::Receiver<()>,
    info: watch::Sender<ConnectionInfo>,
}

/// The caller's side of a spawned [`ConnectionTask`].
pub(crate) struct ConnectionHandle {
    pub id: Uuid,
    pub sender: GatewaySender,
    /// Sending (or dropping) this starts the local close path.
    pub shutdown: oneshot::Sender<()>,
    pub info: watch::Receiver<ConnectionInfo>,
}

impl ConnectionTask {
    pub(crate) fn new(
        token: String,
        settings: ConnectionSettings,
        connector: Arc<dyn Connector>,
        handler: Arc<dyn GatewayHandler>,
    ) -> (Self, ConnectionHandle) {
        let id = Uuid::new_v4();
        let (frames_tx, frames) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown) = oneshot::channel();
        let (info, info_rx) = watch::channel(ConnectionInfo::connecting(id));
        let sender = GatewaySender::new(id, frames_tx);

        let task = Self {
            id,
            settings,
            connector,
            handler,
            session: Session::new(id, token, sender.clone()),
            frames,
            shutdown,
            info,
        };
        let handle = ConnectionHandle {
            id,
            sender,
            shutdown: shutdown_tx,
            info: info_rx,
        };
        (task, handle)
    }

    /// Drive the connection from `Connecting` to `Closed`.
    ///
    /// `on_close` is always the last hook called.
    pub(crate) async fn run(mut self) {
        tracing::info!(connection_id = %self.id, "Connecting to gateway at {}", self.settings.url);

        let connector = self.connector.clone();
        let opened = tokio::select! {
            biased;
            _ = &mut self.shutdown => None,
            result = connector.connect(&self.settings.url) => Some(result),
        };

        let mut transport = match opened {
            None => {
                tracing::info!(connection_id = %self.id, "Disconnected before socket opened");
                self.finish((CLOSE_NORMAL, DISCONNECT_REASON.to_string())).await;
                return;
            }
            Some(Err(e)) => {
                tracing::error!(connection_id = %self.id, "Failed to open gateway socket: {}", e);
                let reason = e.to_string();
                self.handler.on_error(&self.session, e).await;
                self.finish((CLOSE_ABNORMAL, reason)).await;
                return;
            }
            Some(Ok(transport)) => transport,
        };

        tracing::info!(connection_id = %self.id, "Gateway socket open, waiting for hello");
        self.handler.on_open(&self.session).await;

        let outcome = self.message_loop(transport.as_mut()).await;
        drop(transport);
        self.finish(outcome).await;
    }

    async fn message_loop(&mut self, transport: &mut dyn Transport) -> CloseOutcome {
        let mut heartbeat: Option<HeartbeatTimer> = None;

        loop {
            // Shutdown first so no heartbeat is written ahead of a local close.
            // A due tick is taken before any queued inbound or caller traffic.
            tokio::select! {
                biased;

                _ = &mut self.shutdown => {
                    drop(heartbeat.take());
                    return self.close_locally(transport, CLOSE_NORMAL, DISCONNECT_REASON).await;
                }

                _ = next_beat(&mut heartbeat) => {
                    self.send_heartbeat(transport).await;
                }

                event = transport.recv() => match event {
                    TransportEvent::Text(text) => {
                        if let Some(outcome) = self.handle_text(transport, &mut heartbeat, text).await {
                            return outcome;
                        }
                    }
                    TransportEvent::Error(e) => {
                        tracing::warn!(connection_id = %self.id, "Gateway transport error: {}", e);
                        self.handler.on_error(&self.session, e).await;
                    }
                    TransportEvent::Closed { code, reason } => {
                        drop(heartbeat.take());
                        tracing::info!(connection_id = %self.id, code, "Gateway closed the socket: {}", reason);
                        return (code, reason);
                    }
                },

                Some(frame) = self.frames.recv() => {
                    if transport.is_open() {
                        self.write(transport, &frame).await;
                    } else {
                        self.handler.on_error(&self.session, Error::Closed).await;
                    }
                }
            }
        }
    }

    async fn handle_text(
        &mut self,
        transport: &mut dyn Transport,
        heartbeat: &mut Option<HeartbeatTimer>,
        text: String,
    ) -> Option<CloseOutcome> {
        let frame: ControlFrame = match serde_json::from_str(&text) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!(connection_id = %self.id, "Undecodable gateway frame: {}", e);
                self.handler.on_error(&self.session, e.into()).await;
                return None;
            }
        };
        tracing::debug!(connection_id = %self.id, op = frame.op, "Received gateway frame");

        if frame.is_hello() && heartbeat.is_none() {
            match Hello::from_frame(&frame) {
                Ok(hello) => self.start_heartbeat(transport, heartbeat, hello).await,
                Err(violation) => {
                    tracing::warn!(connection_id = %self.id, "Rejecting gateway hello: {}", violation);
                    let reason = violation.to_string();
                    self.handler.on_error(&self.session, violation.into()).await;
                    return Some(self.close_locally(transport, CLOSE_PROTOCOL_ERROR, &reason).await);
                }
            }
        }

        self.handler.on_frame(&self.session, frame).await;
        None
    }

    async fn start_heartbeat(
        &mut self,
        transport: &mut dyn Transport,
        heartbeat: &mut Option<HeartbeatTimer>,
        hello: Hello,
    ) {
        let interval = Duration::from_millis(hello.heartbeat_interval);

        // The gateway expects the hello to be acknowledged right away.
        self.send_heartbeat(transport).await;

        let timer = HeartbeatTimer::start(interval, self.settings.rejitter);
        let period = timer.period();
        *heartbeat = Some(timer);

        self.info.send_modify(|info| {
            info.state = ConnectionState::Connected;
            info.heartbeat_interval = Some(interval);
            info.heartbeat_period = Some(period);
        });
        tracing::info!(
            connection_id = %self.id,
            interval_ms = hello.heartbeat_interval,
            period_ms = period.as_millis() as u64,
            "Gateway hello received, heartbeat started"
        );
    }

    async fn send_heartbeat(&self, transport: &mut dyn Transport) {
        if !transport.is_open() {
            tracing::debug!(connection_id = %self.id, "Transport not open, skipping heartbeat");
            return;
        }
        tracing::debug!(connection_id = %self.id, "Sending heartbeat");
        self.write(transport, &ControlFrame::heartbeat()).await;
    }

    async fn write(&self, transport: &mut dyn Transport, frame: &ControlFrame) {
        let text = match serde_json::to_string(frame) {
            Ok(text) => text,
            Err(e) => {
                self.handler.on_error(&self.session, e.into()).await;
                return;
            }
        };
        if let Err(e) = transport.send(text).await {
            tracing::warn!(connection_id = %self.id, op = frame.op, "Failed to send gateway frame: {}", e);
            self.handler.on_error(&self.session, e).await;
        }
    }

    async fn close_locally(
        &self,
        transport: &mut dyn Transport,
        code: u16,
        reason: &str,
    ) -> CloseOutcome {
        match timeout(self.settings.close_timeout, transport.close(code, reason)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::debug!(connection_id = %self.id, "Error while closing gateway socket: {}", e)
            }
            Err(_) => tracing::warn!(connection_id = %self.id, "Timed out closing gateway socket"),
        }
        (code, reason.to_string())
    }

    async fn finish(&mut self, (code, reason): CloseOutcome) {
        self.info.send_modify(|info| info.state = ConnectionState::Closed);
        tracing::info!(connection_id = %self.id, code, "Gateway connection closed: {}", reason);
        self.handler.on_close(&self.session, code, reason).await;
    }
}

/// Resolves on the next heartbeat tick; never resolves without a timer.
async fn next_beat(heartbeat: &mut Option<HeartbeatTimer>) {
    match heartbeat {
        Some(timer) => timer.tick().await,
        None => std::future::pending().await,
    }
}

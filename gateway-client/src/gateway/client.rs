//! WebSocket client for the push gateway.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::config::GatewayConfig;

use super::connection::{ConnectionHandle, ConnectionSettings, ConnectionTask};
use super::handler::{GatewayHandler, GatewaySender};
use super::state::{ConnectionInfo, ConnectionState};
use super::transport::{Connector, WsConnector};

/// Gateway WebSocket client.
///
/// Owns at most one connection at a time. Each connection runs on its own
/// task, which owns the socket and the heartbeat timer; this handle only
/// starts and stops it. Lifecycle and inbound frames are reported to the
/// [`GatewayHandler`].
///
/// Dropping the client closes the active connection in the background.
pub struct GatewayClient {
    config: GatewayConfig,
    connector: Arc<dyn Connector>,
    handler: Arc<dyn GatewayHandler>,
    active: Option<ActiveConnection>,
}

struct ActiveConnection {
    sender: GatewaySender,
    info: watch::Receiver<ConnectionInfo>,
    /// Taken on the first disconnect.
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl GatewayClient {
    /// Client that connects over real WebSockets.
    pub fn new(config: GatewayConfig, handler: Arc<dyn GatewayHandler>) -> Self {
        Self::with_connector(config, Arc::new(WsConnector), handler)
    }

    pub fn with_connector(
        config: GatewayConfig,
        connector: Arc<dyn Connector>,
        handler: Arc<dyn GatewayHandler>,
    ) -> Self {
        Self {
            config,
            connector,
            handler,
            active: None,
        }
    }

    /// Open a new connection using `token` as the credential.
    ///
    /// Returns as soon as the connection task is started; the handshake is
    /// observed through the handler. An existing connection is fully torn
    /// down (timer cancelled, socket closed, `on_close` delivered) first.
    pub async fn connect(&mut self, token: impl Into<String>) -> Uuid {
        if self.state().is_active() {
            tracing::info!("Replacing active gateway connection");
        }
        self.disconnect().await;

        let settings = ConnectionSettings {
            url: self.config.endpoint(),
            rejitter: self.config.rejitter_each_tick,
            close_timeout: Duration::from_secs(self.config.close_timeout_secs),
        };
        let (task, handle) = ConnectionTask::new(
            token.into(),
            settings,
            self.connector.clone(),
            self.handler.clone(),
        );
        let ConnectionHandle {
            id,
            sender,
            shutdown,
            info,
        } = handle;

        self.active = Some(ActiveConnection {
            sender,
            info,
            shutdown: Some(shutdown),
            task: Some(tokio::spawn(task.run())),
        });
        id
    }

    /// Close the active connection.
    ///
    /// When this returns the heartbeat timer is gone, the close frame has been
    /// written and `on_close` has run. It does not wait for the gateway to
    /// acknowledge the close. Calling it again, or without a connection, does
    /// nothing.
    pub async fn disconnect(&mut self) {
        let Some(active) = self.active.as_mut() else {
            return;
        };

        if let Some(shutdown) = active.shutdown.take() {
            // Fails if the connection already ended on its own.
            let _ = shutdown.send(());
        }
        if let Some(task) = active.task.take() {
            if let Err(e) = task.await {
                tracing::error!("Gateway connection task failed: {}", e);
            }
        }
    }

    /// Current state; `Idle` before the first `connect`.
    pub fn state(&self) -> ConnectionState {
        self.active
            .as_ref()
            .map(|active| active.info.borrow().state)
            .unwrap_or(ConnectionState::Idle)
    }

    /// Snapshot of the current (or last) connection.
    pub fn info(&self) -> Option<ConnectionInfo> {
        self.active
            .as_ref()
            .map(|active| active.info.borrow().clone())
    }

    /// Sender for the active connection, if it has not closed.
    pub fn sender(&self) -> Option<GatewaySender> {
        self.active
            .as_ref()
            .map(|active| active.sender.clone())
            .filter(|sender| !sender.is_closed())
    }

    /// Wait until the current connection reaches `state` (or closes).
    ///
    /// Returns the state actually reached. Without a connection this returns
    /// `Idle` immediately.
    pub async fn wait_for(&self, state: ConnectionState) -> ConnectionState {
        let Some(active) = self.active.as_ref() else {
            return ConnectionState::Idle;
        };
        let mut info = active.info.clone();
        let result = info
            .wait_for(|info| info.state == state || info.state == ConnectionState::Closed)
            .await
            .map(|info| info.state);
        match result {
            Ok(reached) => reached,
            // Sender gone means the task finished, which always publishes Closed.
            Err(_) => info.borrow().state,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::ChannelHandler;
    use crate::test_util::MockConnector;

    fn test_gateway_config() -> GatewayConfig {
        GatewayConfig {
            url: "ws://localhost:8081/gateway".to_string(),
            ..GatewayConfig::default()
        }
    }

    #[test]
    fn test_gateway_client_creation() {
        let (handler, _events) = ChannelHandler::new();
        let client = GatewayClient::new(test_gateway_config(), Arc::new(handler));

        assert_eq!(client.state(), ConnectionState::Idle);
        assert!(client.info().is_none());
        assert!(client.sender().is_none());
    }

    #[tokio::test]
    async fn test_disconnect_without_connection_is_noop() {
        let (handler, mut events) = ChannelHandler::new();
        let mut client = GatewayClient::new(test_gateway_config(), Arc::new(handler));

        client.disconnect().await;
        client.disconnect().await;

        assert_eq!(client.state(), ConnectionState::Idle);
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_connect_uses_configured_endpoint() {
        let (connector, mut remotes) = MockConnector::new();
        let (handler, _events) = ChannelHandler::new();
        let mut client = GatewayClient::with_connector(
            test_gateway_config(),
            Arc::new(connector),
            Arc::new(handler),
        );

        let id = client.connect("token").await;
        let remote = remotes.recv().await.unwrap();

        assert_eq!(remote.url(), "ws://localhost:8081/gateway/?v=9&encoding=json");
        assert_eq!(client.info().unwrap().id, id);
        assert_eq!(client.state(), ConnectionState::Connecting);
        assert!(client.sender().is_some());
    }
}

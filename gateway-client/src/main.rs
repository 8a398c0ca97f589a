//! Gateway Client - connects to the push gateway and logs everything it sends.

use std::env;
use std::sync::Arc;

use gateway_client::{logging, ChannelHandler, Config, GatewayClient, GatewayEvent};

const VERSION: &str = env!("CARGO_PKG_VERSION");

fn print_version() {
    println!("gateway-client {}", VERSION);
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Handle --version / -V
    let args: Vec<String> = env::args().collect();
    if args.iter().any(|a| a == "--version" || a == "-V") {
        print_version();
        return Ok(());
    }

    // Load configuration
    let config = Config::load().map_err(|e| format!("Failed to load configuration: {}", e))?;
    logging::init(&config.logging.level);

    let token = config.gateway.token.clone().ok_or(
        "No gateway token configured. Set gateway.token in config.toml \
         or the GATEWAY__GATEWAY__TOKEN environment variable.",
    )?;

    let (handler, mut events) = ChannelHandler::new();
    let mut client = GatewayClient::new(config.gateway.clone(), Arc::new(handler));

    let connection_id = client.connect(token).await;
    tracing::info!(
        %connection_id,
        "Gateway client started, connecting to {}",
        config.gateway.endpoint()
    );

    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break };
                if log_event(&event) {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted, disconnecting");
                client.disconnect().await;
                // on_close has already run; drain whatever is left.
                while let Ok(event) = events.try_recv() {
                    log_event(&event);
                }
                break;
            }
        }
    }

    Ok(())
}

/// Log one event. Returns true once the connection has closed.
fn log_event(event: &GatewayEvent) -> bool {
    match event {
        GatewayEvent::Open { connection_id } => {
            tracing::info!(%connection_id, "Socket open");
        }
        GatewayEvent::Frame {
            connection_id,
            frame,
        } => {
            tracing::info!(
                %connection_id,
                op = frame.op,
                event = frame.t.as_deref().unwrap_or("-"),
                "Frame: {}",
                frame.d
            );
        }
        GatewayEvent::Error {
            connection_id,
            error,
        } => {
            tracing::error!(%connection_id, "Gateway error: {}", error);
        }
        GatewayEvent::Close {
            connection_id,
            code,
            reason,
        } => {
            tracing::info!(%connection_id, code, "Connection closed: {}", reason);
            return true;
        }
    }
    false
}

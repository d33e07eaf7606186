//! Chat Router - Entry Point
//!
//! Starts the TCP listener and ChatServer actor, accepting connections.

use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use chat_router::{serve, AppError, ChatServer, ServerConfig};

#[tokio::main]
async fn main() -> Result<(), AppError> {
    // Initialize logging with environment filter
    // Use RUST_LOG env var to control log level
    // e.g., RUST_LOG=debug or RUST_LOG=chat_router=trace
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("chat_router=info")),
        )
        .init();

    let config = ServerConfig::from_env()?;

    let listener = TcpListener::bind(&config.bind_addr).await?;
    info!("WebSocket Chat Router listening on {}", config.bind_addr);

    let (cmd_tx, cmd_rx) = mpsc::channel(config.command_buffer);
    tokio::spawn(ChatServer::new(cmd_rx).run());

    info!("ChatServer actor started");

    serve(listener, cmd_tx, config.client_buffer).await;

    Ok(())
}

//! WebSocket connection handler
//!
//! The connection lifecycle: accept, WebSocket handshake, registration
//! with the ChatServer, inbound event parsing, and exactly-once disconnect.

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

use crate::error::AppError;
use crate::message::{ClientMessage, ServerMessage};
use crate::server::ServerCommand;
use crate::types::ClientId;

/// Accept connections forever, spawning a handler task for each
pub async fn serve(
    listener: TcpListener,
    cmd_tx: mpsc::Sender<ServerCommand>,
    client_buffer: usize,
) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                info!("New connection from {}", addr);
                let cmd_tx = cmd_tx.clone();

                tokio::spawn(async move {
                    if let Err(e) = handle_connection(stream, cmd_tx, client_buffer).await {
                        error!("Connection handler error: {}", e);
                    }
                });
            }
            Err(e) => {
                error!("Failed to accept connection: {}", e);
            }
        }
    }
}

/// Handle a new TCP connection
///
/// Performs the WebSocket handshake, registers the client, and pumps
/// events in both directions until either side goes away.
pub async fn handle_connection(
    stream: TcpStream,
    cmd_tx: mpsc::Sender<ServerCommand>,
    client_buffer: usize,
) -> Result<(), AppError> {
    let peer_addr = stream
        .peer_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "unknown".to_string());

    debug!("New TCP connection from {}", peer_addr);

    // WebSocket handshake
    let ws_stream = tokio_tungstenite::accept_async(stream).await?;
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    let client_id = ClientId::new();
    info!("Client {} connected from {}", client_id, peer_addr);

    // Server -> client queue; the router only ever try_sends into it
    let (msg_tx, mut msg_rx) = mpsc::channel::<ServerMessage>(client_buffer);

    let mut guard = DisconnectGuard::new(client_id, cmd_tx.clone());

    // Register with ChatServer (it sends the welcome notice)
    if cmd_tx
        .send(ServerCommand::Connect {
            client_id,
            sender: msg_tx,
        })
        .await
        .is_err()
    {
        error!("Failed to register client {} - server closed", client_id);
        return Err(AppError::ChannelSend);
    }

    let cmd_tx_read = cmd_tx.clone();

    // Read task (WebSocket -> ServerCommand)
    let mut read_task = tokio::spawn(async move {
        while let Some(msg_result) = ws_receiver.next().await {
            match msg_result {
                Ok(Message::Text(text)) => match serde_json::from_str::<ClientMessage>(&text) {
                    Ok(event) => {
                        let cmd = ServerCommand::Dispatch { client_id, event };
                        if cmd_tx_read.send(cmd).await.is_err() {
                            debug!("Server closed, ending read task for {}", client_id);
                            break;
                        }
                    }
                    Err(e) => {
                        // Malformed events have no outbound effect
                        warn!("Dropping invalid event from {}: {}", client_id, e);
                    }
                },
                Ok(Message::Close(_)) => {
                    debug!("Client {} sent close frame", client_id);
                    break;
                }
                Ok(_) => {
                    // Binary, ping and pong frames - pong is handled by tungstenite
                }
                Err(e) => {
                    warn!("WebSocket error for {}: {}", client_id, e);
                    break;
                }
            }
        }
        debug!("Read task ended for {}", client_id);
    });

    // Write task (ServerMessage -> WebSocket)
    let mut write_task = tokio::spawn(async move {
        while let Some(msg) = msg_rx.recv().await {
            match serde_json::to_string(&msg) {
                Ok(json) => {
                    if ws_sender.send(Message::Text(json.into())).await.is_err() {
                        debug!("WebSocket send failed, ending write task");
                        break;
                    }
                }
                Err(e) => {
                    error!("Failed to serialize message: {}", e);
                }
            }
        }
        debug!("Write task ended for {}", client_id);

        let _ = ws_sender.close().await;
    });

    tokio::select! {
        _ = &mut read_task => {
            debug!("Read task completed for {}", client_id);
        }
        _ = &mut write_task => {
            debug!("Write task completed for {}", client_id);
        }
    }

    // The write task drains and closes once the router drops our sender
    read_task.abort();
    guard.disconnect().await;

    info!("Client {} disconnected", client_id);

    Ok(())
}

/// Issues the Disconnect command for a client exactly once
///
/// If the handler is dropped before `disconnect` runs (task cancelled or
/// panicked), `Drop` falls back to `try_send`. That path is best-effort:
/// with a full command queue the disconnect is lost and only logged.
struct DisconnectGuard {
    client_id: ClientId,
    cmd_tx: mpsc::Sender<ServerCommand>,
    sent: bool,
}

impl DisconnectGuard {
    fn new(client_id: ClientId, cmd_tx: mpsc::Sender<ServerCommand>) -> Self {
        Self {
            client_id,
            cmd_tx,
            sent: false,
        }
    }

    async fn disconnect(&mut self) {
        if self.sent {
            return;
        }
        self.sent = true;
        let _ = self
            .cmd_tx
            .send(ServerCommand::Disconnect {
                client_id: self.client_id,
            })
            .await;
    }
}

impl Drop for DisconnectGuard {
    fn drop(&mut self) {
        if !self.sent {
            self.sent = true;
            if let Err(e) = self.cmd_tx.try_send(ServerCommand::Disconnect {
                client_id: self.client_id,
            }) {
                warn!("Lost disconnect for {}: {}", self.client_id, e);
            }
        }
    }
}

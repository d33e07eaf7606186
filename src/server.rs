//! ChatServer Actor implementation
//!
//! The single task that owns the `EventRouter`. Connection handlers send it
//! commands over an mpsc channel, which serializes every registry and room
//! mutation without locks.

use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::message::{ClientMessage, ServerMessage};
use crate::router::EventRouter;
use crate::types::ClientId;

/// Commands sent from handlers to the ChatServer actor
#[derive(Debug)]
pub enum ServerCommand {
    /// New client connected
    Connect {
        client_id: ClientId,
        sender: mpsc::Sender<ServerMessage>,
    },
    /// Inbound event from a connected client
    Dispatch {
        client_id: ClientId,
        event: ClientMessage,
    },
    /// Client disconnected
    Disconnect { client_id: ClientId },
}

/// The main ChatServer actor
pub struct ChatServer {
    router: EventRouter,
    /// Command receiver channel
    receiver: mpsc::Receiver<ServerCommand>,
}

impl ChatServer {
    /// Create a new ChatServer with the given command receiver
    pub fn new(receiver: mpsc::Receiver<ServerCommand>) -> Self {
        Self {
            router: EventRouter::new(),
            receiver,
        }
    }

    /// Run the ChatServer event loop
    ///
    /// Continuously receives and processes commands until all senders are dropped.
    pub async fn run(mut self) {
        info!("ChatServer started");

        while let Some(cmd) = self.receiver.recv().await {
            self.handle_command(cmd);
        }

        let registry = self.router.registry();
        if !registry.is_empty() {
            warn!(
                "ChatServer shutting down with {} clients still registered",
                registry.len()
            );
        }
        info!("ChatServer shutting down");
    }

    /// Process a single command
    fn handle_command(&mut self, cmd: ServerCommand) {
        match cmd {
            ServerCommand::Connect { client_id, sender } => {
                if let Err(e) = self.router.connect(client_id, sender) {
                    warn!("Rejected connection {}: {}", client_id, e);
                }
            }
            ServerCommand::Dispatch { client_id, event } => {
                self.router.dispatch(client_id, event);
            }
            ServerCommand::Disconnect { client_id } => {
                self.router.disconnect(client_id);
            }
        }
    }
}

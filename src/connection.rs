//! Connection struct definition
//!
//! Represents one live client link with its state and outbound channel.

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::error::SendError;
use crate::message::ServerMessage;
use crate::types::{ClientId, RoomName};

/// Display name used until a join supplies one
pub const DEFAULT_DISPLAY_NAME: &str = "Anonymous";

/// Connected client information
#[derive(Debug)]
pub struct Connection {
    /// Unique identifier for this connection
    pub id: ClientId,
    /// Human-readable name
    pub display_name: String,
    /// Room currently occupied (None before first join)
    pub current_room: Option<RoomName>,
    /// Server → Client message channel
    pub sender: mpsc::Sender<ServerMessage>,
}

impl Connection {
    /// Create a new unjoined connection with the given ID and sender channel
    pub fn new(id: ClientId, sender: mpsc::Sender<ServerMessage>) -> Self {
        Self {
            id,
            display_name: DEFAULT_DISPLAY_NAME.to_string(),
            current_room: None,
            sender,
        }
    }

    /// Queue a message for this connection
    ///
    /// Never waits: a full queue is reported the same way as a closed one,
    /// so one slow client cannot stall the router.
    pub fn send(&self, msg: ServerMessage) -> Result<(), SendError> {
        self.sender.try_send(msg).map_err(|e| match e {
            TrySendError::Full(_) => SendError::ChannelFull,
            TrySendError::Closed(_) => SendError::ChannelClosed,
        })
    }
}

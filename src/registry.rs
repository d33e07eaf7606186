//! Connection registry
//!
//! Tracks every live connection and the single room it occupies.

use std::collections::HashMap;

use tokio::sync::mpsc;

use crate::connection::Connection;
use crate::error::AppError;
use crate::message::ServerMessage;
use crate::types::{ClientId, RoomName};

/// All live connections, keyed by id
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: HashMap<ClientId, Connection>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a freshly accepted connection
    ///
    /// The transport never reuses ids, so a duplicate is a programming error.
    pub fn register(
        &mut self,
        id: ClientId,
        sender: mpsc::Sender<ServerMessage>,
    ) -> Result<&Connection, AppError> {
        use std::collections::hash_map::Entry;

        match self.connections.entry(id) {
            Entry::Occupied(_) => Err(AppError::AlreadyRegistered(id)),
            Entry::Vacant(slot) => Ok(slot.insert(Connection::new(id, sender))),
        }
    }

    pub fn lookup(&self, id: ClientId) -> Option<&Connection> {
        self.connections.get(&id)
    }

    /// Update room and display name. Returns false if `id` is not registered.
    pub fn set_room(&mut self, id: ClientId, room: RoomName, display_name: String) -> bool {
        let Some(conn) = self.connections.get_mut(&id) else {
            return false;
        };
        conn.current_room = Some(room);
        conn.display_name = display_name;
        true
    }

    /// Remove a connection, returning its final state
    pub fn remove(&mut self, id: ClientId) -> Option<Connection> {
        self.connections.remove(&id)
    }

    pub fn display_name(&self, id: ClientId) -> Option<&str> {
        self.connections.get(&id).map(|c| c.display_name.as_str())
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}

//! Room directory
//!
//! Named sets of connections. Rooms are created on first join and
//! removed as soon as their last member leaves.

use std::collections::{HashMap, HashSet};
use std::time::Instant;

use tracing::debug;

use crate::types::{ClientId, RoomName};

/// A chat room with any number of members
#[derive(Debug)]
pub struct Room {
    /// Room name
    pub name: RoomName,
    /// Currently joined connections
    pub members: HashSet<ClientId>,
    /// Room creation time
    pub created_at: Instant,
}

impl Room {
    pub fn new(name: RoomName) -> Self {
        Self {
            name,
            members: HashSet::new(),
            created_at: Instant::now(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn contains(&self, client_id: ClientId) -> bool {
        self.members.contains(&client_id)
    }
}

/// All non-empty rooms, keyed by name
#[derive(Debug, Default)]
pub struct RoomDirectory {
    rooms: HashMap<RoomName, Room>,
}

impl RoomDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection to a room, creating the room if needed
    ///
    /// Returns true if the room was created.
    pub fn join(&mut self, name: &RoomName, client_id: ClientId) -> bool {
        let created = !self.rooms.contains_key(name);
        let room = self
            .rooms
            .entry(name.clone())
            .or_insert_with(|| Room::new(name.clone()));
        if created {
            debug!("Room {} created", name);
        }
        room.members.insert(client_id);
        debug!("Client {} joined room {}", client_id, name);
        created
    }

    /// Remove a connection from a room
    ///
    /// Returns true if the room was deleted (no members left).
    pub fn leave(&mut self, name: &RoomName, client_id: ClientId) -> bool {
        let Some(room) = self.rooms.get_mut(name) else {
            return false;
        };

        if !room.contains(client_id) {
            return false;
        }
        room.members.remove(&client_id);
        debug!("Client {} left room {}", client_id, name);

        if room.is_empty() {
            if let Some(room) = self.rooms.remove(name) {
                debug!(
                    "Room {} deleted (empty) after {:?}",
                    name,
                    room.created_at.elapsed()
                );
            }
            return true;
        }
        false
    }

    /// Copy of the member set (empty if the room does not exist)
    pub fn members(&self, name: &RoomName) -> HashSet<ClientId> {
        self.rooms
            .get(name)
            .map(|room| room.members.clone())
            .unwrap_or_default()
    }

    pub fn contains_room(&self, name: &RoomName) -> bool {
        self.rooms.contains_key(name)
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    pub fn member_count(&self, name: &RoomName) -> usize {
        self.rooms.get(name).map_or(0, |room| room.members.len())
    }
}

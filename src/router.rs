//! Event router
//!
//! The protocol state machine. Each connection moves through
//! `Unjoined -> InRoom(room) -> Removed`, and may switch rooms directly.
//! The router exclusively owns the connection registry and room directory;
//! callers serialize access to it (see `ChatServer`).

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::connection::DEFAULT_DISPLAY_NAME;
use crate::error::AppError;
use crate::message::{ChatMessage, ClientMessage, RoomUser, ServerMessage};
use crate::registry::ConnectionRegistry;
use crate::room::RoomDirectory;
use crate::types::{ClientId, RoomName};

/// Greeting sent to every new connection
pub const WELCOME_TEXT: &str =
    "Welcome to the Chat App! You can now send and receive messages in real-time.";

/// Name shown for room members missing from the registry
pub const UNKNOWN_USER_NAME: &str = "Unknown";

#[derive(Debug, Default)]
pub struct EventRouter {
    registry: ConnectionRegistry,
    rooms: RoomDirectory,
}

impl EventRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    pub fn rooms(&self) -> &RoomDirectory {
        &self.rooms
    }

    /// Register a new connection and greet it
    pub fn connect(
        &mut self,
        client_id: ClientId,
        sender: mpsc::Sender<ServerMessage>,
    ) -> Result<(), AppError> {
        self.registry.register(client_id, sender)?;
        info!("Client {} connected", client_id);
        debug!(
            "Total clients: {}, Total rooms: {}",
            self.registry.len(),
            self.rooms.room_count()
        );

        self.unicast(client_id, ChatMessage::system(WELCOME_TEXT, None).into());
        Ok(())
    }

    /// Process one inbound event from `client_id`
    pub fn dispatch(&mut self, client_id: ClientId, event: ClientMessage) {
        match event {
            ClientMessage::JoinRoom { room_id, user_name } => {
                self.handle_join(client_id, room_id.into(), user_name);
            }
            ClientMessage::Message { text } => {
                self.handle_message(client_id, text);
            }
            ClientMessage::Typing { is_typing, room_id } => {
                self.handle_typing(client_id, is_typing, room_id.into());
            }
            ClientMessage::PrivateMessage {
                target_user_id,
                text,
            } => {
                self.handle_private_message(client_id, &target_user_id, text);
            }
            ClientMessage::GetRoomUsers { room_id } => {
                self.handle_get_room_users(client_id, room_id.into());
            }
        }
    }

    /// Remove a connection and notify the room it vacated
    ///
    /// Returns false if the connection was already gone, in which case
    /// nothing else happens.
    pub fn disconnect(&mut self, client_id: ClientId) -> bool {
        let Some(conn) = self.registry.remove(client_id) else {
            debug!("Disconnect for unknown client {}", client_id);
            return false;
        };
        info!("Client {} disconnected", client_id);

        if let Some(room) = conn.current_room {
            self.rooms.leave(&room, client_id);
            let notice = ChatMessage::system(
                format!("{} left the chat", conn.display_name),
                Some(room.to_string()),
            );
            self.broadcast(&room, notice.into(), Some(client_id));
        }

        debug!(
            "Total clients: {}, Total rooms: {}",
            self.registry.len(),
            self.rooms.room_count()
        );
        true
    }

    /// Join `room`, leaving the current room first
    fn handle_join(&mut self, client_id: ClientId, room: RoomName, user_name: Option<String>) {
        let Some(conn) = self.registry.lookup(client_id) else {
            return;
        };
        let previous = conn.current_room.clone();

        let display_name = user_name
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| DEFAULT_DISPLAY_NAME.to_string());

        // At most one room per connection
        if let Some(old) = previous {
            self.rooms.leave(&old, client_id);
        }
        self.registry
            .set_room(client_id, room.clone(), display_name.clone());
        self.rooms.join(&room, client_id);

        info!("Client {} joined room {} as {}", client_id, room, display_name);

        let notice = ChatMessage::system(
            format!("{} joined the chat", display_name),
            Some(room.to_string()),
        );
        self.broadcast(&room, notice.into(), Some(client_id));
        self.unicast(
            client_id,
            ServerMessage::RoomJoined {
                room_id: room.to_string(),
                success: true,
            },
        );
    }

    /// Relay a chat message to the sender's room, echoing it back
    fn handle_message(&mut self, client_id: ClientId, text: String) {
        let Some(conn) = self.registry.lookup(client_id) else {
            return;
        };

        let Some(room) = conn.current_room.clone() else {
            let echo = ChatMessage::system(format!("Echo: {}", text), None);
            self.unicast(client_id, echo.into());
            return;
        };

        debug!("Message from {} in room {}: {}", conn.display_name, room, text);

        let msg: ServerMessage = ChatMessage::chat(
            text,
            client_id.to_string(),
            conn.display_name.clone(),
            room.to_string(),
        )
        .into();
        self.broadcast(&room, msg.clone(), Some(client_id));
        self.unicast(client_id, msg);
    }

    fn handle_typing(&mut self, client_id: ClientId, is_typing: bool, room: RoomName) {
        let Some(conn) = self.registry.lookup(client_id) else {
            return;
        };

        let notice = ServerMessage::UserTyping {
            user_id: client_id.to_string(),
            user_name: conn.display_name.clone(),
            is_typing,
        };
        self.broadcast(&room, notice, Some(client_id));
    }

    fn handle_private_message(&mut self, client_id: ClientId, target: &str, text: String) {
        let Ok(target_id) = target.parse::<ClientId>() else {
            debug!("Private message from {} to malformed id {:?}", client_id, target);
            return;
        };
        let (Some(sender), Some(recipient)) = (
            self.registry.lookup(client_id),
            self.registry.lookup(target_id),
        ) else {
            return;
        };

        let confirmation = ChatMessage::system(
            format!("Private message sent to {}: {}", recipient.display_name, text),
            None,
        );
        let msg = ChatMessage::private(text, client_id.to_string(), sender.display_name.clone());

        self.unicast(target_id, msg.into());
        self.unicast(client_id, confirmation.into());
    }

    fn handle_get_room_users(&mut self, client_id: ClientId, room: RoomName) {
        if !self.rooms.contains_room(&room) {
            debug!("Client {} asked for users of missing room {}", client_id, room);
        }
        let users = self
            .rooms
            .members(&room)
            .into_iter()
            .map(|id| RoomUser {
                id: id.to_string(),
                name: self
                    .registry
                    .display_name(id)
                    .unwrap_or(UNKNOWN_USER_NAME)
                    .to_string(),
            })
            .collect();

        self.unicast(
            client_id,
            ServerMessage::RoomUsers {
                room_id: room.to_string(),
                users,
            },
        );
    }

    /// Deliver to one connection; unknown or failing recipients are dropped
    fn unicast(&self, client_id: ClientId, msg: ServerMessage) {
        let Some(conn) = self.registry.lookup(client_id) else {
            return;
        };
        if let Err(e) = conn.send(msg) {
            warn!("Dropping event for {}: {}", client_id, e);
        }
    }

    /// Deliver to every member of `room` except `exclude`
    fn broadcast(&self, room: &RoomName, msg: ServerMessage, exclude: Option<ClientId>) {
        let members = self.rooms.members(room);
        for member in members {
            if Some(member) == exclude {
                continue;
            }
            self.unicast(member, msg.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    use tokio::sync::mpsc::Receiver;

    fn connect(router: &mut EventRouter) -> (ClientId, Receiver<ServerMessage>) {
        let (tx, mut rx) = mpsc::channel(32);
        let id = ClientId::new();
        router.connect(id, tx).unwrap();
        // welcome
        assert!(matches!(
            rx.try_recv().unwrap(),
            ServerMessage::Message(ChatMessage { ref text, .. }) if text == WELCOME_TEXT
        ));
        (id, rx)
    }

    fn drain(rx: &mut Receiver<ServerMessage>) -> Vec<ServerMessage> {
        let mut out = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            out.push(msg);
        }
        out
    }

    fn join(router: &mut EventRouter, id: ClientId, room: &str, name: &str) {
        router.dispatch(
            id,
            ClientMessage::JoinRoom {
                room_id: room.to_string(),
                user_name: Some(name.to_string()),
            },
        );
    }

    fn chat(msg: &ServerMessage) -> &ChatMessage {
        match msg {
            ServerMessage::Message(chat) => chat,
            other => panic!("Expected message, got {:?}", other),
        }
    }

    #[test]
    fn test_connect_twice_fails() {
        let mut router = EventRouter::new();
        let (tx, _rx) = mpsc::channel(8);
        let id = ClientId::new();
        router.connect(id, tx.clone()).unwrap();
        assert!(router.connect(id, tx).is_err());
    }

    #[test]
    fn test_join_acks_and_notifies_room() {
        let mut router = EventRouter::new();
        let (a, mut rx_a) = connect(&mut router);
        let (b, mut rx_b) = connect(&mut router);

        join(&mut router, a, "lobby", "Alice");
        assert_eq!(
            drain(&mut rx_a),
            vec![ServerMessage::RoomJoined {
                room_id: "lobby".to_string(),
                success: true
            }]
        );

        join(&mut router, b, "lobby", "Bob");
        let seen_by_a = drain(&mut rx_a);
        assert_eq!(seen_by_a.len(), 1);
        assert_eq!(chat(&seen_by_a[0]).text, "Bob joined the chat");
        assert_eq!(chat(&seen_by_a[0]).sender_id, "system");
        assert_eq!(chat(&seen_by_a[0]).room_id.as_deref(), Some("lobby"));

        // Bob only sees his ack, not his own join notice
        let seen_by_b = drain(&mut rx_b);
        assert_eq!(seen_by_b.len(), 1);
        assert!(matches!(seen_by_b[0], ServerMessage::RoomJoined { .. }));
    }

    #[test]
    fn test_join_defaults_to_anonymous() {
        let mut router = EventRouter::new();
        let (a, _rx_a) = connect(&mut router);
        let (b, _rx_b) = connect(&mut router);

        router.dispatch(
            a,
            ClientMessage::JoinRoom {
                room_id: "lobby".to_string(),
                user_name: None,
            },
        );
        join(&mut router, b, "lobby", "");

        assert_eq!(router.registry().display_name(a), Some("Anonymous"));
        assert_eq!(router.registry().display_name(b), Some("Anonymous"));
    }

    #[test]
    fn test_switching_rooms_leaves_old_room() {
        let mut router = EventRouter::new();
        let (a, _rx_a) = connect(&mut router);
        let (b, _rx_b) = connect(&mut router);
        let r1 = RoomName::from("r1");
        let r2 = RoomName::from("r2");

        join(&mut router, a, "r1", "Alice");
        join(&mut router, b, "r1", "Bob");
        join(&mut router, a, "r2", "Alice");

        assert_eq!(router.rooms().members(&r1), HashSet::from([b]));
        assert_eq!(router.rooms().members(&r2), HashSet::from([a]));
        assert_eq!(
            router.registry().lookup(a).unwrap().current_room,
            Some(r2.clone())
        );

        // Last member leaves r2 by switching: r2 disappears
        join(&mut router, a, "r1", "Alice");
        assert!(!router.rooms().contains_room(&r2));
        assert_eq!(router.rooms().member_count(&r1), 2);
    }

    #[test]
    fn test_message_relayed_with_echo() {
        let mut router = EventRouter::new();
        let (a, mut rx_a) = connect(&mut router);
        let (b, mut rx_b) = connect(&mut router);
        join(&mut router, a, "lobby", "Alice");
        join(&mut router, b, "lobby", "Bob");
        drain(&mut rx_a);
        drain(&mut rx_b);

        router.dispatch(a, ClientMessage::Message { text: "hi".to_string() });

        let to_b = drain(&mut rx_b);
        let echo = drain(&mut rx_a);
        assert_eq!(to_b.len(), 1);
        assert_eq!(echo, to_b);

        let msg = chat(&to_b[0]);
        assert_eq!(msg.text, "hi");
        assert_eq!(msg.sender_name.as_deref(), Some("Alice"));
        assert_eq!(msg.room_id.as_deref(), Some("lobby"));
        assert_eq!(msg.sender_id, a.to_string());
        assert!(!msg.is_private);
    }

    #[test]
    fn test_message_without_room_is_echoed_only() {
        let mut router = EventRouter::new();
        let (a, mut rx_a) = connect(&mut router);
        let (b, mut rx_b) = connect(&mut router);
        join(&mut router, b, "lobby", "Bob");
        drain(&mut rx_b);

        router.dispatch(a, ClientMessage::Message { text: "hi".to_string() });

        let echo = drain(&mut rx_a);
        assert_eq!(echo.len(), 1);
        assert_eq!(chat(&echo[0]).text, "Echo: hi");
        assert_eq!(chat(&echo[0]).sender_id, "system");
        assert!(drain(&mut rx_b).is_empty());
    }

    #[test]
    fn test_join_notice_precedes_message() {
        let mut router = EventRouter::new();
        let (a, _rx_a) = connect(&mut router);
        let (c, mut rx_c) = connect(&mut router);
        join(&mut router, c, "r1", "Carol");
        drain(&mut rx_c);

        join(&mut router, a, "r1", "Alice");
        router.dispatch(a, ClientMessage::Message { text: "hi".to_string() });

        let seen = drain(&mut rx_c);
        assert_eq!(seen.len(), 2);
        assert_eq!(chat(&seen[0]).text, "Alice joined the chat");
        assert_eq!(chat(&seen[1]).text, "hi");
    }

    #[test]
    fn test_typing_excludes_sender() {
        let mut router = EventRouter::new();
        let (a, mut rx_a) = connect(&mut router);
        let (b, mut rx_b) = connect(&mut router);
        join(&mut router, a, "lobby", "Alice");
        join(&mut router, b, "lobby", "Bob");
        drain(&mut rx_a);
        drain(&mut rx_b);

        router.dispatch(
            a,
            ClientMessage::Typing {
                is_typing: true,
                room_id: "lobby".to_string(),
            },
        );

        assert!(drain(&mut rx_a).is_empty());
        assert_eq!(
            drain(&mut rx_b),
            vec![ServerMessage::UserTyping {
                user_id: a.to_string(),
                user_name: "Alice".to_string(),
                is_typing: true,
            }]
        );
    }

    #[test]
    fn test_private_message() {
        let mut router = EventRouter::new();
        let (a, mut rx_a) = connect(&mut router);
        let (b, mut rx_b) = connect(&mut router);
        let (c, mut rx_c) = connect(&mut router);
        join(&mut router, a, "lobby", "Alice");
        join(&mut router, b, "other", "Bob");
        join(&mut router, c, "lobby", "Carol");
        drain(&mut rx_a);
        drain(&mut rx_b);
        drain(&mut rx_c);

        router.dispatch(
            a,
            ClientMessage::PrivateMessage {
                target_user_id: b.to_string(),
                text: "secret".to_string(),
            },
        );

        let to_b = drain(&mut rx_b);
        assert_eq!(to_b.len(), 1);
        let msg = chat(&to_b[0]);
        assert!(msg.is_private);
        assert_eq!(msg.text, "secret");
        assert_eq!(msg.sender_name.as_deref(), Some("Alice"));
        assert_eq!(msg.sender_id, a.to_string());

        let to_a = drain(&mut rx_a);
        assert_eq!(to_a.len(), 1);
        assert_eq!(chat(&to_a[0]).text, "Private message sent to Bob: secret");
        assert_eq!(chat(&to_a[0]).sender_id, "system");

        assert!(drain(&mut rx_c).is_empty());
    }

    #[test]
    fn test_private_message_to_missing_target_dropped() {
        let mut router = EventRouter::new();
        let (a, mut rx_a) = connect(&mut router);
        let (b, _rx_b) = connect(&mut router);
        router.disconnect(b);

        for target in [b.to_string(), "garbage".to_string()] {
            router.dispatch(
                a,
                ClientMessage::PrivateMessage {
                    target_user_id: target,
                    text: "secret".to_string(),
                },
            );
        }

        assert!(drain(&mut rx_a).is_empty());
    }

    #[test]
    fn test_get_room_users() {
        let mut router = EventRouter::new();
        let (a, mut rx_a) = connect(&mut router);
        let (b, _rx_b) = connect(&mut router);
        join(&mut router, a, "lobby", "Alice");
        join(&mut router, b, "lobby", "Bob");
        drain(&mut rx_a);

        router.dispatch(
            a,
            ClientMessage::GetRoomUsers {
                room_id: "lobby".to_string(),
            },
        );

        let seen = drain(&mut rx_a);
        let ServerMessage::RoomUsers { room_id, mut users } = seen[0].clone() else {
            panic!("Expected room users, got {:?}", seen);
        };
        users.sort_by(|x, y| x.name.cmp(&y.name));
        assert_eq!(room_id, "lobby");
        assert_eq!(
            users,
            vec![
                RoomUser {
                    id: a.to_string(),
                    name: "Alice".to_string()
                },
                RoomUser {
                    id: b.to_string(),
                    name: "Bob".to_string()
                },
            ]
        );
    }

    #[test]
    fn test_get_room_users_unregistered_member_is_unknown() {
        let mut router = EventRouter::new();
        let (a, mut rx_a) = connect(&mut router);
        let stray = ClientId::new();
        router.rooms.join(&"lobby".into(), stray);

        router.dispatch(
            a,
            ClientMessage::GetRoomUsers {
                room_id: "lobby".to_string(),
            },
        );

        assert_eq!(
            drain(&mut rx_a),
            vec![ServerMessage::RoomUsers {
                room_id: "lobby".to_string(),
                users: vec![RoomUser {
                    id: stray.to_string(),
                    name: "Unknown".to_string(),
                }],
            }]
        );
    }

    #[test]
    fn test_get_room_users_for_missing_room() {
        let mut router = EventRouter::new();
        let (a, mut rx_a) = connect(&mut router);

        router.dispatch(
            a,
            ClientMessage::GetRoomUsers {
                room_id: "lobby".to_string(),
            },
        );

        assert_eq!(
            drain(&mut rx_a),
            vec![ServerMessage::RoomUsers {
                room_id: "lobby".to_string(),
                users: vec![],
            }]
        );
    }

    #[test]
    fn test_disconnect_notifies_room() {
        let mut router = EventRouter::new();
        let (a, mut rx_a) = connect(&mut router);
        let (b, _rx_b) = connect(&mut router);
        join(&mut router, a, "lobby", "Alice");
        join(&mut router, b, "lobby", "Bob");
        drain(&mut rx_a);

        assert!(router.disconnect(b));

        let seen = drain(&mut rx_a);
        assert_eq!(seen.len(), 1);
        assert_eq!(chat(&seen[0]).text, "Bob left the chat");
        assert_eq!(chat(&seen[0]).room_id.as_deref(), Some("lobby"));
        assert_eq!(router.rooms().members(&"lobby".into()), HashSet::from([a]));
    }

    #[test]
    fn test_disconnect_is_idempotent() {
        let mut router = EventRouter::new();
        let (a, mut rx_a) = connect(&mut router);
        let (b, _rx_b) = connect(&mut router);
        join(&mut router, a, "lobby", "Alice");
        join(&mut router, b, "lobby", "Bob");
        drain(&mut rx_a);

        assert!(router.disconnect(b));
        assert!(!router.disconnect(b));

        assert_eq!(drain(&mut rx_a).len(), 1);
        assert_eq!(router.rooms().member_count(&"lobby".into()), 1);
        assert_eq!(router.registry().len(), 1);
    }

    #[test]
    fn test_last_disconnect_removes_room() {
        let mut router = EventRouter::new();
        let (a, _rx_a) = connect(&mut router);
        join(&mut router, a, "lobby", "Alice");

        router.disconnect(a);

        assert_eq!(router.rooms().room_count(), 0);
        assert!(router.registry().is_empty());
    }

    #[test]
    fn test_events_after_disconnect_are_dropped() {
        let mut router = EventRouter::new();
        let (a, mut rx_a) = connect(&mut router);
        let (b, mut rx_b) = connect(&mut router);
        join(&mut router, b, "lobby", "Bob");
        drain(&mut rx_b);
        router.disconnect(a);

        join(&mut router, a, "lobby", "Alice");
        router.dispatch(a, ClientMessage::Message { text: "hi".to_string() });

        assert!(drain(&mut rx_a).is_empty());
        assert!(drain(&mut rx_b).is_empty());
        assert_eq!(router.rooms().member_count(&"lobby".into()), 1);
    }

    #[test]
    fn test_failed_recipient_does_not_block_broadcast() {
        let mut router = EventRouter::new();
        let (a, _rx_a) = connect(&mut router);
        let (b, rx_b) = connect(&mut router);
        let (c, mut rx_c) = connect(&mut router);
        join(&mut router, a, "lobby", "Alice");
        join(&mut router, b, "lobby", "Bob");
        join(&mut router, c, "lobby", "Carol");
        drain(&mut rx_c);
        drop(rx_b);

        router.dispatch(a, ClientMessage::Message { text: "hi".to_string() });

        let seen = drain(&mut rx_c);
        assert_eq!(seen.len(), 1);
        assert_eq!(chat(&seen[0]).text, "hi");
        // Failed delivery does not change membership
        assert_eq!(router.rooms().member_count(&"lobby".into()), 3);
    }
}

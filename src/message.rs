//! Message protocol definitions
//!
//! JSON-based bidirectional event protocol using Serde's tagged enum
//! for type-safe serialization/deserialization. Event names are kebab-case,
//! payload fields camelCase.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Sender id used for server-generated notices
pub const SYSTEM_SENDER: &str = "system";

/// Client → Server event
///
/// Anything that does not deserialize into one of these variants
/// (unknown `type`, missing required field) is dropped at the boundary.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientMessage {
    /// Join (or switch to) a room under a display name
    #[serde(rename_all = "camelCase")]
    JoinRoom {
        room_id: String,
        #[serde(default)]
        user_name: Option<String>,
    },
    /// Send a chat message to the current room
    Message { text: String },
    /// Typing indicator for a room
    #[serde(rename_all = "camelCase")]
    Typing { is_typing: bool, room_id: String },
    /// Direct message to a single connection
    #[serde(rename_all = "camelCase")]
    PrivateMessage { target_user_id: String, text: String },
    /// Request the member list of a room
    #[serde(rename_all = "camelCase")]
    GetRoomUsers { room_id: String },
}

/// Server → Client event
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerMessage {
    /// Chat message or system notice
    Message(ChatMessage),
    /// Join acknowledgment
    #[serde(rename_all = "camelCase")]
    RoomJoined { room_id: String, success: bool },
    /// Another member started or stopped typing
    #[serde(rename_all = "camelCase")]
    UserTyping {
        user_id: String,
        user_name: String,
        is_typing: bool,
    },
    /// Room membership snapshot
    #[serde(rename_all = "camelCase")]
    RoomUsers { room_id: String, users: Vec<RoomUser> },
}

/// Payload shared by chat messages and system notices
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub text: String,
    pub sender_id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub room_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sender_name: Option<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub is_private: bool,
}

impl ChatMessage {
    /// Server-generated notice, optionally scoped to a room
    pub fn system(text: impl Into<String>, room_id: Option<String>) -> Self {
        Self {
            text: text.into(),
            sender_id: SYSTEM_SENDER.to_string(),
            timestamp: Utc::now(),
            room_id,
            sender_name: None,
            is_private: false,
        }
    }

    /// Message relayed from a connection to its room
    pub fn chat(text: String, sender_id: String, sender_name: String, room_id: String) -> Self {
        Self {
            text,
            sender_id,
            timestamp: Utc::now(),
            room_id: Some(room_id),
            sender_name: Some(sender_name),
            is_private: false,
        }
    }

    /// Direct message between two connections
    pub fn private(text: String, sender_id: String, sender_name: String) -> Self {
        Self {
            text,
            sender_id,
            timestamp: Utc::now(),
            room_id: None,
            sender_name: Some(sender_name),
            is_private: true,
        }
    }
}

impl From<ChatMessage> for ServerMessage {
    fn from(msg: ChatMessage) -> Self {
        ServerMessage::Message(msg)
    }
}

/// One entry of a room membership snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoomUser {
    pub id: String,
    pub name: String,
}

//! Room-based WebSocket Chat Router Library
//!
//! An in-memory, single-process chat router built with tokio-tungstenite
//! using the Actor pattern for state management.
//!
//! # Features
//! - Named rooms, created on first join and removed when empty
//! - Room chat with server-stamped echo to the sender
//! - Typing indicators
//! - Private messages between connections
//! - Room membership snapshots
//! - Join/leave presence notices
//!
//! # Architecture
//! Uses the Actor pattern with `mpsc` channels:
//! - `ChatServer` is the central actor; it owns the `EventRouter`, which in
//!   turn owns the `ConnectionRegistry` and `RoomDirectory`
//! - Each connection has a `handler` task communicating with the server
//! - No locks needed - all state access goes through message passing
//!
//! # Example
//! ```ignore
//! use tokio::net::TcpListener;
//! use tokio::sync::mpsc;
//! use chat_router::{serve, ChatServer};
//!
//! #[tokio::main]
//! async fn main() {
//!     let listener = TcpListener::bind("127.0.0.1:8080").await.unwrap();
//!     let (cmd_tx, cmd_rx) = mpsc::channel(256);
//!
//!     tokio::spawn(ChatServer::new(cmd_rx).run());
//!     serve(listener, cmd_tx, 32).await;
//! }
//! ```

pub mod config;
pub mod connection;
pub mod error;
pub mod handler;
pub mod message;
pub mod registry;
pub mod room;
pub mod router;
pub mod server;
pub mod types;

// Re-export main types for convenience
pub use config::ServerConfig;
pub use connection::Connection;
pub use error::{AppError, SendError};
pub use handler::{handle_connection, serve};
pub use message::{ChatMessage, ClientMessage, RoomUser, ServerMessage};
pub use registry::ConnectionRegistry;
pub use room::{Room, RoomDirectory};
pub use router::EventRouter;
pub use server::{ChatServer, ServerCommand};
pub use types::{ClientId, RoomName};

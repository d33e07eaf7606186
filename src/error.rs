//! Error types for the chat router
//!
//! Defines application-level errors and message send errors.
//! Uses thiserror for ergonomic error definitions.

use thiserror::Error;

use crate::types::ClientId;

/// Application-level errors
///
/// None of these are ever shown to clients: the router drops events it
/// cannot act on, and these only surface from the transport and startup paths.
#[derive(Debug, Error)]
pub enum AppError {
    /// WebSocket protocol error (fatal for the connection)
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// IO error (bind failure is fatal at startup)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Channel send error (fatal - internal channel broken)
    #[error("Channel send error")]
    ChannelSend,

    /// A connection id was registered twice
    #[error("Client already registered: {0}")]
    AlreadyRegistered(ClientId),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Message send errors
///
/// Occurs when an outbound event cannot be queued for a recipient.
#[derive(Debug, Error)]
pub enum SendError {
    /// The receiving end of the channel has been closed
    #[error("Channel closed")]
    ChannelClosed,

    /// The recipient is not draining its queue fast enough
    #[error("Channel full")]
    ChannelFull,
}

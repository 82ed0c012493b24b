//! Error types for the chat server and client
//!
//! Defines application-level errors, registration rejections and
//! per-recipient delivery errors. Uses thiserror for ergonomic error definitions.

use thiserror::Error;

/// Application-level errors
///
/// `Bind` and `Accept` are fatal for the whole server. Everything else is
/// scoped to one connection and ends only that connection.
#[derive(Debug, Error)]
pub enum AppError {
    /// WebSocket protocol error
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// JSON serialization/deserialization error
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Listener could not be created (fatal, aborts startup)
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// accept() failed while the server was still supposed to be running
    #[error("Accept failed: {0}")]
    Accept(#[source] std::io::Error),

    /// Peer closed the connection or the stream ended
    #[error("Connection closed by peer")]
    Disconnected,

    /// Frame could not be turned into text
    #[error("Undecodable frame: {0}")]
    Decode(String),

    /// Channel send error (internal channel broken)
    #[error("Channel send error")]
    ChannelSend,

    /// Server answered the registration with the failure token
    #[error("Registration rejected by server")]
    RegistrationRejected,
}

/// Reasons the server refuses a registration attempt
///
/// Every variant is answered with the same `>>failed<<` reply on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RegistrationError {
    /// User ID is empty or whitespace only
    #[error("user ID is empty or blank")]
    BlankUserId,

    /// First message was not the registration token
    #[error("missing registration token")]
    BadToken,

    /// Address and user ID pair is already registered
    #[error("address and user ID already registered")]
    Duplicate,

    /// Registry is at capacity
    #[error("too many clients")]
    Full,

    /// Listener has already been told to stop
    #[error("server is shutting down")]
    ShuttingDown,
}

/// Delivery errors for a single recipient
///
/// Occurs when a broadcast cannot be queued for one connection's writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SendError {
    /// The recipient's outbound queue is full (slow or stalled peer)
    #[error("Outbound queue full")]
    QueueFull,

    /// The receiving end of the channel has been closed
    #[error("Channel closed")]
    ChannelClosed,
}

//! Broadcast Chat Server Library
//!
//! A small broadcast chat over WebSocket built with tokio-tungstenite.
//! Clients register with a short user ID, send text, and receive every
//! registered client's messages in real time.
//!
//! # Protocol
//! - Client → Server: `{"clientUserID": "...", "message": "..."}`
//! - Server → Client: `{"clientIP": "...", "clientUserID": "...", "message": "..."}`
//! - The first message must be `>>hello<<`; the server answers `>>success<<`
//!   or `>>failed<<`. `>>bye<<` leaves the chat.
//!
//! # Architecture
//! - `Registry` is the only shared mutable state, behind one mutex
//! - Each connection has a `handler` task running the registration/message/quit protocol
//! - Handlers push broadcasts into a queue; a single `Broadcaster` fans them out
//! - `ShutdownMonitor` stops the listener once the last client has left
//!
//! # Example
//! ```ignore
//! use broadcast_chat::{ChatServer, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), broadcast_chat::AppError> {
//!     let server = ChatServer::bind(ServerConfig::default()).await?;
//!     server.run().await
//! }
//! ```

pub mod broadcaster;
pub mod client;
pub mod config;
pub mod error;
pub mod handler;
pub mod message;
pub mod monitor;
pub mod registry;
pub mod server;
pub mod split;
pub mod types;

// Re-export main types for convenience
pub use broadcaster::Broadcaster;
pub use client::{format_line, timestamp, ChatClient, ChatView, Direction, History};
pub use config::ServerConfig;
pub use error::{AppError, RegistrationError, SendError};
pub use handler::handle_connection;
pub use message::{Broadcast, ClientMessage};
pub use monitor::ShutdownMonitor;
pub use registry::{ClientEntry, Registry, SharedRegistry};
pub use server::ChatServer;
pub use types::HandlerId;

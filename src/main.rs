//! Broadcast Chat Server - Entry Point
//!
//! Binds the listener and serves until the last client has left.

use std::env;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use broadcast_chat::{ChatServer, ServerConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging with environment filter
    // Use RUST_LOG env var to control log level
    // e.g., RUST_LOG=debug or RUST_LOG=broadcast_chat=trace
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("broadcast_chat=info")),
        )
        .init();

    // Get bind address from command line or use default
    let mut config = ServerConfig::default();
    if let Some(addr) = env::args().nth(1) {
        config = config.with_addr(addr);
    }

    let server = ChatServer::bind(config).await.map_err(|e| {
        error!("Server setup failed: {}", e);
        e
    })?;
    info!("Broadcast Chat Server listening on {}", server.local_addr()?);

    server.run().await?;

    info!("Server stopped");
    Ok(())
}

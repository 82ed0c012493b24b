//! ChatServer: listener and task orchestration
//!
//! Owns the listening socket, the shared registry and the broadcast queue.
//! The accept loop spawns one handler per connection and, on the first
//! accepted connection, the broadcaster and the shutdown monitor.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::broadcaster::{broadcast_channel, BroadcastReceiver, Broadcaster};
use crate::config::ServerConfig;
use crate::error::AppError;
use crate::handler::{handle_connection, ConnectionContext};
use crate::monitor::ShutdownMonitor;
use crate::registry::{Registry, SharedRegistry};

/// The chat server
///
/// Created by [`ChatServer::bind`], consumed by [`ChatServer::run`].
pub struct ChatServer {
    listener: TcpListener,
    config: ServerConfig,
    registry: SharedRegistry,
    ctx: ConnectionContext,
    /// Taken when the broadcaster starts, so it can only start once
    queue: Option<BroadcastReceiver>,
    shutdown: Arc<Notify>,
}

impl ChatServer {
    /// Bind the listener and create the shared state
    pub async fn bind(config: ServerConfig) -> Result<Self, AppError> {
        let listener = TcpListener::bind(&config.addr)
            .await
            .map_err(|source| AppError::Bind {
                addr: config.addr.clone(),
                source,
            })?;

        let registry = Registry::shared(config.capacity);
        let (broadcasts, queue) = broadcast_channel(config.broadcast_queue_size);
        let ctx = ConnectionContext {
            registry: registry.clone(),
            broadcasts,
            client_queue_size: config.client_queue_size,
        };

        Ok(Self {
            listener,
            config,
            registry,
            ctx,
            queue: Some(queue),
            shutdown: Arc::new(Notify::new()),
        })
    }

    /// Address the listener is bound to
    pub fn local_addr(&self) -> Result<SocketAddr, AppError> {
        Ok(self.listener.local_addr()?)
    }

    /// Shared registry, for inspection
    pub fn registry(&self) -> SharedRegistry {
        self.registry.clone()
    }

    /// Run the accept loop until the last client has left
    ///
    /// Returns `Ok` once the shutdown monitor has stopped the listener and the
    /// background tasks have finished. An accept failure while the server is
    /// still running is returned as [`AppError::Accept`].
    pub async fn run(mut self) -> Result<(), AppError> {
        info!("ChatServer started");

        let mut workers: Vec<JoinHandle<()>> = Vec::new();
        let mut result = Ok(());

        loop {
            if !self.registry.lock().await.is_running() {
                break;
            }

            tokio::select! {
                _ = self.shutdown.notified() => {
                    debug!("Listener received shutdown signal");
                    break;
                }
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, addr)) => {
                        info!("New connection from {}", addr);

                        if let Some(queue) = self.queue.take() {
                            workers.extend(self.start_workers(queue));
                        }

                        let ctx = self.ctx.clone();
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(stream, ctx).await {
                                debug!("Connection from {} ended: {}", addr, e);
                            }
                        });
                    }
                    Err(e) => {
                        if self.registry.lock().await.is_running() {
                            error!("Failed to accept connection: {}", e);
                            result = Err(AppError::Accept(e));
                        }
                        break;
                    }
                },
            }
        }

        // Stop listening before waiting for the workers
        drop(self.listener);
        for worker in workers {
            if let Err(e) = worker.await {
                error!("Background task failed: {}", e);
            }
        }

        info!("ChatServer shutting down");
        result
    }

    /// Start the broadcaster and the shutdown monitor
    fn start_workers(&self, queue: BroadcastReceiver) -> [JoinHandle<()>; 2] {
        let interval = self.config.poll_interval;
        let broadcaster = Broadcaster::new(self.registry.clone(), queue, interval);
        let monitor = ShutdownMonitor::new(self.registry.clone(), self.shutdown.clone(), interval);
        debug!("Starting broadcaster and shutdown monitor");
        [tokio::spawn(broadcaster.run()), tokio::spawn(monitor.run())]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bind_ephemeral_port() {
        let server = ChatServer::bind(ServerConfig::default().with_addr("127.0.0.1:0"))
            .await
            .unwrap();
        let addr = server.local_addr().unwrap();
        assert_ne!(addr.port(), 0);
        assert_eq!(server.registry().lock().await.size(), 0);
        assert!(server.queue.is_some());
    }

    #[tokio::test]
    async fn test_bind_failure_is_setup_error() {
        let first = ChatServer::bind(ServerConfig::default().with_addr("127.0.0.1:0"))
            .await
            .unwrap();
        let taken = first.local_addr().unwrap().to_string();

        let second = ChatServer::bind(ServerConfig::default().with_addr(taken.clone())).await;
        match second {
            Err(AppError::Bind { addr, .. }) => assert_eq!(addr, taken),
            Err(e) => panic!("unexpected error: {e}"),
            Ok(_) => panic!("second bind on {taken} should fail"),
        }
    }
}

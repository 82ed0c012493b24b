//! Shutdown watchdog
//!
//! Arms once the first client registers, then stops the listener as soon as
//! the registry is empty again. Arming follows the registry's own latch, so a
//! client that registers and quits within one poll interval still arms it.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tracing::info;

use crate::registry::{wait_until_armed, SharedRegistry};

pub struct ShutdownMonitor {
    registry: SharedRegistry,
    shutdown: Arc<Notify>,
    poll_interval: Duration,
}

impl ShutdownMonitor {
    /// `shutdown` is notified once the last client has left
    pub fn new(registry: SharedRegistry, shutdown: Arc<Notify>, poll_interval: Duration) -> Self {
        Self {
            registry,
            shutdown,
            poll_interval,
        }
    }

    pub async fn run(self) {
        wait_until_armed(&self.registry, self.poll_interval).await;
        info!("Shutdown monitor armed");

        loop {
            {
                let mut registry = self.registry.lock().await;
                if registry.size() == 0 {
                    registry.set_running(false);
                    break;
                }
            }
            tokio::time::sleep(self.poll_interval).await;
        }

        info!("All clients disconnected, stopping listener");
        // notify_one keeps a permit, so the listener cannot miss it
        self.shutdown.notify_one();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{ClientEntry, Registry};
    use crate::types::HandlerId;
    use tokio::sync::mpsc;
    use tokio::time::timeout;

    #[tokio::test]
    async fn test_shutdown_after_last_client_leaves() {
        let registry = Registry::shared(10);
        let shutdown = Arc::new(Notify::new());
        let monitor = ShutdownMonitor::new(registry.clone(), shutdown.clone(), Duration::from_millis(5));
        let task = tokio::spawn(monitor.run());

        // Not armed yet: an empty registry does not trigger shutdown.
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(!task.is_finished());
        assert!(registry.lock().await.is_running());

        let (tx, _rx) = mpsc::channel(1);
        let id = HandlerId::new();
        registry
            .lock()
            .await
            .add(ClientEntry::new(id, "127.0.0.1".into(), "a".into(), tx))
            .unwrap();

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(!task.is_finished());

        registry.lock().await.remove_handler(id);

        timeout(Duration::from_secs(1), shutdown.notified())
            .await
            .expect("shutdown should be signalled");
        timeout(Duration::from_secs(1), task).await.unwrap().unwrap();
        assert!(!registry.lock().await.is_running());
    }

    #[tokio::test]
    async fn test_client_leaving_between_polls_still_stops_server() {
        let registry = Registry::shared(10);
        let shutdown = Arc::new(Notify::new());
        let interval = Duration::from_millis(200);
        let monitor = ShutdownMonitor::new(registry.clone(), shutdown.clone(), interval);
        let task = tokio::spawn(monitor.run());

        // Register and leave well inside the first poll interval
        tokio::time::sleep(Duration::from_millis(10)).await;
        let (tx, _rx) = mpsc::channel(1);
        let id = HandlerId::new();
        {
            let mut guard = registry.lock().await;
            guard
                .add(ClientEntry::new(id, "127.0.0.1".into(), "a".into(), tx))
                .unwrap();
            guard.remove_handler(id);
        }

        timeout(interval * 5, shutdown.notified())
            .await
            .expect("shutdown should be signalled within a few intervals");
        timeout(Duration::from_secs(1), task).await.unwrap().unwrap();
        assert!(!registry.lock().await.is_running());
    }
}

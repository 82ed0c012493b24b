//! Broadcast fan-out worker
//!
//! Connection handlers push broadcasts into a shared FIFO; a single
//! broadcaster pops them and delivers each one to every registered client.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, info};

use crate::message::Broadcast;
use crate::registry::{wait_until_armed, SharedRegistry};

/// Producer side of the broadcast queue, cloned into every handler
pub type BroadcastSender = mpsc::Sender<Broadcast>;

/// Consumer side of the broadcast queue, owned by the broadcaster
pub type BroadcastReceiver = mpsc::Receiver<Broadcast>;

/// Create the bounded broadcast queue
pub fn broadcast_channel(size: usize) -> (BroadcastSender, BroadcastReceiver) {
    mpsc::channel(size)
}

/// The single consumer of the broadcast queue
pub struct Broadcaster {
    registry: SharedRegistry,
    queue: BroadcastReceiver,
    poll_interval: Duration,
}

impl Broadcaster {
    pub fn new(registry: SharedRegistry, queue: BroadcastReceiver, poll_interval: Duration) -> Self {
        Self {
            registry,
            queue,
            poll_interval,
        }
    }

    /// Run until the server stops running or every producer is gone
    ///
    /// Nothing happens before the first client has registered. The stop
    /// condition is the registry's `running` flag, the same one that stops the
    /// listener, so a registry that empties and refills between polls keeps
    /// its broadcaster. Each wait for the next broadcast is capped at one poll
    /// interval so a stop is noticed promptly even when the queue is idle.
    pub async fn run(mut self) {
        wait_until_armed(&self.registry, self.poll_interval).await;
        info!("Broadcaster started");

        loop {
            if !self.registry.lock().await.is_running() {
                debug!("Server stopped, broadcaster stopping");
                break;
            }

            match timeout(self.poll_interval, self.queue.recv()).await {
                Ok(Some(bcast)) => {
                    let registry = self.registry.lock().await;
                    debug!(
                        "Broadcasting '{}' from '{}' to {} clients",
                        bcast.message,
                        bcast.client_user_id,
                        registry.size()
                    );
                    registry.fan_out(&bcast);
                }
                Ok(None) => {
                    debug!("Broadcast queue closed");
                    break;
                }
                // Nothing queued this interval
                Err(_) => {}
            }
        }

        info!("Broadcaster stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{ClientEntry, Registry};
    use crate::types::HandlerId;

    const INTERVAL: Duration = Duration::from_millis(5);

    async fn add_client(registry: &SharedRegistry, user_id: &str) -> (HandlerId, mpsc::Receiver<Broadcast>) {
        let (tx, rx) = mpsc::channel(8);
        let id = HandlerId::new();
        registry
            .lock()
            .await
            .add(ClientEntry::new(id, "127.0.0.1".into(), user_id.into(), tx))
            .unwrap();
        (id, rx)
    }

    #[tokio::test]
    async fn test_delivers_in_queue_order_to_all_clients() {
        let registry = Registry::shared(10);
        let (_a, mut rx_a) = add_client(&registry, "a").await;
        let (_b, mut rx_b) = add_client(&registry, "b").await;

        let (tx, rx) = broadcast_channel(16);
        let task = tokio::spawn(Broadcaster::new(registry.clone(), rx, INTERVAL).run());

        let first = Broadcast::new("127.0.0.1", "a", "first");
        let second = Broadcast::new("127.0.0.1", "b", "second");
        tx.send(first.clone()).await.unwrap();
        tx.send(second.clone()).await.unwrap();

        for rx in [&mut rx_a, &mut rx_b] {
            let got = timeout(Duration::from_secs(1), rx.recv()).await.unwrap();
            assert_eq!(got, Some(first.clone()));
            let got = timeout(Duration::from_secs(1), rx.recv()).await.unwrap();
            assert_eq!(got, Some(second.clone()));
        }

        drop(tx);
        timeout(Duration::from_secs(1), task).await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_removed_client_receives_nothing() {
        let registry = Registry::shared(10);
        let (_a, mut rx_a) = add_client(&registry, "a").await;
        let (b, mut rx_b) = add_client(&registry, "b").await;
        registry.lock().await.remove_handler(b);

        let (tx, rx) = broadcast_channel(16);
        let _task = tokio::spawn(Broadcaster::new(registry.clone(), rx, INTERVAL).run());

        let bcast = Broadcast::new("127.0.0.1", "a", "only a");
        tx.send(bcast.clone()).await.unwrap();

        let got = timeout(Duration::from_secs(1), rx_a.recv()).await.unwrap();
        assert_eq!(got, Some(bcast));
        // The entry (and its sender) is gone, so b's queue is closed and empty.
        assert_eq!(rx_b.recv().await, None);
    }

    #[tokio::test]
    async fn test_stops_when_server_stops() {
        let registry = Registry::shared(10);
        let (a, _rx_a) = add_client(&registry, "a").await;

        let (_tx, rx) = broadcast_channel(16);
        let task = tokio::spawn(Broadcaster::new(registry.clone(), rx, INTERVAL).run());

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!task.is_finished());

        {
            let mut guard = registry.lock().await;
            guard.remove_handler(a);
            guard.set_running(false);
        }
        timeout(Duration::from_secs(1), task)
            .await
            .expect("broadcaster should stop once the server stops")
            .unwrap();
    }

    #[tokio::test]
    async fn test_survives_registry_emptying_while_running() {
        let registry = Registry::shared(10);
        let (a, _rx_a) = add_client(&registry, "a").await;

        let (tx, rx) = broadcast_channel(16);
        let task = tokio::spawn(Broadcaster::new(registry.clone(), rx, INTERVAL).run());
        tokio::time::sleep(Duration::from_millis(20)).await;

        // Last client leaves and a new one arrives before anyone stops the server
        registry.lock().await.remove_handler(a);
        tokio::time::sleep(INTERVAL * 4).await;
        assert!(!task.is_finished());
        let (_b, mut rx_b) = add_client(&registry, "b").await;

        let bcast = Broadcast::new("127.0.0.1", "b", "still broadcasting");
        tx.send(bcast.clone()).await.unwrap();
        let got = timeout(Duration::from_secs(1), rx_b.recv()).await.unwrap();
        assert_eq!(got, Some(bcast));
    }
}

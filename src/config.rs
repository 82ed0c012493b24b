//! Server configuration
//!
//! Defaults mirror the deployment the protocol was designed for: a fixed port,
//! a ten-slot client table and a 10 ms watcher interval.

use std::time::Duration;

/// Default server address
pub const DEFAULT_ADDR: &str = "0.0.0.0:30000";

/// Maximum concurrently registered clients
pub const DEFAULT_CAPACITY: usize = 10;

/// Idle interval of the broadcaster and shutdown monitor
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Channel buffer size for the shared broadcast queue
pub const BROADCAST_QUEUE_SIZE: usize = 256;

/// Channel buffer size for each connection's outbound queue
pub const CLIENT_QUEUE_SIZE: usize = 32;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address the listener binds to
    pub addr: String,
    /// Registry capacity
    pub capacity: usize,
    /// Watcher wake-up interval; bounds shutdown and broadcast latency
    pub poll_interval: Duration,
    /// Broadcasts that may be queued ahead of the broadcaster
    pub broadcast_queue_size: usize,
    /// Frames that may be queued for one slow recipient before deliveries to it fail
    pub client_queue_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: DEFAULT_ADDR.to_string(),
            capacity: DEFAULT_CAPACITY,
            poll_interval: DEFAULT_POLL_INTERVAL,
            broadcast_queue_size: BROADCAST_QUEUE_SIZE,
            client_queue_size: CLIENT_QUEUE_SIZE,
        }
    }
}

impl ServerConfig {
    pub fn with_addr(mut self, addr: impl Into<String>) -> Self {
        self.addr = addr.into();
        self
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.addr, "0.0.0.0:30000");
        assert_eq!(config.capacity, 10);
        assert_eq!(config.poll_interval, Duration::from_millis(10));
    }

    #[test]
    fn test_builders() {
        let config = ServerConfig::default()
            .with_addr("127.0.0.1:0")
            .with_capacity(2)
            .with_poll_interval(Duration::from_millis(5));
        assert_eq!(config.addr, "127.0.0.1:0");
        assert_eq!(config.capacity, 2);
        assert_eq!(config.poll_interval, Duration::from_millis(5));
        assert_eq!(config.client_queue_size, CLIENT_QUEUE_SIZE);
    }
}

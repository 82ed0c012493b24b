//! Shared client registry
//!
//! The table of registered clients, the server-running flag and the armed
//! latch recording that a client has ever registered. The registry
//! itself is a plain struct; it is shared as [`SharedRegistry`] and every read
//! or write goes through that one mutex. Compound operations such as
//! find-then-add are exposed as single methods so callers cannot split them
//! across two critical sections.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};
use tracing::{debug, warn};

use crate::error::{RegistrationError, SendError};
use crate::message::{Broadcast, REGISTER_TOKEN};
use crate::types::HandlerId;

/// Registry shared between handlers, broadcaster, monitor and listener
pub type SharedRegistry = Arc<Mutex<Registry>>;

/// One registered client
///
/// Created on successful registration and never modified afterwards.
#[derive(Debug)]
pub struct ClientEntry {
    /// Connection handler that owns this entry
    pub handler_id: HandlerId,
    /// Peer IP address
    pub address: String,
    /// User ID given at registration
    pub user_id: String,
    /// Server → Client frame queue, drained by the connection's writer task
    pub connection: mpsc::Sender<Broadcast>,
}

impl ClientEntry {
    pub fn new(
        handler_id: HandlerId,
        address: String,
        user_id: String,
        connection: mpsc::Sender<Broadcast>,
    ) -> Self {
        Self {
            handler_id,
            address,
            user_id,
            connection,
        }
    }

    /// Queue a broadcast for this client without waiting
    ///
    /// Fails if the client's queue is full (stalled peer) or its writer is gone.
    pub fn send(&self, bcast: &Broadcast) -> Result<(), SendError> {
        self.connection
            .try_send(bcast.clone())
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => SendError::QueueFull,
                mpsc::error::TrySendError::Closed(_) => SendError::ChannelClosed,
            })
    }
}

/// Ordered, capacity-bounded table of registered clients
#[derive(Debug)]
pub struct Registry {
    clients: Vec<ClientEntry>,
    capacity: usize,
    running: bool,
    /// Set by the first successful add and never cleared
    armed: bool,
}

impl Registry {
    /// Create an empty, running registry
    pub fn new(capacity: usize) -> Self {
        Self {
            clients: Vec::with_capacity(capacity),
            capacity,
            running: true,
            armed: false,
        }
    }

    /// Create an empty registry behind the shared lock
    pub fn shared(capacity: usize) -> SharedRegistry {
        Arc::new(Mutex::new(Self::new(capacity)))
    }

    /// Index of the entry registered with this address and user ID
    pub fn find(&self, address: &str, user_id: &str) -> Option<usize> {
        self.clients
            .iter()
            .position(|c| c.address == address && c.user_id == user_id)
    }

    /// Index of the entry owned by this handler
    pub fn find_by_handler(&self, handler_id: HandlerId) -> Option<usize> {
        self.clients.iter().position(|c| c.handler_id == handler_id)
    }

    /// Append an entry. At capacity nothing is changed and `Full` is returned.
    ///
    /// The first successful add arms the registry.
    pub fn add(&mut self, entry: ClientEntry) -> Result<(), RegistrationError> {
        if self.clients.len() >= self.capacity {
            return Err(RegistrationError::Full);
        }
        self.clients.push(entry);
        self.armed = true;
        Ok(())
    }

    /// Remove the entry at `index`, shifting later entries left.
    ///
    /// Relative order of the remaining entries is kept. Out-of-range indices
    /// are ignored.
    pub fn remove(&mut self, index: usize) -> Option<ClientEntry> {
        if index < self.clients.len() {
            Some(self.clients.remove(index))
        } else {
            None
        }
    }

    pub fn size(&self) -> usize {
        self.clients.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn set_running(&mut self, running: bool) {
        self.running = running;
    }

    /// Whether any client has ever been added, even if it has since left
    pub fn is_armed(&self) -> bool {
        self.armed
    }

    /// Entries in registration order
    pub fn entries(&self) -> impl Iterator<Item = &ClientEntry> {
        self.clients.iter()
    }

    /// Decide a registration attempt and add the entry on success.
    ///
    /// `text` is the message the connection opened with. The duplicate check
    /// and the insert happen in this one call, so holding the lock for it
    /// makes find-then-add atomic.
    pub fn register(&mut self, entry: ClientEntry, text: &str) -> Result<(), RegistrationError> {
        if !self.running {
            return Err(RegistrationError::ShuttingDown);
        }
        if entry.user_id.trim().is_empty() {
            return Err(RegistrationError::BlankUserId);
        }
        if text != REGISTER_TOKEN {
            return Err(RegistrationError::BadToken);
        }
        if self.find(&entry.address, &entry.user_id).is_some() {
            return Err(RegistrationError::Duplicate);
        }
        self.add(entry)
    }

    /// Remove the entry owned by `handler_id`, if it is still present
    ///
    /// Calling this twice for the same handler is a no-op the second time.
    pub fn remove_handler(&mut self, handler_id: HandlerId) -> Option<ClientEntry> {
        let index = self.find_by_handler(handler_id)?;
        self.remove(index)
    }

    /// Deliver a broadcast to every entry in registry order
    ///
    /// A failed delivery is logged and skipped; the stale entry is removed
    /// later by its own handler. Returns the number of successful deliveries.
    pub fn fan_out(&self, bcast: &Broadcast) -> usize {
        let mut delivered = 0;
        for client in &self.clients {
            match client.send(bcast) {
                Ok(()) => delivered += 1,
                Err(e) => warn!(
                    "Delivery to '{}' at {} failed: {}",
                    client.user_id, client.address, e
                ),
            }
        }
        debug!("Broadcast delivered to {}/{} clients", delivered, self.clients.len());
        delivered
    }
}

/// Idle until the first client has registered
///
/// Watches the armed latch rather than the current size, so a client that
/// registers and leaves between two polls still counts.
pub async fn wait_until_armed(registry: &SharedRegistry, poll_interval: Duration) {
    loop {
        if registry.lock().await.is_armed() {
            return;
        }
        tokio::time::sleep(poll_interval).await;
    }
}

//! Shared server state
//!
//! Everything the accept loop and the client tasks both reach: the room
//! registry, the directory of live clients, and the client-slot semaphore.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::client::ClientHandle;
use crate::registry::RoomRegistry;

/// A live client and the token that cancels its pending dequeue
#[derive(Debug)]
struct RegisteredClient {
    handle: Arc<ClientHandle>,
    cancel: CancellationToken,
}

/// State shared between the server and its clients
#[derive(Debug)]
pub struct ServerState {
    /// All rooms
    pub rooms: RoomRegistry,
    /// Live clients by name
    clients: DashMap<String, RegisteredClient>,
    /// One permit per free client slot
    slots: Arc<Semaphore>,
}

impl ServerState {
    pub fn new(max_clients: usize) -> Self {
        Self {
            rooms: RoomRegistry::new(),
            clients: DashMap::new(),
            slots: Arc::new(Semaphore::new(max_clients)),
        }
    }

    /// Semaphore gating the accept loop
    pub(crate) fn slots(&self) -> Arc<Semaphore> {
        Arc::clone(&self.slots)
    }

    /// Track a newly accepted client
    ///
    /// The caller must already hold (and forget) one slot permit for it;
    /// `remove` gives that permit back.
    pub fn register(&self, handle: Arc<ClientHandle>, cancel: CancellationToken) {
        debug!("Client {} registered", handle.name());
        self.clients
            .insert(handle.name().to_string(), RegisteredClient { handle, cancel });
    }

    /// Deregister a client and free its slot
    ///
    /// Only the first call for a given client has any effect, so every exit
    /// path may call it. Returns true if the client was registered.
    pub fn remove(&self, client: &ClientHandle) -> bool {
        if self.clients.remove(client.name()).is_none() {
            return false;
        }

        self.rooms.remove_if_empty(client.name());
        self.slots.add_permits(1);

        info!(
            "Client {} removed, {} active clients",
            client.name(),
            self.active_clients()
        );
        true
    }

    /// Cancel every live client's token
    pub fn cancel_all(&self) {
        for client in self.clients.iter() {
            client.cancel.cancel();
        }
    }

    /// Snapshot of the live clients
    pub fn registered(&self) -> Vec<Arc<ClientHandle>> {
        self.clients
            .iter()
            .map(|client| Arc::clone(&client.handle))
            .collect()
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.clients.contains_key(name)
    }

    /// Number of registered clients
    ///
    /// Counted from the client directory: the accept loop may hold a permit
    /// for a connection it has not accepted yet.
    pub fn active_clients(&self) -> usize {
        self.clients.len()
    }
}

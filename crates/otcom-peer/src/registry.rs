use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use otcom_transport::PeerStream;
use tracing::{info, warn};

use crate::client::{lock, Client, ClientConfig, ClientId, CONSOLE_ID};
use crate::error::Result;

/// The set of connected peers.
///
/// Membership changes and broadcasts share one lock. Peers that fail during
/// a broadcast are reaped after the iteration, never in place.
#[derive(Debug)]
pub struct ClientRegistry {
    next_id: AtomicU64,
    clients: Mutex<BTreeMap<ClientId, Arc<Client>>>,
    config: ClientConfig,
}

impl Default for ClientRegistry {
    fn default() -> Self {
        Self::new(ClientConfig::default())
    }
}

impl ClientRegistry {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            next_id: AtomicU64::new(CONSOLE_ID + 1),
            clients: Mutex::new(BTreeMap::new()),
            config,
        }
    }

    /// Adopt an accepted stream and assign the next id.
    pub fn register(&self, stream: PeerStream) -> Result<Arc<Client>> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let client = Arc::new(Client::new(id, stream, &self.config)?);
        lock(&self.clients).insert(id, Arc::clone(&client));
        info!(peer_id = id, addr = ?client.addr(), "peer connected");
        Ok(client)
    }

    /// Remove a peer and shut its socket down.
    pub fn unregister(&self, id: ClientId) -> Option<Arc<Client>> {
        let removed = lock(&self.clients).remove(&id);
        if let Some(client) = &removed {
            client.close();
            info!(peer_id = id, "peer disconnected");
        }
        removed
    }

    /// Send one packet to every live peer.
    ///
    /// Returns how many peers accepted it. A peer whose write fails is
    /// marked dead and removed once the iteration is over.
    pub fn broadcast(&self, command: u8, payload: &[u8]) -> usize {
        let mut clients = lock(&self.clients);
        let mut delivered = 0usize;
        let mut failed = Vec::new();
        for (id, client) in clients.iter() {
            if !client.is_alive() {
                failed.push(*id);
                continue;
            }
            match client.send(command, payload) {
                Ok(()) => delivered += 1,
                Err(err) => {
                    warn!(peer_id = id, error = %err, "broadcast write failed");
                    failed.push(*id);
                }
            }
        }
        for id in failed {
            if let Some(client) = clients.remove(&id) {
                client.close();
                info!(peer_id = id, "peer disconnected");
            }
        }
        delivered
    }

    /// Visit every registered peer with the registry locked.
    pub fn for_each(&self, mut f: impl FnMut(&Arc<Client>)) {
        for client in lock(&self.clients).values() {
            f(client);
        }
    }

    /// Clone out the current peer set so callers can do I/O unlocked.
    pub fn snapshot(&self) -> Vec<Arc<Client>> {
        lock(&self.clients).values().cloned().collect()
    }

    /// Drop every peer flagged dead. Returns the removed ids.
    pub fn reap_dead(&self) -> Vec<ClientId> {
        let mut clients = lock(&self.clients);
        let dead: Vec<ClientId> = clients
            .iter()
            .filter(|(_, client)| !client.is_alive())
            .map(|(id, _)| *id)
            .collect();
        for id in &dead {
            if let Some(client) = clients.remove(id) {
                client.close();
                info!(peer_id = id, "peer disconnected");
            }
        }
        dead
    }

    pub fn get(&self, id: ClientId) -> Option<Arc<Client>> {
        lock(&self.clients).get(&id).cloned()
    }

    pub fn ids(&self) -> Vec<ClientId> {
        lock(&self.clients).keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        lock(&self.clients).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Close and forget every peer.
    pub fn clear(&self) {
        let mut clients = lock(&self.clients);
        for client in clients.values() {
            client.close();
        }
        clients.clear();
    }
}

//! Client manager: an indexable set of client records behind a
//! readers-writer lock. Add/remove are rare; iteration for
//! render composition and broadcast is frequent.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::client::ClientRecord;

#[derive(Default)]
pub struct ClientManager {
    clients: RwLock<HashMap<u32, Arc<ClientRecord>>>,
}

impl ClientManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, record: Arc<ClientRecord>) {
        self.clients.write().insert(record.client_id, record);
    }

    pub fn remove(&self, client_id: u32) -> Option<Arc<ClientRecord>> {
        self.clients.write().remove(&client_id)
    }

    pub fn get(&self, client_id: u32) -> Option<Arc<ClientRecord>> {
        self.clients.read().get(&client_id).cloned()
    }

    /// Snapshot of every currently-registered client, for render composition
    /// and broadcast iteration. Cheap: `Arc` clones, not record copies.
    pub fn snapshot(&self) -> Vec<Arc<ClientRecord>> {
        self.clients.read().values().cloned().collect()
    }

    /// Snapshot excluding one client id, for n-1 style iteration.
    pub fn snapshot_excluding(&self, exclude: u32) -> Vec<Arc<ClientRecord>> {
        self.clients
            .read()
            .values()
            .filter(|record| record.client_id != exclude)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.clients.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glyphcast_collab::crypto::X25519ChaChaSession;
    use glyphcast_net::StreamTransport;
    use std::net::{TcpListener, TcpStream};

    fn dummy_record(id: u32) -> Arc<ClientRecord> {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).unwrap();
        let (server, _) = listener.accept().unwrap();
        let transport = StreamTransport::new(server, id).unwrap();
        std::mem::forget(client);
        ClientRecord::new(id, Box::new(transport), Box::new(X25519ChaChaSession::new()))
    }

    #[test]
    fn insert_get_remove_round_trip() {
        let manager = ClientManager::new();
        manager.insert(dummy_record(1));
        assert!(manager.get(1).is_some());
        assert_eq!(manager.len(), 1);
        assert!(manager.remove(1).is_some());
        assert!(manager.get(1).is_none());
    }

    #[test]
    fn snapshot_excluding_skips_self() {
        let manager = ClientManager::new();
        manager.insert(dummy_record(1));
        manager.insert(dummy_record(2));
        let others = manager.snapshot_excluding(1);
        assert_eq!(others.len(), 1);
        assert_eq!(others[0].client_id, 2);
    }
}

use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex};

use crate::peer::Peer;

const BUCKET_COUNT: usize = 256;

/// `(addr, port) -> Peer`, bucketed by `(addr+port) mod 256` for
/// constant-average lookup. Every live Peer is reachable from exactly one
/// bucket; destruction removes it before the connection socket is closed.
pub struct Directory {
    buckets: Vec<Mutex<HashMap<(u32, u16), Arc<Peer>>>>,
}

impl Default for Directory {
    fn default() -> Self {
        Self::new()
    }
}

impl Directory {
    pub fn new() -> Self {
        Self { buckets: (0..BUCKET_COUNT).map(|_| Mutex::new(HashMap::new())).collect() }
    }

    fn bucket_index(addr: u32, port: u16) -> usize {
        ((u64::from(addr) + u64::from(port)) % BUCKET_COUNT as u64) as usize
    }

    pub fn insert(&self, peer: Arc<Peer>) {
        let key = (u32::from(peer.addr), peer.port);
        let idx = Self::bucket_index(key.0, key.1);
        self.buckets[idx].lock().unwrap().insert(key, peer);
    }

    pub fn remove(&self, addr: Ipv4Addr, port: u16) -> Option<Arc<Peer>> {
        let idx = Self::bucket_index(u32::from(addr), port);
        self.buckets[idx].lock().unwrap().remove(&(u32::from(addr), port))
    }

    /// Resolves and pins a live peer by cloning its `Arc`, which is what
    /// keeps it alive across a concurrent disconnect while the caller still
    /// holds the reference (see §4.5 of the original spec on use-after-free
    /// safety during forwarding).
    pub fn get(&self, addr: Ipv4Addr, port: u16) -> Option<Arc<Peer>> {
        let idx = Self::bucket_index(u32::from(addr), port);
        self.buckets[idx].lock().unwrap().get(&(u32::from(addr), port)).cloned()
    }

    pub fn len(&self) -> usize {
        self.buckets.iter().map(|b| b.lock().unwrap().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn snapshot_all(&self) -> Vec<Arc<Peer>> {
        self.buckets.iter().flat_map(|b| b.lock().unwrap().values().cloned().collect::<Vec<_>>()).collect()
    }
}

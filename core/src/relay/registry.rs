//! Identity registry mapping opaque peer ids to live connections

use super::connection::{LocalQueue, PeerConnection, WireSink};
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use uuid::Uuid;

/// Live peers known to the hub.
///
/// Networked peers (terminals or apps behind a wire connection) and local
/// terminals are kept apart: apps are always networked, and heartbeats only
/// go to networked peers. An id lives for exactly one connection; a peer that
/// reconnects gets a fresh one.
#[derive(Default)]
pub struct Registry {
    networked: RwLock<HashMap<Uuid, Arc<dyn WireSink>>>,
    local: RwLock<HashMap<Uuid, LocalQueue>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue a fresh id for a networked connection and store its sink
    pub fn register(&self, sink: Arc<dyn WireSink>) -> Uuid {
        let id = Uuid::new_v4();
        self.networked.write().insert(id, sink);
        id
    }

    /// Issue a fresh id for a local terminal and store its queue
    pub fn register_local(&self, queue: LocalQueue) -> Uuid {
        let id = Uuid::new_v4();
        self.local.write().insert(id, queue);
        id
    }

    /// Networked connection for `id`
    pub fn networked(&self, id: &Uuid) -> Option<Arc<dyn WireSink>> {
        self.networked.read().get(id).cloned()
    }

    /// Local queue for `id`
    pub fn local(&self, id: &Uuid) -> Option<LocalQueue> {
        self.local.read().get(id).cloned()
    }

    /// Resolve `id` to either kind of connection, networked first
    pub fn lookup(&self, id: &Uuid) -> Option<PeerConnection> {
        if let Some(sink) = self.networked(id) {
            return Some(PeerConnection::Networked(sink));
        }
        self.local(id).map(PeerConnection::Local)
    }

    pub fn is_networked(&self, id: &Uuid) -> bool {
        self.networked.read().contains_key(id)
    }

    pub fn is_local(&self, id: &Uuid) -> bool {
        self.local.read().contains_key(id)
    }

    /// Whether `id` is live in either role
    pub fn contains(&self, id: &Uuid) -> bool {
        self.is_networked(id) || self.is_local(id)
    }

    /// Drop a networked connection; returns whether it was registered
    pub fn remove(&self, id: &Uuid) -> bool {
        self.networked.write().remove(id).is_some()
    }

    /// Drop a local terminal; returns whether it was registered
    pub fn remove_local(&self, id: &Uuid) -> bool {
        self.local.write().remove(id).is_some()
    }

    /// Copy of the networked entries, for iteration without holding the lock
    pub fn networked_snapshot(&self) -> Vec<(Uuid, Arc<dyn WireSink>)> {
        self.networked
            .read()
            .iter()
            .map(|(id, sink)| (*id, Arc::clone(sink)))
            .collect()
    }

    pub fn networked_ids(&self) -> HashSet<Uuid> {
        self.networked.read().keys().copied().collect()
    }

    pub fn local_ids(&self) -> HashSet<Uuid> {
        self.local.read().keys().copied().collect()
    }

    pub fn networked_count(&self) -> usize {
        self.networked.read().len()
    }

    pub fn local_count(&self) -> usize {
        self.local.read().len()
    }
}

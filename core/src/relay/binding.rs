//! Binding table holding the one-to-one terminal/app relationships
//!
//! Two maps kept as exact inverses: `client_to_target[c] == t` if and only if
//! `target_to_client[t] == c`. An id is in at most one binding, in either
//! role. Mutations take the write lock; relay lookups only need a read lock.

use crate::protocol::RetCode;
use parking_lot::RwLock;
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Debug, Default, Clone)]
struct BindingMaps {
    client_to_target: HashMap<Uuid, Uuid>,
    target_to_client: HashMap<Uuid, Uuid>,
}

impl BindingMaps {
    fn is_bound(&self, id: &Uuid) -> bool {
        self.client_to_target.contains_key(id) || self.target_to_client.contains_key(id)
    }
}

/// A removed relationship, roles preserved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Unbound {
    pub client_id: Uuid,
    pub target_id: Uuid,
}

impl Unbound {
    /// The side of the relationship that is not `id`
    pub fn counterpart_of(&self, id: &Uuid) -> Uuid {
        if *id == self.client_id {
            self.target_id
        } else {
            self.client_id
        }
    }
}

#[derive(Default)]
pub struct BindingTable {
    maps: RwLock<BindingMaps>,
}

impl BindingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `client_id` (terminal) to `target_id` (app).
    ///
    /// `peers_live` is evaluated under the write lock so that liveness and
    /// insertion are one step with respect to concurrent unbinds. It must
    /// report whether both sides are connected; if not the result is
    /// `TargetClientNotFound`. An id already bound in either role gives
    /// `IdAlreadyBound` and leaves the table unchanged.
    pub fn try_bind<F>(&self, client_id: Uuid, target_id: Uuid, peers_live: F) -> RetCode
    where
        F: FnOnce(&Uuid, &Uuid) -> bool,
    {
        let mut maps = self.maps.write();

        if !peers_live(&client_id, &target_id) {
            return RetCode::TargetClientNotFound;
        }
        if maps.is_bound(&client_id) || maps.is_bound(&target_id) {
            return RetCode::IdAlreadyBound;
        }

        maps.client_to_target.insert(client_id, target_id);
        maps.target_to_client.insert(target_id, client_id);
        RetCode::Success
    }

    /// Remove whichever binding `id` takes part in
    pub fn unbind_by(&self, id: &Uuid) -> Option<Unbound> {
        let mut maps = self.maps.write();

        if let Some(target_id) = maps.client_to_target.remove(id) {
            maps.target_to_client.remove(&target_id);
            return Some(Unbound {
                client_id: *id,
                target_id,
            });
        }
        if let Some(client_id) = maps.target_to_client.remove(id) {
            maps.client_to_target.remove(&client_id);
            return Some(Unbound {
                client_id,
                target_id: *id,
            });
        }
        None
    }

    /// Whether `client_id` is currently bound to exactly `target_id`
    pub fn is_pair(&self, client_id: &Uuid, target_id: &Uuid) -> bool {
        self.maps.read().client_to_target.get(client_id) == Some(target_id)
    }

    pub fn target_of(&self, client_id: &Uuid) -> Option<Uuid> {
        self.maps.read().client_to_target.get(client_id).copied()
    }

    pub fn client_of(&self, target_id: &Uuid) -> Option<Uuid> {
        self.maps.read().target_to_client.get(target_id).copied()
    }

    /// Bound counterpart of `id` in either role
    pub fn counterpart(&self, id: &Uuid) -> Option<Uuid> {
        let maps = self.maps.read();
        maps.client_to_target
            .get(id)
            .or_else(|| maps.target_to_client.get(id))
            .copied()
    }

    pub fn client_to_target(&self) -> HashMap<Uuid, Uuid> {
        self.maps.read().client_to_target.clone()
    }

    pub fn target_to_client(&self) -> HashMap<Uuid, Uuid> {
        self.maps.read().target_to_client.clone()
    }

    pub fn len(&self) -> usize {
        self.maps.read().client_to_target.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

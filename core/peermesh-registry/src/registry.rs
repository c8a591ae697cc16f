//! The concurrent keyed replica store.
//!
//! An outer `RwLock<HashMap>` guards key presence; each key's state
//! lives behind its own `Mutex`, which is the per-key critical
//! section. Mutations commit, broadcast, and return while holding the
//! key lock, so per-key operations serialise and broadcasts carry
//! every committed transition in commit order. Nothing blocks inside
//! the critical section: broadcast delivery is `try_send` only.

use crate::subscriber::{Delivery, StateUpdate, Subscriber, SubscriberId};
use crate::{RegistryError, Result};
use peermesh_crdt::{CrdtError, Replica, ReplicaKind};
use peermesh_types::Key;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};

#[derive(Debug, Default)]
struct Entry {
    /// Absent until `get_or_create`/`put`/`merge` installs a replica;
    /// a key may carry subscribers before it carries state.
    replica: Option<Replica>,
    subscribers: HashMap<SubscriberId, Subscriber>,
}

impl Entry {
    fn is_vacant(&self) -> bool {
        self.replica.is_none() && self.subscribers.is_empty()
    }
}

/// The process-wide replica store.
///
/// Cheap to share: wrap in `Arc` and hand a clone of the handle to
/// every session at construction.
#[derive(Debug, Default)]
pub struct Registry {
    entries: RwLock<HashMap<Key, Arc<Mutex<Entry>>>>,
}

impl Registry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the entry for `key`, creating it if needed.
    async fn entry(&self, key: &Key) -> Arc<Mutex<Entry>> {
        {
            let entries = self.entries.read().await;
            if let Some(entry) = entries.get(key) {
                return entry.clone();
            }
        }
        let mut entries = self.entries.write().await;
        entries.entry(key.clone()).or_default().clone()
    }

    /// Returns the entry for `key` only if it already exists.
    async fn existing_entry(&self, key: &Key) -> Option<Arc<Mutex<Entry>>> {
        self.entries.read().await.get(key).cloned()
    }

    /// Drops the outer slot for `key` if it holds neither replica nor
    /// subscribers, so abandoned keys do not accumulate.
    async fn reap_if_vacant(&self, key: &Key) {
        let mut entries = self.entries.write().await;
        if let Some(slot) = entries.get(key) {
            if slot.lock().await.is_vacant() {
                entries.remove(key);
            }
        }
    }

    /// Returns the replica stored under `key`, if any. Never creates.
    pub async fn get(&self, key: &Key) -> Option<Replica> {
        let entry = self.existing_entry(key).await?;
        let guard = entry.lock().await;
        guard.replica.clone()
    }

    /// Atomically installs `empty(kind)` if the key is vacant, then
    /// returns the current replica. Fails with a kind mismatch if the
    /// key already holds a different kind.
    pub async fn get_or_create(&self, key: &Key, kind: ReplicaKind) -> Result<Replica> {
        let entry = self.entry(key).await;
        let mut guard = entry.lock().await;
        match &guard.replica {
            Some(existing) if existing.kind() != kind => Err(CrdtError::KindMismatch {
                expected: existing.kind(),
                actual: kind,
            }
            .into()),
            Some(existing) => Ok(existing.clone()),
            None => {
                debug!(key = %key, kind = %kind, "creating default replica");
                let replica = Replica::empty(kind);
                guard.replica = Some(replica.clone());
                Ok(replica)
            }
        }
    }

    /// Replaces the replica under `key` (installing if absent) and
    /// broadcasts the new state.
    pub async fn put(&self, key: &Key, replica: Replica, origin: Option<SubscriberId>) {
        let entry = self.entry(key).await;
        let mut guard = entry.lock().await;
        guard.replica = Some(replica);
        Self::broadcast(key, &mut guard, origin);
    }

    /// Atomically read-modify-writes the replica under `key` inside
    /// the per-key critical section, bumps the advisory version, and
    /// broadcasts. Returns the new state. Fails `NotFound` if absent.
    ///
    /// `f` either fully applies or fails without touching the stored
    /// replica; partial state is never published.
    pub async fn update<F>(
        &self,
        key: &Key,
        origin: Option<SubscriberId>,
        f: F,
    ) -> Result<Replica>
    where
        F: FnOnce(&mut Replica) -> std::result::Result<(), CrdtError>,
    {
        let entry = self
            .existing_entry(key)
            .await
            .ok_or_else(|| RegistryError::NotFound(key.clone()))?;
        let mut guard = entry.lock().await;
        let stored = guard
            .replica
            .as_ref()
            .ok_or_else(|| RegistryError::NotFound(key.clone()))?;

        let mut replica = stored.clone();
        f(&mut replica)?;
        replica.bump();
        guard.replica = Some(replica.clone());
        Self::broadcast(key, &mut guard, origin);
        Ok(replica)
    }

    /// Atomically merges `incoming` into the stored replica,
    /// installing it outright if the key is vacant. Broadcasts.
    /// Fails with a kind mismatch if the kinds disagree.
    pub async fn merge(
        &self,
        key: &Key,
        incoming: Replica,
        origin: Option<SubscriberId>,
    ) -> Result<Replica> {
        let entry = self.entry(key).await;
        let mut guard = entry.lock().await;
        let merged = match guard.replica.take() {
            None => incoming,
            Some(mut stored) => {
                if let Err(e) = stored.merge(&incoming) {
                    // Leave the stored replica untouched on mismatch.
                    guard.replica = Some(stored);
                    return Err(e.into());
                }
                stored
            }
        };
        guard.replica = Some(merged.clone());
        Self::broadcast(key, &mut guard, origin);
        Ok(merged)
    }

    /// Computes the delta from a client's last-known state to the
    /// current replica, using the kind's delta function.
    pub async fn delta(&self, key: &Key, client_state: &Replica) -> Result<Replica> {
        let entry = self
            .existing_entry(key)
            .await
            .ok_or_else(|| RegistryError::NotFound(key.clone()))?;
        let guard = entry.lock().await;
        let stored = guard
            .replica
            .as_ref()
            .ok_or_else(|| RegistryError::NotFound(key.clone()))?;
        Ok(client_state.delta(stored)?)
    }

    /// Adds a subscriber to `key`. Idempotent per subscriber id.
    pub async fn subscribe(&self, key: &Key, subscriber: Subscriber) {
        let entry = self.entry(key).await;
        let mut guard = entry.lock().await;
        guard.subscribers.insert(subscriber.id(), subscriber);
    }

    /// Removes a subscriber from `key`. Idempotent.
    pub async fn unsubscribe(&self, key: &Key, id: SubscriberId) {
        if let Some(entry) = self.existing_entry(key).await {
            let mut guard = entry.lock().await;
            guard.subscribers.remove(&id);
            drop(guard);
            self.reap_if_vacant(key).await;
        }
    }

    /// Removes the replica and all subscribers for `key`. Returns
    /// true if a replica was stored.
    pub async fn delete(&self, key: &Key) -> bool {
        let mut entries = self.entries.write().await;
        match entries.remove(key) {
            Some(entry) => entry.lock().await.replica.is_some(),
            None => false,
        }
    }

    /// Snapshot of the keys currently holding a replica.
    pub async fn keys(&self) -> Vec<Key> {
        let entries = self.entries.read().await;
        let mut keys = Vec::new();
        for (key, entry) in entries.iter() {
            if entry.lock().await.replica.is_some() {
                keys.push(key.clone());
            }
        }
        keys
    }

    /// Number of subscribers currently attached to `key`.
    pub async fn subscriber_count(&self, key: &Key) -> usize {
        match self.existing_entry(key).await {
            Some(entry) => entry.lock().await.subscribers.len(),
            None => 0,
        }
    }

    /// Delivers the committed state to every subscriber except the
    /// origin. Runs inside the per-key critical section; never blocks.
    fn broadcast(key: &Key, entry: &mut Entry, origin: Option<SubscriberId>) {
        let Some(replica) = &entry.replica else {
            return;
        };
        if entry.subscribers.is_empty() {
            return;
        }
        let update = Arc::new(StateUpdate {
            key: key.clone(),
            state: replica.encode(),
            origin,
        });

        let mut dead = Vec::new();
        for (id, subscriber) in entry.subscribers.iter_mut() {
            if Some(*id) == origin {
                continue;
            }
            match subscriber.deliver(update.clone()) {
                Delivery::Delivered => {}
                Delivery::Dropped => {
                    warn!(key = %key, subscriber = %id, "dropping broadcast to slow subscriber");
                }
                Delivery::Dead => dead.push(*id),
            }
        }
        for id in dead {
            warn!(key = %key, subscriber = %id, "removing dead subscriber");
            entry.subscribers.remove(&id);
        }
    }
}

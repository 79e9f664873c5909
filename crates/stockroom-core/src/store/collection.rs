// ── Generic reactive entity collection ──
//
// Lock-free concurrent storage keyed by entity id, with push-based
// change notification via `watch` channels.

use std::collections::HashSet;
use std::sync::Arc;

use dashmap::{DashMap, DashSet};
use tokio::sync::watch;

use crate::model::EntityId;

/// A lock-free, reactive collection for a single entity kind.
///
/// Uses `DashMap` for O(1) concurrent lookups and `watch` channels
/// for push-based change notification. Every mutation bumps a version
/// counter and rebuilds the snapshot that subscribers receive. Snapshots
/// are ordered by id so two reads of an unchanged collection compare equal.
pub(crate) struct EntityCollection<T: Send + Sync + 'static> {
    by_id: DashMap<EntityId, Arc<T>>,

    /// Ids whose cached copy must be refetched before it is served again.
    stale: DashSet<EntityId>,

    /// Version counter, bumped on every mutation.
    version: watch::Sender<u64>,

    /// Full snapshot, rebuilt on mutation for efficient subscription.
    snapshot: watch::Sender<Arc<Vec<Arc<T>>>>,
}

impl<T: Send + Sync + 'static> EntityCollection<T> {
    pub(crate) fn new() -> Self {
        let (version, _) = watch::channel(0u64);
        let (snapshot, _) = watch::channel(Arc::new(Vec::new()));

        Self {
            by_id: DashMap::new(),
            stale: DashSet::new(),
            version,
            snapshot,
        }
    }

    /// Insert or replace an entity. Returns `true` if the id was new.
    /// A replaced entry is no longer stale.
    pub(crate) fn upsert(&self, id: EntityId, entity: Arc<T>) -> bool {
        self.stale.remove(&id);
        let is_new = self.by_id.insert(id, entity).is_none();
        self.publish();
        is_new
    }

    /// Insert or replace many entities with a single notification.
    pub(crate) fn upsert_many(&self, entities: impl IntoIterator<Item = (EntityId, Arc<T>)>) {
        for (id, entity) in entities {
            self.stale.remove(&id);
            self.by_id.insert(id, entity);
        }
        self.publish();
    }

    /// Drop every entity whose id is not in `keep`. Returns how many went.
    pub(crate) fn prune(&self, keep: &HashSet<EntityId>) -> usize {
        let doomed: Vec<EntityId> = self
            .by_id
            .iter()
            .filter(|r| !keep.contains(r.key()))
            .map(|r| r.key().clone())
            .collect();

        for id in &doomed {
            self.by_id.remove(id);
            self.stale.remove(id);
        }
        if !doomed.is_empty() {
            self.publish();
        }
        doomed.len()
    }

    /// Remove an entity by id. Returns the removed entity if it existed.
    pub(crate) fn remove(&self, id: &EntityId) -> Option<Arc<T>> {
        self.stale.remove(id);
        let removed = self.by_id.remove(id).map(|(_, v)| v);
        if removed.is_some() {
            self.publish();
        }
        removed
    }

    pub(crate) fn get(&self, id: &EntityId) -> Option<Arc<T>> {
        self.by_id.get(id).map(|r| Arc::clone(r.value()))
    }

    /// Mark one id stale. Returns `false` if it is not cached.
    pub(crate) fn mark_stale(&self, id: &EntityId) -> bool {
        if self.by_id.contains_key(id) {
            self.stale.insert(id.clone());
            true
        } else {
            false
        }
    }

    pub(crate) fn mark_all_stale(&self) {
        for r in &self.by_id {
            self.stale.insert(r.key().clone());
        }
    }

    pub(crate) fn is_stale(&self, id: &EntityId) -> bool {
        self.stale.contains(id)
    }

    /// Get the current snapshot (cheap `Arc` clone).
    pub(crate) fn snapshot(&self) -> Arc<Vec<Arc<T>>> {
        self.snapshot.borrow().clone()
    }

    /// Subscribe to snapshot changes via a `watch::Receiver`.
    pub(crate) fn subscribe(&self) -> watch::Receiver<Arc<Vec<Arc<T>>>> {
        self.snapshot.subscribe()
    }

    pub(crate) fn version(&self) -> u64 {
        *self.version.borrow()
    }

    pub(crate) fn len(&self) -> usize {
        self.by_id.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    // ── Private helpers ──────────────────────────────────────────────

    /// Rebuild the ordered snapshot, broadcast it, and bump the version.
    fn publish(&self) {
        let mut entries: Vec<(EntityId, Arc<T>)> = self
            .by_id
            .iter()
            .map(|r| (r.key().clone(), Arc::clone(r.value())))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        let values: Vec<Arc<T>> = entries.into_iter().map(|(_, v)| v).collect();

        // `send_modify` updates unconditionally, even with zero receivers.
        self.snapshot.send_modify(|snap| *snap = Arc::new(values));
        self.version.send_modify(|v| *v += 1);
    }
}

// ── Generic entity store ──
//
// CRUD + sync over REST with an in-memory cache keyed by entity id.
// One instance per entity kind; handles are cheap to clone and share
// the same cache.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use dashmap::DashMap;
use stockroom_api::CatalogClient;
use tokio::sync::{Mutex, watch};
use tracing::{debug, info, warn};

use super::collection::EntityCollection;
use crate::error::CoreError;
use crate::model::{CatalogEntity, EntityId, EntityKind, ListFilters};
use crate::stream::EntityStream;

/// State container for one catalog kind.
///
/// Every successful server response replaces the cached copy wholesale;
/// the store never merges client-side edits into server state. Failed
/// requests leave the cache untouched and are recorded in
/// [`last_error`](Self::last_error).
pub struct EntityStore<T: CatalogEntity> {
    inner: Arc<StoreInner<T>>,
}

impl<T: CatalogEntity> Clone for EntityStore<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct StoreInner<T: CatalogEntity> {
    client: CatalogClient,
    cache: EntityCollection<T>,
    /// Per-id locks serializing mutations on the same entity.
    locks: DashMap<EntityId, Arc<Mutex<()>>>,
    /// Number of requests in flight.
    in_flight: watch::Sender<usize>,
    last_error: watch::Sender<Option<CoreError>>,
    closed: AtomicBool,
}

impl<T: CatalogEntity> EntityStore<T> {
    pub fn new(client: CatalogClient) -> Self {
        let (in_flight, _) = watch::channel(0);
        let (last_error, _) = watch::channel(None);

        Self {
            inner: Arc::new(StoreInner {
                client,
                cache: EntityCollection::new(),
                locks: DashMap::new(),
                in_flight,
                last_error,
                closed: AtomicBool::new(false),
            }),
        }
    }

    pub fn kind(&self) -> EntityKind {
        T::KIND
    }

    // ── Remote operations ────────────────────────────────────────────

    /// List entities from the server.
    ///
    /// With empty filters the result is authoritative: the cache is
    /// replaced (upsert, then prune what the server no longer reports).
    /// With filters the result is a partial view and is only merged in.
    pub async fn fetch_all(&self, filters: &ListFilters) -> Result<Vec<Arc<T>>, CoreError> {
        self.ensure_open()?;
        let _loading = self.begin_request();

        let result = self
            .inner
            .client
            .list::<T>(T::KIND.collection(), &filters.to_query())
            .await
            .map_err(|e| CoreError::from_api(e, T::KIND, None));
        let items: Vec<Arc<T>> = self.record(result)?.into_iter().map(Arc::new).collect();

        debug!(kind = %T::KIND, count = items.len(), filtered = !filters.is_empty(), "fetched list");

        if self.is_closed() {
            return Ok(items);
        }

        self.inner
            .cache
            .upsert_many(items.iter().map(|e| (e.id().clone(), Arc::clone(e))));

        if filters.is_empty() {
            let keep: HashSet<EntityId> = items.iter().map(|e| e.id().clone()).collect();
            let pruned = self.inner.cache.prune(&keep);
            if pruned > 0 {
                debug!(kind = %T::KIND, pruned, "pruned entities missing from full list");
            }
        }

        Ok(items)
    }

    /// Cached entity if present and fresh, otherwise fetched from the
    /// server. A 404 evicts any cached copy.
    pub async fn get_by_id(&self, id: &EntityId) -> Result<Arc<T>, CoreError> {
        self.ensure_open()?;

        if !self.inner.cache.is_stale(id) {
            if let Some(cached) = self.inner.cache.get(id) {
                return Ok(cached);
            }
        }

        let _loading = self.begin_request();
        let result = self
            .inner
            .client
            .get::<T>(T::KIND.collection(), id.as_str())
            .await
            .map_err(|e| CoreError::from_api(e, T::KIND, Some(id)));

        Ok(self.absorb(self.record_for(id, result)?))
    }

    /// Create an entity. The returned entity carries the server id and is
    /// cached; a rejected draft leaves the cache unchanged.
    pub async fn create(&self, draft: &T::Draft) -> Result<Arc<T>, CoreError> {
        self.ensure_open()?;
        let _loading = self.begin_request();

        let result = self
            .inner
            .client
            .create::<T, _>(T::KIND.collection(), draft)
            .await
            .map_err(|e| CoreError::from_api(e, T::KIND, None));

        let entity = self.absorb(self.record(result)?);
        info!(kind = %T::KIND, id = %entity.id(), "created");
        Ok(entity)
    }

    /// Partial update. The cache takes the server's representation; a 404
    /// evicts the cached copy.
    pub async fn update(&self, id: &EntityId, patch: &T::Patch) -> Result<Arc<T>, CoreError> {
        self.ensure_open()?;
        self.with_id_lock(id, async {
            let _loading = self.begin_request();
            let result = self
                .inner
                .client
                .update::<T, _>(T::KIND.collection(), id.as_str(), patch)
                .await
                .map_err(|e| CoreError::from_api(e, T::KIND, Some(id)));
            Ok::<_, CoreError>(self.absorb(self.record_for(id, result)?))
        })
        .await
    }

    /// Delete an entity. A dependency conflict surfaces as
    /// [`CoreError::Conflict`] and the entity stays cached.
    pub async fn delete(&self, id: &EntityId) -> Result<(), CoreError> {
        self.ensure_open()?;
        self.with_id_lock(id, async {
            let _loading = self.begin_request();
            let result = self
                .inner
                .client
                .delete(T::KIND.collection(), id.as_str())
                .await
                .map_err(|e| CoreError::from_api(e, T::KIND, Some(id)));

            if let Err(CoreError::Conflict { linked, .. }) = &result {
                warn!(kind = %T::KIND, %id, dependents = linked.total(), "delete blocked by dependents");
            }
            self.record_for(id, result)?;

            self.evict(id);
            info!(kind = %T::KIND, %id, "deleted");
            Ok::<_, CoreError>(())
        })
        .await
    }

    /// Push one entity to the external platform. Cache effect as `update`.
    pub async fn sync(&self, id: &EntityId) -> Result<Arc<T>, CoreError> {
        self.ensure_open()?;
        self.with_id_lock(id, async {
            let _loading = self.begin_request();
            let result = self
                .inner
                .client
                .sync::<T>(T::KIND.collection(), id.as_str())
                .await
                .map_err(|e| CoreError::from_api(e, T::KIND, Some(id)));

            let entity = self.absorb(self.record_for(id, result)?);
            info!(kind = %T::KIND, %id, status = %entity.sync_status(), "synced");
            Ok::<_, CoreError>(entity)
        })
        .await
    }

    // ── Cache access ─────────────────────────────────────────────────

    /// Force the next `get_by_id` for this id to hit the server.
    pub fn mark_stale(&self, id: &EntityId) -> bool {
        self.inner.cache.mark_stale(id)
    }

    pub fn mark_all_stale(&self) {
        self.inner.cache.mark_all_stale();
    }

    /// Cached entity, without any network access.
    pub fn cached(&self, id: &EntityId) -> Option<Arc<T>> {
        self.inner.cache.get(id)
    }

    /// All cached entities, ordered by id.
    pub fn snapshot(&self) -> Arc<Vec<Arc<T>>> {
        self.inner.cache.snapshot()
    }

    pub fn subscribe(&self) -> EntityStream<T> {
        EntityStream::new(self.inner.cache.subscribe())
    }

    pub fn len(&self) -> usize {
        self.inner.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.cache.is_empty()
    }

    /// Bumped on every cache mutation.
    pub fn version(&self) -> u64 {
        self.inner.cache.version()
    }

    // ── Request state ────────────────────────────────────────────────

    /// `true` while any request is in flight.
    pub fn loading(&self) -> bool {
        *self.inner.in_flight.borrow() > 0
    }

    /// Watch the number of requests in flight.
    pub fn subscribe_loading(&self) -> watch::Receiver<usize> {
        self.inner.in_flight.subscribe()
    }

    /// Error from the most recent failed request, cleared by the next
    /// successful one.
    pub fn last_error(&self) -> Option<CoreError> {
        self.inner.last_error.borrow().clone()
    }

    pub fn subscribe_errors(&self) -> watch::Receiver<Option<CoreError>> {
        self.inner.last_error.subscribe()
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Stop accepting work. Responses and pushes that land after this
    /// leave the cache alone.
    pub fn close(&self) {
        if !self.inner.closed.swap(true, Ordering::AcqRel) {
            debug!(kind = %T::KIND, "store closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    // ── Crate-internal cache mutation ────────────────────────────────

    /// Cache a server representation. No-op on a closed store.
    pub(crate) fn absorb(&self, entity: T) -> Arc<T> {
        let entity = Arc::new(entity);
        if !self.is_closed() {
            self.inner.cache.upsert(entity.id().clone(), Arc::clone(&entity));
        }
        entity
    }

    /// Drop a cached entity. No-op on a closed store.
    pub(crate) fn evict(&self, id: &EntityId) -> Option<Arc<T>> {
        if self.is_closed() {
            return None;
        }
        self.inner.cache.remove(id)
    }

    pub(crate) fn ensure_open(&self) -> Result<(), CoreError> {
        if self.is_closed() {
            Err(CoreError::StoreClosed { kind: T::KIND })
        } else {
            Ok(())
        }
    }

    pub(crate) fn client(&self) -> &CatalogClient {
        &self.inner.client
    }

    /// Track one request for the loading flag until the guard drops.
    pub(crate) fn begin_request(&self) -> RequestGuard {
        self.inner.in_flight.send_modify(|n| *n += 1);
        RequestGuard {
            in_flight: self.inner.in_flight.clone(),
        }
    }

    /// Update the error state from a request outcome.
    pub(crate) fn record<R>(&self, result: Result<R, CoreError>) -> Result<R, CoreError> {
        match &result {
            Ok(_) => {
                self.inner.last_error.send_if_modified(|slot| slot.take().is_some());
            }
            Err(err) => {
                debug!(kind = %T::KIND, error = %err, "request failed");
                self.inner.last_error.send_replace(Some(err.clone()));
            }
        }
        result
    }

    /// [`record`](Self::record) for a request about one id. The server
    /// saying the id is gone drops the cached copy.
    fn record_for<R>(&self, id: &EntityId, result: Result<R, CoreError>) -> Result<R, CoreError> {
        let result = self.record(result);
        if matches!(result, Err(CoreError::NotFound { .. })) && self.evict(id).is_some() {
            debug!(kind = %T::KIND, %id, "evicted entity the server no longer has");
        }
        result
    }

    /// Run `op` while holding the mutation lock for `id`. A second caller
    /// for the same id waits until the first one finishes.
    pub(crate) async fn with_id_lock<R>(&self, id: &EntityId, op: impl Future<Output = R>) -> R {
        let entry = IdLock {
            locks: &self.inner.locks,
            id,
            lock: Arc::clone(self.inner.locks.entry(id.clone()).or_default().value()),
        };
        let _guard = entry.lock.lock().await;
        op.await
    }
}

/// Releases a per-id lock entry once its last user is gone, including
/// when the waiting future is dropped.
struct IdLock<'a> {
    locks: &'a DashMap<EntityId, Arc<Mutex<()>>>,
    id: &'a EntityId,
    lock: Arc<Mutex<()>>,
}

impl Drop for IdLock<'_> {
    fn drop(&mut self) {
        // Held by the map and by us only: no one else is waiting.
        self.locks
            .remove_if(self.id, |_, l| Arc::strong_count(l) == 2);
    }
}

/// Decrements the in-flight counter on drop.
pub(crate) struct RequestGuard {
    in_flight: watch::Sender<usize>,
}

impl Drop for RequestGuard {
    fn drop(&mut self) {
        self.in_flight.send_modify(|n| *n = n.saturating_sub(1));
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::model::Brand;
    use serde_json::json;

    fn store() -> EntityStore<Brand> {
        let client =
            CatalogClient::new("http://127.0.0.1:9", &stockroom_api::TransportConfig::default())
                .unwrap();
        EntityStore::new(client)
    }

    fn brand(id: &str, name: &str) -> Brand {
        serde_json::from_value(json!({ "id": id, "name": name })).unwrap()
    }

    #[test]
    fn loading_counts_overlapping_requests() {
        let store = store();
        assert!(!store.loading());

        let a = store.begin_request();
        let b = store.begin_request();
        drop(a);
        assert!(store.loading());
        drop(b);
        assert!(!store.loading());
    }

    #[test]
    fn record_sets_and_clears_last_error() {
        let store = store();
        let err: Result<(), _> = Err(CoreError::Network {
            reason: "down".into(),
        });
        assert!(store.record(err).is_err());
        assert!(matches!(store.last_error(), Some(CoreError::Network { .. })));

        store.record(Ok(())).unwrap();
        assert!(store.last_error().is_none());
    }

    #[test]
    fn closed_store_ignores_cache_mutations() {
        let store = store();
        store.absorb(brand("b1", "Acme"));
        store.close();

        store.absorb(brand("b2", "Other"));
        assert!(store.evict(&EntityId::from("b1")).is_none());
        assert_eq!(store.len(), 1);
        assert!(matches!(
            store.ensure_open(),
            Err(CoreError::StoreClosed { kind: EntityKind::Brand })
        ));
    }

    #[tokio::test]
    async fn id_lock_entry_is_released() {
        let store = store();
        let id = EntityId::from("b1");
        let out = store.with_id_lock(&id, async { 7 }).await;
        assert_eq!(out, 7);
        assert!(store.inner.locks.is_empty());
    }

    #[tokio::test]
    async fn id_lock_entry_is_released_when_waiter_is_dropped() {
        let store = store();
        let id = EntityId::from("b1");
        let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();

        let holder = {
            let store = store.clone();
            let id = id.clone();
            tokio::spawn(async move {
                store
                    .with_id_lock(&id, async {
                        let _ = release_rx.await;
                    })
                    .await;
            })
        };
        tokio::task::yield_now().await;
        assert_eq!(store.inner.locks.len(), 1);

        // A second caller gives up while queued behind the first.
        let waiter = tokio::time::timeout(
            std::time::Duration::from_millis(20),
            store.with_id_lock(&id, async {}),
        )
        .await;
        assert!(waiter.is_err());
        assert_eq!(store.inner.locks.len(), 1);

        release_tx.send(()).unwrap();
        holder.await.unwrap();
        assert!(store.inner.locks.is_empty());
    }

    #[tokio::test]
    async fn operations_on_closed_store_fail_fast() {
        let store = store();
        store.close();
        let err = store.fetch_all(&ListFilters::new()).await.unwrap_err();
        assert!(matches!(err, CoreError::StoreClosed { .. }));
    }
}

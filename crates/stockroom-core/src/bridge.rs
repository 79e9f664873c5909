// ── WebSocket synchronization bridge ──
//
// Applies server pushes to the attached entity stores. One task drains
// the socket's message stream, so events for every channel are handled
// strictly in arrival order.

use std::collections::BTreeMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use dashmap::{DashMap, DashSet};
use futures_util::future::BoxFuture;
use stockroom_api::websocket::{
    ChangeAction, ChannelEvent, ChannelSocket, ReconnectConfig, SocketMessage, SocketStatus,
};
use thiserror::Error;
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};
use url::Url;

use crate::error::CoreError;
use crate::model::{CatalogEntity, EntityId, EntityKind, ListFilters};
use crate::store::EntityStore;

// ── Channel state ────────────────────────────────────────────────────

/// Subscription state of one channel, as seen by the bridge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum ChannelState {
    #[default]
    Disconnected,
    /// Subscribe sent (or queued until the transport is up).
    Connecting,
    /// Server acknowledged the subscription.
    Subscribed,
}

/// Options for [`SyncBridge::start`].
#[derive(Debug, Clone, Default)]
pub struct BridgeOptions {
    pub reconnect: ReconnectConfig,
    /// Value for the `Authorization` header of the upgrade request.
    pub authorization: Option<String>,
    /// Refetch every subscribed kind on this period. Off when `None`.
    pub reconcile_interval: Option<Duration>,
}

// ── Sink contract ────────────────────────────────────────────────────

/// What applying one push did to the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Applied {
    Upserted,
    Removed,
    /// Push without a payload; the cached copy will be refetched on next read.
    MarkedStale,
    Ignored,
}

#[derive(Debug, Error)]
pub(crate) enum ApplyError {
    #[error("payload is not a valid {kind}: {source}")]
    Shape {
        kind: EntityKind,
        #[source]
        source: serde_json::Error,
    },
}

/// A store the bridge can push changes into.
pub(crate) trait ChannelSink: Send + Sync {
    fn apply(&self, event: &ChannelEvent) -> Result<Applied, ApplyError>;

    /// Full refetch of the kind. Resolves to the number of entities listed.
    fn reconcile(&self) -> BoxFuture<'static, Result<usize, CoreError>>;
}

impl<T: CatalogEntity> ChannelSink for EntityStore<T> {
    fn apply(&self, event: &ChannelEvent) -> Result<Applied, ApplyError> {
        if self.is_closed() {
            return Ok(Applied::Ignored);
        }

        let id = EntityId::from(event.entity_id.as_str());
        match event.action {
            ChangeAction::Deleted => Ok(if self.evict(&id).is_some() {
                Applied::Removed
            } else {
                Applied::Ignored
            }),
            ChangeAction::Created | ChangeAction::Updated => {
                let Some(data) = &event.data else {
                    self.mark_stale(&id);
                    return Ok(Applied::MarkedStale);
                };

                let mut data = data.clone();
                if let Some(obj) = data.as_object_mut() {
                    obj.entry("id")
                        .or_insert_with(|| serde_json::Value::String(event.entity_id.clone()));
                }
                let entity: T = serde_json::from_value(data)
                    .map_err(|source| ApplyError::Shape { kind: T::KIND, source })?;

                self.absorb(entity);
                Ok(Applied::Upserted)
            }
        }
    }

    fn reconcile(&self) -> BoxFuture<'static, Result<usize, CoreError>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .fetch_all(&ListFilters::new())
                .await
                .map(|items| items.len())
        })
    }
}

// ── SyncBridge ───────────────────────────────────────────────────────

/// Keeps attached stores in step with server pushes.
///
/// Dropping the last handle stops the event task and the socket.
#[derive(Clone)]
pub struct SyncBridge {
    inner: Arc<BridgeInner>,
}

struct BridgeInner {
    socket: ChannelSocket,
    channels: DashMap<EntityKind, ChannelEntry>,
    states: watch::Sender<BTreeMap<EntityKind, ChannelState>>,
    reconciling: DashSet<EntityKind>,
    cancel: CancellationToken,
}

struct ChannelEntry {
    sink: Arc<dyn ChannelSink>,
    last_seq: Option<u64>,
    /// Set by the first ack; a later ack means a resubscribe after reconnect.
    acked: bool,
}

impl SyncBridge {
    /// Spawn the socket and the event task. Must be called inside a
    /// tokio runtime.
    pub fn start(ws_url: Url, options: BridgeOptions) -> Self {
        let cancel = CancellationToken::new();
        let socket = ChannelSocket::new(
            ws_url,
            options.reconnect,
            cancel.child_token(),
            options.authorization,
        );
        // Taken before any subscribe so no ack can be missed.
        let messages = socket.messages();
        let (states, _) = watch::channel(BTreeMap::new());

        let inner = Arc::new(BridgeInner {
            socket,
            channels: DashMap::new(),
            states,
            reconciling: DashSet::new(),
            cancel: cancel.clone(),
        });

        tokio::spawn(event_loop(Arc::downgrade(&inner), messages, cancel.clone()));
        if let Some(period) = options.reconcile_interval {
            tokio::spawn(reconcile_loop(Arc::downgrade(&inner), period, cancel));
        }

        Self { inner }
    }

    /// Route pushes for `T`'s channel into `store` and subscribe to it.
    /// Re-attaching a kind replaces the previous store.
    pub fn attach<T: CatalogEntity>(&self, store: &EntityStore<T>) {
        let kind = T::KIND;
        let previous = self.inner.channels.insert(
            kind,
            ChannelEntry {
                sink: Arc::new(store.clone()),
                last_seq: None,
                acked: false,
            },
        );

        if previous.is_none() {
            self.inner.set_state(kind, ChannelState::Connecting);
        }
        self.inner.socket.subscribe(kind.channel());
        debug!(%kind, "attached store");
    }

    /// Stop routing pushes for `kind` and unsubscribe its channel.
    /// Events already in flight for it are ignored.
    pub fn detach(&self, kind: EntityKind) {
        if self.inner.channels.remove(&kind).is_some() {
            self.inner.socket.unsubscribe(kind.channel());
            self.inner.states.send_modify(|m| {
                m.remove(&kind);
            });
            info!(%kind, "detached store");
        }
    }

    pub fn channel_state(&self, kind: EntityKind) -> ChannelState {
        self.inner
            .states
            .borrow()
            .get(&kind)
            .copied()
            .unwrap_or_default()
    }

    /// Watch per-kind channel states. Detached kinds are absent.
    pub fn subscribe_states(&self) -> watch::Receiver<BTreeMap<EntityKind, ChannelState>> {
        self.inner.states.subscribe()
    }

    pub fn socket_status(&self) -> SocketStatus {
        self.inner.socket.status()
    }

    pub fn attached(&self) -> Vec<EntityKind> {
        let mut kinds: Vec<EntityKind> = self.inner.channels.iter().map(|e| *e.key()).collect();
        kinds.sort();
        kinds
    }

    /// Stop the socket and the event task.
    pub fn shutdown(&self) {
        self.inner.cancel.cancel();
        self.inner.mark_all(ChannelState::Disconnected);
        info!("sync bridge shut down");
    }
}

impl Drop for BridgeInner {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

// ── Event handling ───────────────────────────────────────────────────

impl BridgeInner {
    fn handle(self: &Arc<Self>, msg: &SocketMessage) {
        match msg {
            SocketMessage::Status(status) => self.on_status(*status),
            SocketMessage::Subscribed { channel } => self.on_subscribed(channel),
            SocketMessage::Unsubscribed { channel } => debug!(%channel, "unsubscribe acknowledged"),
            SocketMessage::Change(event) => self.on_change(event),
        }
    }

    fn on_status(&self, status: SocketStatus) {
        match status {
            SocketStatus::Connecting => {
                self.states.send_if_modified(|m| {
                    let mut changed = false;
                    for state in m.values_mut() {
                        if *state == ChannelState::Disconnected {
                            *state = ChannelState::Connecting;
                            changed = true;
                        }
                    }
                    changed
                });
            }
            SocketStatus::Disconnected | SocketStatus::Idle => {
                for mut entry in self.channels.iter_mut() {
                    entry.last_seq = None;
                }
                self.mark_all(ChannelState::Disconnected);
            }
            SocketStatus::Connected => {}
        }
    }

    fn on_subscribed(self: &Arc<Self>, channel: &str) {
        let Some(kind) = EntityKind::from_channel(channel) else {
            debug!(%channel, "ack for unknown channel");
            return;
        };

        let resubscribed = match self.channels.get_mut(&kind) {
            Some(mut entry) => std::mem::replace(&mut entry.acked, true),
            None => return,
        };

        self.set_state(kind, ChannelState::Subscribed);
        if resubscribed {
            info!(%kind, "resubscribed after reconnect, reconciling");
            self.reconcile(kind);
        } else {
            info!(%kind, "subscribed");
        }
    }

    fn on_change(self: &Arc<Self>, event: &ChannelEvent) {
        let Some(kind) = EntityKind::from_channel(&event.channel) else {
            debug!(channel = %event.channel, "push for unknown channel");
            return;
        };

        let (sink, gap) = {
            let Some(mut entry) = self.channels.get_mut(&kind) else {
                trace!(%kind, "push for detached channel ignored");
                return;
            };

            let mut gap = false;
            if let Some(seq) = event.seq {
                match entry.last_seq {
                    Some(last) if seq <= last => {
                        debug!(%kind, seq, last, "replayed push dropped");
                        return;
                    }
                    Some(last) if seq > last.saturating_add(1) => gap = true,
                    _ => {}
                }
                entry.last_seq = Some(seq);
            }
            (Arc::clone(&entry.sink), gap)
        };

        match sink.apply(event) {
            Ok(applied) => {
                trace!(%kind, id = %event.entity_id, action = ?event.action, ?applied, "push applied");
            }
            Err(e) => {
                warn!(%kind, id = %event.entity_id, error = %e, "dropping malformed push");
            }
        }

        if gap {
            warn!(%kind, seq = ?event.seq, "sequence gap, reconciling");
            self.reconcile(kind);
        }
    }

    /// Spawn a full refetch for `kind` unless one is already running.
    fn reconcile(self: &Arc<Self>, kind: EntityKind) {
        let Some(sink) = self.channels.get(&kind).map(|e| Arc::clone(&e.sink)) else {
            return;
        };
        if !self.reconciling.insert(kind) {
            debug!(%kind, "reconciliation already running");
            return;
        }

        let bridge = Arc::downgrade(self);
        tokio::spawn(async move {
            match sink.reconcile().await {
                Ok(count) => debug!(%kind, count, "reconciled"),
                Err(e) => warn!(%kind, error = %e, "reconciliation failed"),
            }
            if let Some(bridge) = bridge.upgrade() {
                bridge.reconciling.remove(&kind);
            }
        });
    }

    fn reconcile_where(self: &Arc<Self>, pred: impl Fn(ChannelState) -> bool) {
        let kinds: Vec<EntityKind> = self
            .states
            .borrow()
            .iter()
            .filter(|(_, s)| pred(**s))
            .map(|(k, _)| *k)
            .collect();
        for kind in kinds {
            self.reconcile(kind);
        }
    }

    fn set_state(&self, kind: EntityKind, state: ChannelState) {
        self.states
            .send_if_modified(|m| m.insert(kind, state) != Some(state));
    }

    fn mark_all(&self, state: ChannelState) {
        self.states.send_if_modified(|m| {
            let mut changed = false;
            for s in m.values_mut() {
                if *s != state {
                    *s = state;
                    changed = true;
                }
            }
            changed
        });
    }
}

// ── Background tasks ─────────────────────────────────────────────────

async fn event_loop(
    bridge: Weak<BridgeInner>,
    mut messages: broadcast::Receiver<Arc<SocketMessage>>,
    cancel: CancellationToken,
) {
    loop {
        let msg = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            msg = messages.recv() => msg,
        };
        let Some(bridge) = bridge.upgrade() else { break };

        match msg {
            Ok(msg) => bridge.handle(&msg),
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                warn!(missed, "bridge fell behind the socket, reconciling all channels");
                bridge.reconcile_where(|_| true);
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
    debug!("bridge event loop stopped");
}

async fn reconcile_loop(bridge: Weak<BridgeInner>, period: Duration, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    // First tick completes immediately.
    ticker.tick().await;

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = ticker.tick() => {
                let Some(bridge) = bridge.upgrade() else { break };
                bridge.reconcile_where(|s| s == ChannelState::Subscribed);
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::model::Brand;
    use serde_json::json;
    use stockroom_api::{CatalogClient, TransportConfig};

    fn store() -> EntityStore<Brand> {
        let client = CatalogClient::new("http://127.0.0.1:9", &TransportConfig::default()).unwrap();
        EntityStore::new(client)
    }

    fn event(action: ChangeAction, id: &str, data: Option<serde_json::Value>) -> ChannelEvent {
        ChannelEvent {
            channel: "brands".into(),
            action,
            entity_id: id.into(),
            data,
            seq: None,
        }
    }

    #[test]
    fn updated_for_unknown_id_inserts() {
        let store = store();
        let applied = store
            .apply(&event(ChangeAction::Updated, "b1", Some(json!({ "name": "Acme" }))))
            .unwrap();

        assert_eq!(applied, Applied::Upserted);
        assert_eq!(store.cached(&"b1".into()).unwrap().name, "Acme");
    }

    #[test]
    fn deleted_removes_without_network() {
        let store = store();
        store.absorb(serde_json::from_value(json!({ "id": "b1", "name": "Acme" })).unwrap());

        let applied = store.apply(&event(ChangeAction::Deleted, "b1", None)).unwrap();
        assert_eq!(applied, Applied::Removed);
        assert!(store.is_empty());
    }

    #[test]
    fn malformed_payload_is_rejected_and_cache_untouched() {
        let store = store();
        let err = store
            .apply(&event(ChangeAction::Created, "b2", Some(json!({ "name": 42 }))))
            .unwrap_err();
        assert!(err.to_string().contains("brand"));
        assert!(store.is_empty());
    }

    #[test]
    fn closed_store_ignores_pushes() {
        let store = store();
        store.close();
        let applied = store
            .apply(&event(ChangeAction::Created, "b3", Some(json!({ "name": "Late" }))))
            .unwrap();
        assert_eq!(applied, Applied::Ignored);
        assert!(store.is_empty());
    }

    #[test]
    fn update_without_payload_marks_stale() {
        let store = store();
        store.absorb(serde_json::from_value(json!({ "id": "b1", "name": "Acme" })).unwrap());
        let applied = store.apply(&event(ChangeAction::Updated, "b1", None)).unwrap();
        assert_eq!(applied, Applied::MarkedStale);
    }
}

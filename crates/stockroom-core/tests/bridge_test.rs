#![allow(clippy::unwrap_used)]
// Integration tests for `SyncBridge`: an in-process WebSocket server for
// pushes plus wiremock for the reconciliation fetches.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use stockroom_api::websocket::ReconnectConfig;
use stockroom_api::{CatalogClient, TransportConfig};
use stockroom_core::{
    Brand, BridgeOptions, ChannelState, EntityId, EntityKind, EntityStore, ListFilters, Supplier,
    SyncBridge,
};

// ── Helpers ─────────────────────────────────────────────────────────

struct PushServer {
    url: Url,
    push_tx: mpsc::UnboundedSender<String>,
    subscribed_rx: mpsc::UnboundedReceiver<String>,
}

impl PushServer {
    /// Acks every subscribe/unsubscribe, reports subscribed channels, and
    /// forwards queued pushes. `"__close__"` drops the current connection.
    async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (push_tx, mut push_rx) = mpsc::unbounded_channel::<String>();
        let (subscribed_tx, subscribed_rx) = mpsc::unbounded_channel::<String>();

        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
                loop {
                    tokio::select! {
                        frame = ws.next() => {
                            let Some(Ok(Message::Text(text))) = frame else { break };
                            let value: serde_json::Value = serde_json::from_str(text.as_str()).unwrap();
                            let channel = value["channel"].as_str().unwrap_or_default().to_owned();
                            let ack = match value["type"].as_str() {
                                Some("subscribe") => "subscribed",
                                Some("unsubscribe") => "unsubscribed",
                                _ => continue,
                            };
                            let reply = json!({ "type": ack, "channel": channel });
                            ws.send(Message::text(reply.to_string())).await.unwrap();
                            if ack == "subscribed" {
                                let _ = subscribed_tx.send(channel);
                            }
                        }
                        push = push_rx.recv() => {
                            let Some(push) = push else { return };
                            if push == "__close__" {
                                let _ = ws.close(None).await;
                                break;
                            }
                            ws.send(Message::text(push)).await.unwrap();
                        }
                    }
                }
            }
        });

        Self {
            url: Url::parse(&format!("ws://{addr}/ws")).unwrap(),
            push_tx,
            subscribed_rx,
        }
    }

    fn push(&self, frame: &serde_json::Value) {
        self.push_tx.send(frame.to_string()).unwrap();
    }

    fn push_raw(&self, frame: &str) {
        self.push_tx.send(frame.to_owned()).unwrap();
    }

    async fn next_subscribed(&mut self) -> String {
        tokio::time::timeout(Duration::from_secs(5), self.subscribed_rx.recv())
            .await
            .unwrap()
            .unwrap()
    }
}

fn ok(data: serde_json::Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({ "success": true, "data": data }))
}

fn fast_options() -> BridgeOptions {
    BridgeOptions {
        reconnect: ReconnectConfig {
            initial_delay: Duration::from_millis(20),
            max_delay: Duration::from_millis(100),
            max_retries: None,
        },
        ..BridgeOptions::default()
    }
}

fn store<T: stockroom_core::CatalogEntity>(server: &MockServer) -> EntityStore<T> {
    let client = CatalogClient::new(&server.uri(), &TransportConfig::default()).unwrap();
    EntityStore::new(client)
}

async fn wait_until(mut cond: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
}

async fn wait_for_state(bridge: &SyncBridge, kind: EntityKind, state: ChannelState) {
    let mut states = bridge.subscribe_states();
    tokio::time::timeout(
        Duration::from_secs(5),
        states.wait_for(|m| m.get(&kind) == Some(&state)),
    )
    .await
    .unwrap()
    .unwrap();
}

// ── Tests ───────────────────────────────────────────────────────────

#[tokio::test]
async fn test_updated_push_replaces_cached_brand() {
    let rest = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/brands"))
        .respond_with(ok(json!([{ "id": "b1", "name": "Acme" }])))
        .expect(1)
        .mount(&rest)
        .await;

    let mut pushes = PushServer::start().await;
    let brands: EntityStore<Brand> = store(&rest);
    brands.fetch_all(&ListFilters::new()).await.unwrap();

    let bridge = SyncBridge::start(pushes.url.clone(), fast_options());
    assert_eq!(bridge.channel_state(EntityKind::Brand), ChannelState::Disconnected);
    bridge.attach(&brands);
    assert_eq!(pushes.next_subscribed().await, "brands");
    wait_for_state(&bridge, EntityKind::Brand, ChannelState::Subscribed).await;

    pushes.push(&json!({
        "event": "brands.updated",
        "entityId": "b1",
        "data": { "id": "b1", "name": "Acme Corp" }
    }));

    let b1 = EntityId::from("b1");
    wait_until(|| brands.cached(&b1).is_some_and(|b| b.name == "Acme Corp")).await;
    bridge.shutdown();
}

#[tokio::test]
async fn test_created_and_deleted_pushes_apply_without_network() {
    let rest = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&rest)
        .await;

    let mut pushes = PushServer::start().await;
    let suppliers: EntityStore<Supplier> = store(&rest);
    let bridge = SyncBridge::start(pushes.url.clone(), fast_options());
    bridge.attach(&suppliers);
    pushes.next_subscribed().await;

    pushes.push(&json!({
        "event": "suppliers.created",
        "entityId": "s1",
        "data": { "name": "Northwind", "contact": { "email": "ops@northwind.test" } }
    }));
    let s1 = EntityId::from("s1");
    wait_until(|| suppliers.cached(&s1).is_some()).await;
    assert_eq!(
        suppliers.cached(&s1).unwrap().contact.email.as_deref(),
        Some("ops@northwind.test")
    );

    pushes.push(&json!({ "event": "suppliers.deleted", "entityId": "s1" }));
    wait_until(|| suppliers.is_empty()).await;
    bridge.shutdown();
}

#[tokio::test]
async fn test_malformed_push_is_dropped() {
    let rest = MockServer::start().await;
    let mut pushes = PushServer::start().await;
    let brands: EntityStore<Brand> = store(&rest);
    let bridge = SyncBridge::start(pushes.url.clone(), fast_options());
    bridge.attach(&brands);
    pushes.next_subscribed().await;

    pushes.push(&json!({ "event": "brands.created", "entityId": "b1", "data": { "name": 7 } }));
    pushes.push_raw("not even json");
    pushes.push(&json!({ "event": "brands.created", "entityId": "b2", "data": { "name": "Bolt" } }));

    let b2 = EntityId::from("b2");
    wait_until(|| brands.cached(&b2).is_some()).await;
    assert!(brands.cached(&EntityId::from("b1")).is_none());
    assert_eq!(brands.len(), 1);
    bridge.shutdown();
}

#[tokio::test]
async fn test_sequence_gap_triggers_reconciliation() {
    let rest = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/brands"))
        .respond_with(ok(json!([
            { "id": "b1", "name": "Acme" },
            { "id": "b2", "name": "Bolt" },
            { "id": "b3", "name": "Crate" }
        ])))
        .expect(1)
        .mount(&rest)
        .await;

    let mut pushes = PushServer::start().await;
    let brands: EntityStore<Brand> = store(&rest);
    let bridge = SyncBridge::start(pushes.url.clone(), fast_options());
    bridge.attach(&brands);
    pushes.next_subscribed().await;

    pushes.push(&json!({
        "event": "brands.created", "entityId": "b1", "seq": 1,
        "data": { "id": "b1", "name": "Acme" }
    }));
    // seq 2 never arrives.
    pushes.push(&json!({
        "event": "brands.created", "entityId": "b3", "seq": 3,
        "data": { "id": "b3", "name": "Crate" }
    }));

    let b2 = EntityId::from("b2");
    wait_until(|| brands.cached(&b2).is_some()).await;
    assert_eq!(brands.len(), 3);
    bridge.shutdown();
}

#[tokio::test]
async fn test_resubscribe_after_reconnect_reconciles() {
    let rest = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/brands"))
        .respond_with(ok(json!([{ "id": "b7", "name": "Missed While Offline" }])))
        .mount(&rest)
        .await;

    let mut pushes = PushServer::start().await;
    let brands: EntityStore<Brand> = store(&rest);
    let bridge = SyncBridge::start(pushes.url.clone(), fast_options());
    bridge.attach(&brands);
    pushes.next_subscribed().await;
    wait_for_state(&bridge, EntityKind::Brand, ChannelState::Subscribed).await;
    assert!(brands.is_empty(), "first subscription does not refetch");

    pushes.push_raw("__close__");
    assert_eq!(pushes.next_subscribed().await, "brands");

    let b7 = EntityId::from("b7");
    wait_until(|| brands.cached(&b7).is_some()).await;
    wait_for_state(&bridge, EntityKind::Brand, ChannelState::Subscribed).await;
    bridge.shutdown();
}

#[tokio::test]
async fn test_detached_and_closed_stores_ignore_pushes() {
    let rest = MockServer::start().await;
    let mut pushes = PushServer::start().await;
    let brands: EntityStore<Brand> = store(&rest);
    let suppliers: EntityStore<Supplier> = store(&rest);

    let bridge = SyncBridge::start(pushes.url.clone(), fast_options());
    bridge.attach(&brands);
    bridge.attach(&suppliers);
    pushes.next_subscribed().await;
    pushes.next_subscribed().await;
    wait_for_state(&bridge, EntityKind::Supplier, ChannelState::Subscribed).await;

    bridge.detach(EntityKind::Brand);
    assert_eq!(bridge.attached(), vec![EntityKind::Supplier]);
    suppliers.close();

    pushes.push(&json!({ "event": "brands.created", "entityId": "b1", "data": { "name": "Acme" } }));
    pushes.push(&json!({ "event": "suppliers.created", "entityId": "s1", "data": { "name": "Late" } }));
    // Nothing observable to wait on; let the event task drain.
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert!(brands.is_empty());
    assert!(suppliers.is_empty());
    assert_eq!(bridge.channel_state(EntityKind::Brand), ChannelState::Disconnected);
    bridge.shutdown();
}

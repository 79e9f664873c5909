#![allow(clippy::unwrap_used)]
// Integration tests for `ChannelSocket` against an in-process WebSocket server.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use url::Url;

use stockroom_api::websocket::{
    ChangeAction, ChannelSocket, ReconnectConfig, SocketMessage, SocketStatus,
};

// ── Helpers ─────────────────────────────────────────────────────────

/// Accepts connections; for every connection, acks each `subscribe`,
/// reports the subscribed channel on `subscribed_tx`, then forwards frames
/// from `push_rx`. A `"__close__"` frame closes the current connection.
async fn spawn_server() -> (Url, mpsc::UnboundedSender<String>, mpsc::UnboundedReceiver<String>)
{
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
                        if value["type"] == "subscribe" {
                            let channel = value["channel"].as_str().unwrap().to_owned();
                            let ack = serde_json::json!({ "type": "subscribed", "channel": channel });
                            ws.send(Message::text(ack.to_string())).await.unwrap();
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

    let url = Url::parse(&format!("ws://{addr}/ws")).unwrap();
    (url, push_tx, subscribed_rx)
}

async fn next_change(
    rx: &mut broadcast::Receiver<Arc<SocketMessage>>,
) -> stockroom_api::websocket::ChannelEvent {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        if let SocketMessage::Change(event) = &*msg {
            return event.clone();
        }
    }
}

fn fast_reconnect() -> ReconnectConfig {
    ReconnectConfig {
        initial_delay: Duration::from_millis(20),
        max_delay: Duration::from_millis(100),
        max_retries: None,
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[tokio::test]
async fn test_subscribe_ack_and_push() {
    let (url, push_tx, mut subscribed_rx) = spawn_server().await;
    let socket = ChannelSocket::new(url, fast_reconnect(), CancellationToken::new(), None);
    let mut rx = socket.messages();

    socket.subscribe("brands");
    let channel = tokio::time::timeout(Duration::from_secs(5), subscribed_rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(channel, "brands");

    push_tx
        .send(
            serde_json::json!({
                "event": "brands.updated",
                "entityId": "b1",
                "data": { "id": "b1", "name": "Acme Corp" }
            })
            .to_string(),
        )
        .unwrap();

    let event = next_change(&mut rx).await;
    assert_eq!(event.channel, "brands");
    assert_eq!(event.action, ChangeAction::Updated);
    assert_eq!(event.entity_id, "b1");
    assert_eq!(socket.status(), SocketStatus::Connected);

    socket.shutdown();
}

#[tokio::test]
async fn test_resubscribes_after_reconnect() {
    let (url, push_tx, mut subscribed_rx) = spawn_server().await;
    let socket = ChannelSocket::new(url, fast_reconnect(), CancellationToken::new(), None);

    socket.subscribe("brands");
    socket.subscribe("products");

    let mut first = Vec::new();
    for _ in 0..2 {
        first.push(
            tokio::time::timeout(Duration::from_secs(5), subscribed_rx.recv())
                .await
                .unwrap()
                .unwrap(),
        );
    }
    first.sort();
    assert_eq!(first, vec!["brands".to_owned(), "products".to_owned()]);

    // Server drops the connection; the client must come back and resubscribe.
    push_tx.send("__close__".into()).unwrap();

    let mut second = Vec::new();
    for _ in 0..2 {
        second.push(
            tokio::time::timeout(Duration::from_secs(5), subscribed_rx.recv())
                .await
                .unwrap()
                .unwrap(),
        );
    }
    second.sort();
    assert_eq!(second, first);

    socket.shutdown();
}

#[tokio::test]
async fn test_malformed_frames_are_dropped() {
    let (url, push_tx, mut subscribed_rx) = spawn_server().await;
    let socket = ChannelSocket::new(url, fast_reconnect(), CancellationToken::new(), None);
    let mut rx = socket.messages();

    socket.subscribe("suppliers");
    tokio::time::timeout(Duration::from_secs(5), subscribed_rx.recv())
        .await
        .unwrap()
        .unwrap();

    push_tx.send("{{ definitely not json".into()).unwrap();
    push_tx
        .send(r#"{"event":"suppliers.deleted","entityId":"s1"}"#.into())
        .unwrap();

    let event = next_change(&mut rx).await;
    assert_eq!(event.action, ChangeAction::Deleted);
    assert_eq!(event.entity_id, "s1");

    socket.shutdown();
}

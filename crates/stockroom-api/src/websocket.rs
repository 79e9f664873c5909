//! Channel-based WebSocket client with auto-reconnect.
//!
//! Connects to the backend push endpoint, subscribes to named channels
//! (`"products"`, `"brands"`, ...) and streams parsed frames through a
//! [`tokio::sync::broadcast`] channel. Reconnects with exponential backoff +
//! jitter and re-subscribes every channel in the subscription set after each
//! reconnect.
//!
//! The socket stays idle until the first [`ChannelSocket::subscribe`] call.
//!
//! # Example
//!
//! ```rust,ignore
//! use stockroom_api::websocket::{ChannelSocket, ReconnectConfig, SocketMessage};
//! use tokio_util::sync::CancellationToken;
//!
//! let ws_url = url::Url::parse("wss://shop.example/ws")?;
//! let socket = ChannelSocket::new(ws_url, ReconnectConfig::default(), CancellationToken::new(), None);
//! let mut rx = socket.messages();
//! socket.subscribe("brands");
//!
//! while let Ok(msg) = rx.recv().await {
//!     if let SocketMessage::Change(event) = &*msg {
//!         println!("{} {:?} {}", event.channel, event.action, event.entity_id);
//!     }
//! }
//! ```

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashSet;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc, watch};
use tokio_tungstenite::tungstenite::{self, ClientRequestBuilder};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::error::Error;

// ── Broadcast channel capacity ───────────────────────────────────────

const MESSAGE_CHANNEL_CAPACITY: usize = 1024;

// ── Frames ───────────────────────────────────────────────────────────

/// The kind of change carried by a push frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeAction {
    Created,
    Updated,
    Deleted,
}

impl ChangeAction {
    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "created" => Some(Self::Created),
            "updated" => Some(Self::Updated),
            "deleted" => Some(Self::Deleted),
            _ => None,
        }
    }
}

/// A server push for one entity: `{channel}.{action}` with `{ entityId, data }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelEvent {
    pub channel: String,
    pub action: ChangeAction,
    pub entity_id: String,
    /// Full entity representation (absent on most `deleted` pushes).
    pub data: Option<serde_json::Value>,
    /// Per-channel sequence number, if the server sends one.
    pub seq: Option<u64>,
}

/// Connection status of the underlying transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketStatus {
    Idle,
    Connecting,
    Connected,
    Disconnected,
}

/// Everything the socket task reports, in delivery order.
#[derive(Debug, Clone)]
pub enum SocketMessage {
    Status(SocketStatus),
    /// Server acknowledged a `subscribe` for this channel.
    Subscribed { channel: String },
    /// Server acknowledged an `unsubscribe` for this channel.
    Unsubscribed { channel: String },
    Change(ChannelEvent),
}

/// Client → server control frame.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum ControlFrame {
    Subscribe { channel: String },
    Unsubscribe { channel: String },
}

// ── ReconnectConfig ──────────────────────────────────────────────────

/// Exponential backoff configuration for WebSocket reconnection.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Delay before the first reconnection attempt. Default: 1s.
    pub initial_delay: Duration,

    /// Upper bound on backoff delay. Default: 30s.
    pub max_delay: Duration,

    /// Maximum reconnection attempts before giving up.
    /// `None` means retry forever.
    pub max_retries: Option<u32>,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            max_retries: None,
        }
    }
}

// ── ChannelSocket ────────────────────────────────────────────────────

/// Handle to a running channel socket.
///
/// Dropping the handle closes the control channel, which stops the
/// background task; [`shutdown`](Self::shutdown) does the same eagerly.
pub struct ChannelSocket {
    message_tx: broadcast::Sender<Arc<SocketMessage>>,
    status_rx: watch::Receiver<SocketStatus>,
    control_tx: mpsc::UnboundedSender<ControlFrame>,
    subscriptions: Arc<DashSet<String>>,
    cancel: CancellationToken,
}

impl ChannelSocket {
    /// Spawn the background connection task.
    ///
    /// No connection is attempted until the first channel is subscribed.
    /// `authorization` is injected as the `Authorization` header of the
    /// upgrade request.
    pub fn new(
        ws_url: Url,
        reconnect: ReconnectConfig,
        cancel: CancellationToken,
        authorization: Option<String>,
    ) -> Self {
        let (message_tx, _) = broadcast::channel(MESSAGE_CHANNEL_CAPACITY);
        let (status_tx, status_rx) = watch::channel(SocketStatus::Idle);
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let subscriptions = Arc::new(DashSet::new());

        let task = SocketTask {
            url: ws_url,
            authorization,
            reconnect,
            message_tx: message_tx.clone(),
            status_tx,
            control_rx,
            subscriptions: Arc::clone(&subscriptions),
            cancel: cancel.clone(),
        };
        tokio::spawn(task.run());

        Self {
            message_tx,
            status_rx,
            control_tx,
            subscriptions,
            cancel,
        }
    }

    /// Get a new receiver for everything the socket reports from now on.
    ///
    /// If a consumer falls behind, it receives
    /// [`broadcast::error::RecvError::Lagged`].
    pub fn messages(&self) -> broadcast::Receiver<Arc<SocketMessage>> {
        self.message_tx.subscribe()
    }

    /// Current transport status.
    pub fn status(&self) -> SocketStatus {
        *self.status_rx.borrow()
    }

    /// Watch transport status changes.
    pub fn status_changes(&self) -> watch::Receiver<SocketStatus> {
        self.status_rx.clone()
    }

    /// Add a channel to the subscription set. Sent immediately when
    /// connected, and again after every reconnect.
    pub fn subscribe(&self, channel: &str) {
        if self.subscriptions.insert(channel.to_owned()) {
            let _ = self.control_tx.send(ControlFrame::Subscribe {
                channel: channel.to_owned(),
            });
        }
    }

    /// Remove a channel from the subscription set.
    pub fn unsubscribe(&self, channel: &str) {
        if self.subscriptions.remove(channel).is_some() {
            let _ = self.control_tx.send(ControlFrame::Unsubscribe {
                channel: channel.to_owned(),
            });
        }
    }

    /// Channels currently in the subscription set.
    pub fn channels(&self) -> Vec<String> {
        let mut channels: Vec<String> = self.subscriptions.iter().map(|c| c.key().clone()).collect();
        channels.sort();
        channels
    }

    /// Signal the background task to shut down gracefully.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

// ── Background task ──────────────────────────────────────────────────

/// How a single connection ended without an error.
enum Disconnect {
    /// Server closed or the stream ended; reconnect.
    Remote,
    /// Cancelled or the handle was dropped; stop.
    Shutdown,
}

struct SocketTask {
    url: Url,
    authorization: Option<String>,
    reconnect: ReconnectConfig,
    message_tx: broadcast::Sender<Arc<SocketMessage>>,
    status_tx: watch::Sender<SocketStatus>,
    control_rx: mpsc::UnboundedReceiver<ControlFrame>,
    subscriptions: Arc<DashSet<String>>,
    cancel: CancellationToken,
}

impl SocketTask {
    /// Wait for a first subscription, then: connect → read → on error,
    /// backoff → reconnect.
    async fn run(mut self) {
        if !self.wait_for_first_subscription().await {
            tracing::debug!("WebSocket task exiting before first subscription");
            return;
        }

        let mut attempt: u32 = 0;

        loop {
            self.set_status(SocketStatus::Connecting);
            let result = self.connect_and_read().await;
            self.set_status(SocketStatus::Disconnected);

            match result {
                Ok(Disconnect::Shutdown) => break,
                // Clean disconnect (server close frame or stream ended).
                // Reset attempt counter and reconnect immediately.
                Ok(Disconnect::Remote) => {
                    tracing::info!("WebSocket disconnected cleanly, reconnecting");
                    attempt = 0;
                }
                Err(e) => {
                    tracing::warn!(error = %e, attempt, "WebSocket error");

                    if let Some(max) = self.reconnect.max_retries {
                        if attempt >= max {
                            tracing::error!(
                                max_retries = max,
                                "WebSocket reconnection limit reached, giving up"
                            );
                            break;
                        }
                    }

                    let delay = calculate_backoff(attempt, &self.reconnect);
                    tracing::info!(
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        attempt,
                        "Waiting before reconnect"
                    );

                    tokio::select! {
                        biased;
                        () = self.cancel.cancelled() => break,
                        () = tokio::time::sleep(delay) => {}
                    }

                    attempt = attempt.saturating_add(1);
                }
            }
        }

        tracing::debug!("WebSocket loop exiting");
    }

    /// Returns `false` if cancelled or the handle was dropped first.
    async fn wait_for_first_subscription(&mut self) -> bool {
        while self.subscriptions.is_empty() {
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => return false,
                frame = self.control_rx.recv() => {
                    if frame.is_none() {
                        return false;
                    }
                }
            }
        }
        true
    }

    fn set_status(&self, status: SocketStatus) {
        if *self.status_tx.borrow() != status {
            let _ = self.status_tx.send(status);
            let _ = self.message_tx.send(Arc::new(SocketMessage::Status(status)));
        }
    }

    /// Establish a single connection, (re)subscribe, read until it drops.
    async fn connect_and_read(&mut self) -> Result<Disconnect, Error> {
        tracing::info!(url = %self.url, "Connecting to WebSocket");

        let uri: tungstenite::http::Uri = self.url.as_str().parse().map_err(
            |e: tungstenite::http::uri::InvalidUri| Error::WebSocketConnect(e.to_string()),
        )?;

        let mut request = ClientRequestBuilder::new(uri);
        if let Some(ref auth) = self.authorization {
            request = request.with_header("Authorization", auth.clone());
        }

        let connect = tokio_tungstenite::connect_async(request);
        let (ws_stream, _response) = tokio::select! {
            biased;
            () = self.cancel.cancelled() => return Ok(Disconnect::Shutdown),
            result = connect => result.map_err(|e| Error::WebSocketConnect(e.to_string()))?,
        };

        tracing::info!("WebSocket connected");
        self.set_status(SocketStatus::Connected);

        let (mut write, mut read) = ws_stream.split();

        // Frames queued while disconnected are superseded by the full
        // subscription set sent below.
        while self.control_rx.try_recv().is_ok() {}

        let mut channels: Vec<String> = self.subscriptions.iter().map(|c| c.key().clone()).collect();
        channels.sort();
        for channel in &channels {
            tracing::debug!(%channel, "Subscribing");
            write
                .send(control_message(&ControlFrame::Subscribe {
                    channel: channel.clone(),
                })?)
                .await
                .map_err(|e| Error::WebSocketConnect(e.to_string()))?;
        }
        // A `subscribe()` racing the replay can land in the set and still
        // queue its own frame.
        let mut replayed: HashSet<String> = channels.into_iter().collect();

        loop {
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => {
                    let _ = write.send(tungstenite::Message::Close(None)).await;
                    return Ok(Disconnect::Shutdown);
                }
                control = self.control_rx.recv() => {
                    let Some(frame) = control else {
                        return Ok(Disconnect::Shutdown);
                    };
                    if !should_send(&mut replayed, &frame) {
                        continue;
                    }
                    write
                        .send(control_message(&frame)?)
                        .await
                        .map_err(|e| Error::WebSocketConnect(e.to_string()))?;
                }
                frame = read.next() => {
                    match frame {
                        Some(Ok(tungstenite::Message::Text(text))) => {
                            parse_and_broadcast(text.as_str(), &self.message_tx);
                        }
                        Some(Ok(tungstenite::Message::Ping(_))) => {
                            // tungstenite handles pong replies automatically
                            tracing::trace!("WebSocket ping");
                        }
                        Some(Ok(tungstenite::Message::Close(frame))) => {
                            if let Some(ref cf) = frame {
                                tracing::info!(
                                    code = %cf.code,
                                    reason = %cf.reason,
                                    "WebSocket close frame received"
                                );
                            } else {
                                tracing::info!("WebSocket close frame received (no payload)");
                            }
                            return Ok(Disconnect::Remote);
                        }
                        Some(Err(e)) => {
                            return Err(Error::WebSocketConnect(e.to_string()));
                        }
                        None => {
                            tracing::info!("WebSocket stream ended");
                            return Ok(Disconnect::Remote);
                        }
                        _ => {
                            // Binary, Pong, Frame -- ignore
                        }
                    }
                }
            }
        }
    }
}

fn control_message(frame: &ControlFrame) -> Result<tungstenite::Message, Error> {
    let text = serde_json::to_string(frame).map_err(|e| Error::Deserialization {
        message: e.to_string(),
        body: String::new(),
    })?;
    Ok(tungstenite::Message::text(text))
}

// ── Message parsing ──────────────────────────────────────────────────

/// Raw shape of every server frame. Acks carry `type` + `channel`;
/// pushes carry `event` (`"{channel}.{action}"`) + `entityId` + `data`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawFrame {
    #[serde(rename = "type", default)]
    frame_type: Option<String>,
    #[serde(default)]
    channel: Option<String>,
    #[serde(default)]
    event: Option<String>,
    #[serde(default)]
    entity_id: Option<serde_json::Value>,
    #[serde(default)]
    data: Option<serde_json::Value>,
    #[serde(default)]
    seq: Option<u64>,
}

/// Interpret a text frame. Returns `None` for anything unrecognized.
fn parse_frame(text: &str) -> Option<SocketMessage> {
    let raw: RawFrame = match serde_json::from_str(text) {
        Ok(f) => f,
        Err(e) => {
            tracing::debug!(error = %e, "Failed to parse WebSocket frame");
            return None;
        }
    };

    match (raw.frame_type.as_deref(), raw.channel) {
        (Some("subscribed"), Some(channel)) => return Some(SocketMessage::Subscribed { channel }),
        (Some("unsubscribed"), Some(channel)) => {
            return Some(SocketMessage::Unsubscribed { channel });
        }
        _ => {}
    }

    let event = raw.event?;
    let (channel, action) = event.rsplit_once('.')?;
    let Some(action) = ChangeAction::parse(action) else {
        tracing::debug!(event = %event, "Unknown change action");
        return None;
    };

    // Fall back to `data.id` when the push omits `entityId`.
    let entity_id = raw
        .entity_id
        .as_ref()
        .or_else(|| raw.data.as_ref().and_then(|d| d.get("id")))
        .and_then(id_to_string)?;

    Some(SocketMessage::Change(ChannelEvent {
        channel: channel.to_owned(),
        action,
        entity_id,
        data: raw.data.filter(|d| !d.is_null()),
        seq: raw.seq,
    }))
}

fn id_to_string(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Parse a text frame and broadcast it if recognized.
fn parse_and_broadcast(text: &str, message_tx: &broadcast::Sender<Arc<SocketMessage>>) {
    match parse_frame(text) {
        // Ignore send errors -- just means no active subscribers right now
        Some(message) => {
            let _ = message_tx.send(Arc::new(message));
        }
        None => tracing::debug!("Dropping unrecognized WebSocket frame"),
    }
}

// ── Backoff calculation ──────────────────────────────────────────────

/// Exponential backoff with jitter.
///
/// `delay = min(initial * 2^attempt, max) + jitter`
///
/// Jitter is +-25% to spread out reconnection storms from multiple clients.
fn calculate_backoff(attempt: u32, config: &ReconnectConfig) -> Duration {
    let exponent = i32::try_from(attempt.min(31)).unwrap_or(31);
    let base = config.initial_delay.as_secs_f64() * 2.0_f64.powi(exponent);
    let capped = base.min(config.max_delay.as_secs_f64());

    // Deterministic "jitter" seeded from the attempt number.
    let jitter_factor = 1.0 + 0.25 * (f64::from(attempt) * 7.3).sin();
    let with_jitter = (capped * jitter_factor).max(0.0);

    Duration::from_secs_f64(with_jitter)
}

// ── Tests ────────────────────────────────────────────────────────────

/// Whether a queued control frame still needs sending after the
/// subscription set was replayed. Each replayed channel swallows at most
/// one `Subscribe`; an `Unsubscribe` ends that.
fn should_send(replayed: &mut HashSet<String>, frame: &ControlFrame) -> bool {
    match frame {
        ControlFrame::Subscribe { channel } => !replayed.remove(channel),
        ControlFrame::Unsubscribe { channel } => {
            replayed.remove(channel);
            true
        }
    }
}

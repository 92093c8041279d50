//! Hub websocket with auto-reconnect.
//!
//! Each location with an alarm base station or lighting bridge exposes its
//! hub devices over a socket.io (Engine.IO v3) websocket. A
//! [`HubConnection`] obtains a ticket over REST, connects, requests the
//! device list from every hub asset, and streams parsed updates through a
//! [`tokio::sync::broadcast`] channel. Connection state is published on a
//! [`tokio::sync::watch`] channel. Reconnection uses exponential backoff
//! with jitter.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::sync::{broadcast, mpsc, watch};
use tokio_tungstenite::tungstenite::{self, ClientRequestBuilder};
use tokio_util::sync::CancellationToken;

use crate::client::RingClient;
use crate::error::Error;
use crate::models::HubDevice;

// ── Channel capacity ─────────────────────────────────────────────────

const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Engine.IO v3 expects the client to ping within the server's interval.
const PING_INTERVAL: Duration = Duration::from_secs(20);

// ── HubEvent ─────────────────────────────────────────────────────────

/// A parsed message from a hub websocket.
#[derive(Debug, Clone, PartialEq)]
pub enum HubEvent {
    /// Full device list, sent in response to `DeviceInfoDocGetList`.
    DeviceList(Vec<HubDevice>),
    /// Partial device documents pushed when state changes.
    DataUpdate(Vec<HubDevice>),
}

impl HubEvent {
    pub fn devices(&self) -> &[HubDevice] {
        match self {
            Self::DeviceList(devices) | Self::DataUpdate(devices) => devices,
        }
    }
}

// ── Reconnect policy ─────────────────────────────────────────────────

/// How a dropped hub socket is retried.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    /// Give up after this many failed attempts; unlimited when `None`.
    pub max_retries: Option<u32>,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            max_retries: None,
        }
    }
}

// ── HubConnection ────────────────────────────────────────────────────

/// An outbound `DeviceInfoSet` body for one device.
#[derive(Debug)]
struct HubRequest {
    zid: String,
    body: Value,
}

/// Handle to a running hub websocket.
pub struct HubConnection {
    location_id: String,
    event_rx: broadcast::Receiver<Arc<HubEvent>>,
    command_tx: mpsc::UnboundedSender<HubRequest>,
    connected: watch::Receiver<bool>,
    cancel: CancellationToken,
}

impl HubConnection {
    /// Spawn the connection loop for a location.
    ///
    /// Returns immediately; the first connection attempt happens in the
    /// background. Watch [`connection`](Self::connection) to learn when the
    /// socket is up.
    pub fn connect(
        client: RingClient,
        location_id: String,
        reconnect: ReconnectConfig,
        cancel: CancellationToken,
    ) -> Self {
        let (event_tx, event_rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (connected_tx, connected) = watch::channel(false);

        let task_cancel = cancel.clone();
        let task_location = location_id.clone();
        tokio::spawn(async move {
            ws_loop(
                client,
                task_location,
                event_tx,
                connected_tx,
                command_rx,
                reconnect,
                task_cancel,
            )
            .await;
        });

        Self {
            location_id,
            event_rx,
            command_tx,
            connected,
            cancel,
        }
    }

    pub fn location_id(&self) -> &str {
        &self.location_id
    }

    /// Get a new broadcast receiver for hub events.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<HubEvent>> {
        self.event_rx.resubscribe()
    }

    /// Watch the connected flag.
    pub fn connection(&self) -> watch::Receiver<bool> {
        self.connected.clone()
    }

    pub fn is_connected(&self) -> bool {
        *self.connected.borrow()
    }

    /// Set `device.v1` fields on a hub device.
    pub fn set_device_info(&self, zid: &str, fields: Value) -> Result<(), Error> {
        self.enqueue(zid, json!({ "zid": zid, "device": { "v1": fields } }))
    }

    /// Send a typed command to a hub device.
    pub fn send_command(&self, zid: &str, command_type: &str, data: Value) -> Result<(), Error> {
        self.enqueue(
            zid,
            json!({
                "zid": zid,
                "command": { "v1": [{ "commandType": command_type, "data": data }] },
            }),
        )
    }

    fn enqueue(&self, zid: &str, body: Value) -> Result<(), Error> {
        if !self.is_connected() {
            return Err(Error::HubUnavailable {
                location_id: self.location_id.clone(),
            });
        }
        self.command_tx
            .send(HubRequest {
                zid: zid.to_owned(),
                body,
            })
            .map_err(|_| Error::HubUnavailable {
                location_id: self.location_id.clone(),
            })
    }

    /// Close the socket and stop reconnecting.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

// ── Connection loop ──────────────────────────────────────────────────

/// Ticket, connect, read until the socket drops, then reconnect. Errors
/// back off; a clean close from the hub reconnects at once.
async fn ws_loop(
    client: RingClient,
    location_id: String,
    event_tx: broadcast::Sender<Arc<HubEvent>>,
    connected_tx: watch::Sender<bool>,
    mut command_rx: mpsc::UnboundedReceiver<HubRequest>,
    reconnect: ReconnectConfig,
    cancel: CancellationToken,
) {
    let mut attempt: u32 = 0;

    loop {
        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            result = connect_and_read(
                &client,
                &location_id,
                &event_tx,
                &connected_tx,
                &mut command_rx,
                &cancel,
            ) => result,
        };
        connected_tx.send_replace(false);

        match result {
            Ok(()) => {
                if cancel.is_cancelled() {
                    break;
                }
                tracing::info!(location_id = %location_id, "hub websocket closed, reconnecting");
                attempt = 0;
            }
            Err(e) => {
                tracing::warn!(location_id = %location_id, error = %e, attempt, "hub websocket error");

                if let Some(max) = reconnect.max_retries {
                    if attempt >= max {
                        tracing::error!(
                            location_id = %location_id,
                            max_retries = max,
                            "hub websocket reconnection limit reached, giving up"
                        );
                        break;
                    }
                }

                let delay = calculate_backoff(attempt, &reconnect);
                tracing::info!(
                    location_id = %location_id,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    attempt,
                    "waiting before reconnect"
                );

                tokio::select! {
                    biased;
                    () = cancel.cancelled() => break,
                    () = tokio::time::sleep(delay) => {}
                }

                attempt = attempt.saturating_add(1);
            }
        }
    }

    tracing::debug!(location_id = %location_id, "hub websocket loop exiting");
}

// ── One socket session ───────────────────────────────────────────────

async fn connect_and_read(
    client: &RingClient,
    location_id: &str,
    event_tx: &broadcast::Sender<Arc<HubEvent>>,
    connected_tx: &watch::Sender<bool>,
    command_rx: &mut mpsc::UnboundedReceiver<HubRequest>,
    cancel: &CancellationToken,
) -> Result<(), Error> {
    let ticket = client.hub_ticket(location_id).await?;
    let assets: Vec<String> = ticket
        .assets
        .iter()
        .filter(|a| a.is_online())
        .map(|a| a.uuid.clone())
        .collect();

    let url = format!(
        "wss://{}/socket.io/?authcode={}&ack=false&EIO=3&transport=websocket",
        ticket.host, ticket.ticket
    );
    tracing::info!(location_id, host = %ticket.host, "connecting to hub websocket");

    let uri: tungstenite::http::Uri = url
        .parse()
        .map_err(|e: tungstenite::http::uri::InvalidUri| Error::WebSocketConnect(e.to_string()))?;

    let (ws_stream, _response) = tokio_tungstenite::connect_async(ClientRequestBuilder::new(uri))
        .await
        .map_err(|e| Error::WebSocketConnect(e.to_string()))?;

    let (mut write, mut read) = ws_stream.split();
    let mut zid_assets: HashMap<String, String> = HashMap::new();
    let mut seq: u64 = 1;
    let mut ping = tokio::time::interval(PING_INTERVAL);
    ping.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        let outbound = tokio::select! {
            biased;
            () = cancel.cancelled() => return Ok(()),
            frame = read.next() => {
                match frame {
                    Some(Ok(tungstenite::Message::Text(text))) => match parse_frame(&text) {
                        Frame::Connect => {
                            tracing::info!(location_id, hubs = assets.len(), "hub websocket connected");
                            connected_tx.send_replace(true);
                            for asset in &assets {
                                let msg = device_list_request(asset, seq);
                                seq += 1;
                                write.send(tungstenite::Message::text(msg)).await
                                    .map_err(|e| Error::WebSocketConnect(e.to_string()))?;
                            }
                            None
                        }
                        Frame::Ping => Some("3".to_owned()),
                        Frame::Event(payload) => {
                            if let Some(event) = decode_event(&payload, &mut zid_assets) {
                                // No subscribers is fine
                                let _ = event_tx.send(Arc::new(event));
                            }
                            None
                        }
                        Frame::Open | Frame::Pong | Frame::Other => None,
                    },
                    Some(Ok(tungstenite::Message::Close(frame))) => {
                        if let Some(ref cf) = frame {
                            tracing::info!(location_id, code = %cf.code, reason = %cf.reason, "hub close frame received");
                        }
                        return Ok(());
                    }
                    Some(Err(e)) => return Err(Error::WebSocketConnect(e.to_string())),
                    None => {
                        tracing::info!(location_id, "hub websocket stream ended");
                        return Ok(());
                    }
                    // Binary, Ping, Pong, Frame -- ignore
                    Some(Ok(_)) => None,
                }
            }
            request = command_rx.recv() => {
                let Some(request) = request else { return Ok(()) };
                let Some(asset) = zid_assets.get(&request.zid).or_else(|| assets.first()) else {
                    tracing::warn!(location_id, zid = %request.zid, "no hub asset for device, dropping command");
                    continue;
                };
                let msg = device_info_set(asset, seq, request.body);
                seq += 1;
                Some(msg)
            }
            _ = ping.tick() => Some("2".to_owned()),
        };

        if let Some(text) = outbound {
            write
                .send(tungstenite::Message::text(text))
                .await
                .map_err(|e| Error::WebSocketConnect(e.to_string()))?;
        }
    }
}

// ── Frame codec ──────────────────────────────────────────────────────

#[derive(Debug, PartialEq)]
enum Frame {
    Open,
    Connect,
    Ping,
    Pong,
    Event(Value),
    Other,
}

fn parse_frame(text: &str) -> Frame {
    if let Some(rest) = text.strip_prefix("42") {
        return serde_json::from_str(rest).map_or(Frame::Other, Frame::Event);
    }
    match text {
        "40" => Frame::Connect,
        "2" => Frame::Ping,
        "3" => Frame::Pong,
        t if t.starts_with('0') => Frame::Open,
        _ => Frame::Other,
    }
}

/// Decode a socket.io event into a [`HubEvent`], remembering which hub
/// asset reported each device.
fn decode_event(payload: &Value, zid_assets: &mut HashMap<String, String>) -> Option<HubEvent> {
    let message = payload.as_array()?.get(1)?;
    let msg_type = message["msg"].as_str()?;
    let src = message["src"].as_str();

    let devices: Vec<HubDevice> = message["body"]
        .as_array()?
        .iter()
        .filter_map(|doc| HubDevice::from_document(doc, src))
        .collect();

    for device in &devices {
        if let Some(asset) = &device.asset {
            zid_assets.insert(device.zid.clone(), asset.clone());
        }
    }

    match (msg_type, message["datatype"].as_str()) {
        ("DeviceInfoDocGetList", _) => Some(HubEvent::DeviceList(devices)),
        ("DataUpdate", Some("DeviceInfoDocType")) => Some(HubEvent::DataUpdate(devices)),
        _ => {
            tracing::trace!(msg_type, "ignoring hub message");
            None
        }
    }
}

fn device_list_request(asset: &str, seq: u64) -> String {
    let msg = json!(["message", { "msg": "DeviceInfoDocGetList", "dst": asset, "seq": seq }]);
    format!("42{msg}")
}

fn device_info_set(asset: &str, seq: u64, body: Value) -> String {
    let msg = json!(["message", {
        "msg": "DeviceInfoSet",
        "datatype": "DeviceInfoSetType",
        "body": [body],
        "dst": asset,
        "seq": seq,
    }]);
    format!("42{msg}")
}

// ── Backoff ──────────────────────────────────────────────────────────

/// Delay before reconnect attempt `attempt` (zero based): the initial
/// delay doubled per attempt, capped at `max_delay`, then spread by up to
/// a quarter either way so hubs dropped together do not reconnect in step.
#[allow(clippy::as_conversions, clippy::cast_possible_wrap)]
fn calculate_backoff(attempt: u32, config: &ReconnectConfig) -> Duration {
    let doubled = config.initial_delay.as_secs_f64() * 2.0_f64.powi(attempt.min(30) as i32);
    let bounded = doubled.min(config.max_delay.as_secs_f64());
    let spread = 0.25 * (f64::from(attempt) * 7.3).sin();
    Duration::from_secs_f64((bounded * (1.0 + spread)).max(0.0))
}

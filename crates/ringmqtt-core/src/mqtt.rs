// ── MQTT transport ──
//
// Device wrappers never touch the broker client. They enqueue publish and
// subscribe requests on an `MqttPublisher`; `run_mqtt` drains that queue
// into a rumqttc client and forwards broker connectivity and inbound
// messages to the controller as `BridgeEvent`s.

use std::time::Duration;

use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS, Transport};
use secrecy::ExposeSecret;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::MqttConfig;
use crate::error::CoreError;
use crate::event::{BridgeEvent, EventSender};

const CLIENT_CHANNEL_CAPACITY: usize = 256;
const RECONNECT_DELAY: Duration = Duration::from_secs(5);
const FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

// ── Publisher ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MqttRequest {
    Publish {
        topic: String,
        payload: String,
        retain: bool,
    },
    Subscribe {
        topic: String,
    },
}

/// Cheap, cloneable handle for enqueueing broker requests.
#[derive(Debug, Clone)]
pub struct MqttPublisher {
    tx: mpsc::UnboundedSender<MqttRequest>,
}

impl MqttPublisher {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<MqttRequest>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn publish(&self, topic: impl Into<String>, payload: impl Into<String>, retain: bool) {
        self.send(MqttRequest::Publish {
            topic: topic.into(),
            payload: payload.into(),
            retain,
        });
    }

    pub fn subscribe(&self, topic: impl Into<String>) {
        self.send(MqttRequest::Subscribe {
            topic: topic.into(),
        });
    }

    fn send(&self, request: MqttRequest) {
        if self.tx.send(request).is_err() {
            debug!("mqtt transport stopped, dropping request");
        }
    }
}

// ── Options ──────────────────────────────────────────────────────────

/// Build client options from a `mqtt://` / `mqtts://` URL.
pub fn mqtt_options(config: &MqttConfig) -> Result<MqttOptions, CoreError> {
    let url = &config.url;
    let tls = match url.scheme() {
        "mqtt" | "tcp" => false,
        "mqtts" | "ssl" => true,
        other => {
            return Err(CoreError::Config {
                message: format!("mqtt_url: unsupported scheme {other:?}"),
            });
        }
    };
    let host = url.host_str().ok_or_else(|| CoreError::Config {
        message: "mqtt_url: missing host".into(),
    })?;
    let port = url.port().unwrap_or(if tls { 8883 } else { 1883 });

    let mut options = MqttOptions::new(config.client_id.clone(), host, port);
    options.set_keep_alive(config.keep_alive);
    options.set_clean_session(true);
    if tls {
        options.set_transport(Transport::tls_with_default_config());
    }

    let username = config
        .username
        .clone()
        .or_else(|| Some(url.username().to_owned()).filter(|u| !u.is_empty()));
    let password = config
        .password
        .as_ref()
        .map(|p| p.expose_secret().to_owned())
        .or_else(|| url.password().map(str::to_owned));
    if let Some(username) = username {
        options.set_credentials(username, password.unwrap_or_default());
    }

    Ok(options)
}

// ── Transport loop ───────────────────────────────────────────────────

/// Run the broker connection until cancelled.
///
/// Requests still queued at cancellation are flushed before disconnecting,
/// so offline availability published during shutdown reaches the broker.
pub async fn run_mqtt(
    config: MqttConfig,
    mut requests: mpsc::UnboundedReceiver<MqttRequest>,
    events: EventSender,
    hass_topic: String,
    cancel: CancellationToken,
) -> Result<(), CoreError> {
    let options = mqtt_options(&config)?;
    info!(url = %config.url, client_id = %config.client_id, "connecting to MQTT broker");

    let (client, eventloop) = AsyncClient::new(options, CLIENT_CHANNEL_CAPACITY);
    let poller = tokio::spawn(poll_loop(
        eventloop,
        client.clone(),
        events,
        hass_topic,
        cancel.clone(),
    ));

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            request = requests.recv() => {
                let Some(request) = request else { break };
                forward(&client, request).await;
            }
        }
    }

    while let Ok(request) = requests.try_recv() {
        forward(&client, request).await;
    }
    if let Err(e) = client.disconnect().await {
        debug!(error = %e, "mqtt disconnect request failed");
    }
    if tokio::time::timeout(FLUSH_TIMEOUT, poller).await.is_err() {
        warn!("mqtt event loop did not stop in time");
    }
    info!("mqtt transport stopped");
    Ok(())
}

async fn forward(client: &AsyncClient, request: MqttRequest) {
    let result = match request {
        MqttRequest::Publish {
            topic,
            payload,
            retain,
        } => client
            .publish(topic, QoS::AtLeastOnce, retain, payload.into_bytes())
            .await,
        MqttRequest::Subscribe { topic } => client.subscribe(topic, QoS::AtLeastOnce).await,
    };
    if let Err(e) = result {
        warn!(error = %e, "mqtt request failed");
    }
}

async fn poll_loop(
    mut eventloop: EventLoop,
    client: AsyncClient,
    events: EventSender,
    hass_topic: String,
    cancel: CancellationToken,
) {
    let mut connected = false;

    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                info!(code = ?ack.code, "connected to MQTT broker");
                connected = true;
                if let Err(e) = client.try_subscribe(hass_topic.clone(), QoS::AtLeastOnce) {
                    warn!(error = %e, topic = %hass_topic, "subscribe failed");
                }
                let _ = events.send(BridgeEvent::MqttConnected);
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                let payload = String::from_utf8_lossy(&publish.payload).into_owned();
                let _ = events.send(BridgeEvent::MqttMessage {
                    topic: publish.topic,
                    payload,
                });
            }
            Ok(Event::Outgoing(Outgoing::Disconnect)) => break,
            Ok(_) => {}
            Err(e) => {
                if cancel.is_cancelled() {
                    break;
                }
                if connected {
                    connected = false;
                    let _ = events.send(BridgeEvent::MqttDisconnected);
                }
                warn!(error = %e, "mqtt connection error, retrying");
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => break,
                    () = tokio::time::sleep(RECONNECT_DELAY) => {}
                }
            }
        }
    }
    debug!("mqtt event loop exiting");
}

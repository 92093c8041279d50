// ── Bridge events ──
//
// Everything that drives the lifecycle controller arrives as a
// `BridgeEvent` on one unbounded channel: broker connectivity and
// messages, hub connectivity, vendor data pushes, camera events, pulse
// expiries, and discovery retries.

use serde_json::{Map, Value};
use tokio::sync::mpsc;

use crate::model::CameraEventKind;

#[derive(Debug, Clone, PartialEq)]
pub enum BridgeEvent {
    MqttConnected,
    MqttDisconnected,
    MqttMessage {
        topic: String,
        payload: String,
    },
    LocationConnection {
        location_id: String,
        connected: bool,
    },
    /// Partial vendor payload for one device.
    DeviceData {
        device_id: String,
        data: Map<String, Value>,
    },
    CameraEvent {
        device_id: String,
        kind: CameraEventKind,
    },
    PulseExpired {
        device_id: String,
        entity: String,
        generation: u64,
    },
    /// The discovery retry delay elapsed.
    DiscoveryRetry,
}

pub type EventSender = mpsc::UnboundedSender<BridgeEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<BridgeEvent>;

pub fn channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}

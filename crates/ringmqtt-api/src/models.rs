// Wire types for the Ring REST API and hub websocket.
//
// Every struct captures unknown fields through `#[serde(flatten)]` so the
// bridge can surface vendor data it does not model explicitly.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ── Locations ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct LocationsResponse {
    #[serde(default)]
    pub user_locations: Vec<RawLocation>,
}

/// A location from `GET /rhq/v1/devices/v1/locations`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawLocation {
    pub location_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

// ── REST devices ─────────────────────────────────────────────────────

/// Response of `GET /clients_api/ring_devices`, grouped by family.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RingDevicesResponse {
    #[serde(default)]
    pub doorbots: Vec<RawRestDevice>,
    #[serde(default)]
    pub authorized_doorbots: Vec<RawRestDevice>,
    #[serde(default)]
    pub stickup_cams: Vec<RawRestDevice>,
    #[serde(default)]
    pub chimes: Vec<RawRestDevice>,
    #[serde(default)]
    pub other: Vec<RawRestDevice>,
    #[serde(default)]
    pub base_stations: Vec<RawRestDevice>,
    #[serde(default)]
    pub beams_bridges: Vec<RawRestDevice>,
}

impl RingDevicesResponse {
    /// Whether the location owns an alarm base station or lighting bridge.
    pub fn location_has_hubs(&self, location_id: &str) -> bool {
        self.base_stations
            .iter()
            .chain(&self.beams_bridges)
            .any(|d| d.location_id == location_id)
    }

    /// Intercoms live in the `other` bucket alongside unrelated hardware.
    pub fn intercoms(&self) -> impl Iterator<Item = &RawRestDevice> {
        self.other.iter().filter(|d| d.kind.starts_with("intercom_handset"))
    }
}

/// A camera, chime or intercom as returned by the REST API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawRestDevice {
    pub id: u64,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub location_id: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

// ── Events ───────────────────────────────────────────────────────────

/// One entry of `GET /clients_api/doorbots/{id}/history`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawHistoryEvent {
    pub id: u64,
    pub created_at: DateTime<Utc>,
    pub kind: String,
    #[serde(default)]
    pub answered: bool,
}

/// An entry of `GET /clients_api/dings/active`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawActiveDing {
    pub id: u64,
    pub doorbot_id: u64,
    pub kind: String,
    #[serde(default)]
    pub state: Option<String>,
}

// ── Hub websocket ────────────────────────────────────────────────────

/// Response of `GET /api/v1/clap/tickets`.
#[derive(Debug, Clone, Deserialize)]
pub struct HubTicket {
    pub host: String,
    pub ticket: String,
    #[serde(default)]
    pub assets: Vec<HubAsset>,
}

/// A hub (base station, lighting bridge) reachable over the websocket.
#[derive(Debug, Clone, Deserialize)]
pub struct HubAsset {
    pub uuid: String,
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub status: String,
}

impl HubAsset {
    pub fn is_online(&self) -> bool {
        self.status == "online"
    }
}

/// A device reported by a hub, flattened from its `general.v2` and
/// `device.v1` documents.
#[derive(Debug, Clone, PartialEq)]
pub struct HubDevice {
    pub zid: String,
    /// Asset uuid of the hub that reported this device.
    pub asset: Option<String>,
    pub fields: Map<String, Value>,
}

impl HubDevice {
    /// Parse one device document. Returns `None` when the document carries
    /// no `zid`.
    pub fn from_document(doc: &Value, asset: Option<&str>) -> Option<Self> {
        let mut fields = Map::new();
        for section in [&doc["general"]["v2"], &doc["device"]["v1"]] {
            if let Value::Object(map) = section {
                fields.extend(map.iter().map(|(k, v)| (k.clone(), v.clone())));
            }
        }
        let zid = fields.get("zid")?.as_str()?.to_owned();
        Some(Self {
            zid,
            asset: asset.map(str::to_owned),
            fields,
        })
    }

    pub fn device_type(&self) -> &str {
        self.str_field("deviceType").unwrap_or_default()
    }

    pub fn name(&self) -> &str {
        self.str_field("name").unwrap_or_default()
    }

    pub fn parent_zid(&self) -> Option<&str> {
        self.str_field("parentZid")
    }

    pub fn category_id(&self) -> Option<u64> {
        self.fields.get("categoryId").and_then(Value::as_u64)
    }

    fn str_field(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(Value::as_str)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn hub_device_merges_general_and_device_sections() {
        let doc = json!({
            "general": { "v2": {
                "zid": "z1", "name": "Front Door", "deviceType": "sensor.contact",
                "parentZid": "hub", "categoryId": 5, "batteryLevel": 88
            }},
            "device": { "v1": { "faulted": true } }
        });

        let dev = HubDevice::from_document(&doc, Some("asset-1")).unwrap();
        assert_eq!(dev.zid, "z1");
        assert_eq!(dev.device_type(), "sensor.contact");
        assert_eq!(dev.parent_zid(), Some("hub"));
        assert_eq!(dev.category_id(), Some(5));
        assert_eq!(dev.fields["faulted"], true);
        assert_eq!(dev.asset.as_deref(), Some("asset-1"));
    }

    #[test]
    fn hub_device_without_zid_is_rejected() {
        let doc = json!({ "general": { "v2": { "name": "x" } } });
        assert!(HubDevice::from_document(&doc, None).is_none());
    }

    #[test]
    fn ring_devices_detects_hubs_and_intercoms() {
        let resp: RingDevicesResponse = serde_json::from_value(json!({
            "base_stations": [{ "id": 1, "kind": "base_station_v1", "location_id": "loc1" }],
            "other": [
                { "id": 2, "kind": "intercom_handset_audio", "location_id": "loc1" },
                { "id": 3, "kind": "something_else", "location_id": "loc1" }
            ]
        }))
        .unwrap();

        assert!(resp.location_has_hubs("loc1"));
        assert!(!resp.location_has_hubs("loc2"));
        assert_eq!(resp.intercoms().count(), 1);
    }
}

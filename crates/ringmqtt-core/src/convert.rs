// ── API-to-domain type conversions ──
//
// Bridges raw `ringmqtt-api` response types into canonical `model` types.


use serde_json::Value;

use ringmqtt_api::{HubDevice, RawHistoryEvent, RawLocation, RawRestDevice, RingDevicesResponse};

use crate::model::{CameraEventKind, DeviceCategory, HistoryEvent, Location, VendorDevice};

pub fn location_from_raw(raw: &RawLocation, has_hubs: bool) -> Location {
    Location {
        id: raw.location_id.clone(),
        name: if raw.name.is_empty() {
            raw.location_id.clone()
        } else {
            raw.name.clone()
        },
        has_hubs,
    }
}

/// Convert a hub websocket document.
pub fn device_from_hub(location_id: &str, raw: &HubDevice) -> VendorDevice {
    VendorDevice {
        id: raw.zid.clone(),
        location_id: location_id.to_owned(),
        category: DeviceCategory::Hub,
        device_type: raw.device_type().to_owned(),
        name: raw.name().to_owned(),
        parent_id: raw.parent_zid().map(str::to_owned),
        category_id: raw.category_id(),
        data: raw.fields.clone(),
    }
}

fn device_from_rest(raw: &RawRestDevice, category: DeviceCategory) -> VendorDevice {
    VendorDevice {
        id: raw.id.to_string(),
        location_id: raw.location_id.clone(),
        category,
        device_type: raw.kind.clone(),
        name: if raw.description.is_empty() {
            raw.kind.clone()
        } else {
            raw.description.clone()
        },
        parent_id: None,
        category_id: None,
        data: raw.extra.clone(),
    }
}

/// All REST-managed devices (cameras, chimes, intercoms) of one location.
pub fn rest_devices(resp: &RingDevicesResponse, location_id: &str) -> Vec<VendorDevice> {
    let in_location = |d: &&RawRestDevice| d.location_id == location_id;

    let doorbells = resp
        .doorbots
        .iter()
        .chain(&resp.authorized_doorbots)
        .filter(in_location)
        .map(|raw| {
            let mut dev = device_from_rest(raw, DeviceCategory::Camera);
            dev.data.insert("doorbell".into(), Value::Bool(true));
            dev
        });
    let cameras = resp
        .stickup_cams
        .iter()
        .filter(in_location)
        .map(|raw| device_from_rest(raw, DeviceCategory::Camera));
    let chimes = resp
        .chimes
        .iter()
        .filter(in_location)
        .map(|raw| device_from_rest(raw, DeviceCategory::Chime));
    let intercoms = resp
        .intercoms()
        .filter(in_location)
        .map(|raw| device_from_rest(raw, DeviceCategory::Intercom));

    doorbells.chain(cameras).chain(chimes).chain(intercoms).collect()
}

pub fn history_event(device_id: &str, raw: &RawHistoryEvent) -> HistoryEvent {
    HistoryEvent {
        id: raw.id.to_string(),
        device_id: device_id.to_owned(),
        kind: CameraEventKind::from(raw.kind.as_str()),
        created_at: raw.created_at,
    }
}

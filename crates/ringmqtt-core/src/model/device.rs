use serde::Serialize;
use serde_json::{Map, Value};
use strum::{AsRefStr, Display};

/// Concrete family of a vendor device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Display, AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DeviceCategory {
    Camera,
    Chime,
    Intercom,
    /// Reported by an alarm base station or lighting bridge.
    Hub,
}

impl DeviceCategory {
    /// Topic segment that groups devices of this family under a location.
    pub fn topic_group(self) -> &'static str {
        match self {
            Self::Camera => "camera",
            Self::Chime => "chime",
            Self::Intercom => "intercom",
            Self::Hub => "alarm",
        }
    }
}

/// A device as reported by the vendor, independent of how it is bridged.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VendorDevice {
    pub id: String,
    pub location_id: String,
    pub category: DeviceCategory,
    /// Vendor type tag, e.g. `sensor.contact` or `doorbell_v3`.
    pub device_type: String,
    pub name: String,
    pub parent_id: Option<String>,
    pub category_id: Option<u64>,
    /// Mutable vendor payload (battery, fault state, lock state, ...).
    pub data: Map<String, Value>,
}

impl VendorDevice {
    pub fn is_hub_device(&self) -> bool {
        self.category == DeviceCategory::Hub
    }

    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(Value::as_str)
    }

    /// Merge a partial update into the payload. Nested objects are merged
    /// key by key; anything else is replaced. Returns `true` if anything
    /// changed.
    pub fn merge(&mut self, patch: &Map<String, Value>) -> bool {
        merge_map(&mut self.data, patch)
    }
}

fn merge_map(target: &mut Map<String, Value>, patch: &Map<String, Value>) -> bool {
    let mut changed = false;
    for (key, value) in patch {
        if let (Some(Value::Object(existing)), Value::Object(nested)) = (target.get_mut(key), value) {
            changed |= merge_map(existing, nested);
            continue;
        }
        if target.get(key) != Some(value) {
            target.insert(key.clone(), value.clone());
            changed = true;
        }
    }
    changed
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn device() -> VendorDevice {
        VendorDevice {
            id: "z1".into(),
            location_id: "loc".into(),
            category: DeviceCategory::Hub,
            device_type: "sensor.contact".into(),
            name: "Door".into(),
            parent_id: None,
            category_id: None,
            data: json!({ "faulted": false }).as_object().unwrap().clone(),
        }
    }

    #[test]
    fn merge_reports_changes_only() {
        let mut dev = device();
        let same = json!({ "faulted": false });
        assert!(!dev.merge(same.as_object().unwrap()));

        let patch = json!({ "faulted": true, "batteryLevel": 80 });
        assert!(dev.merge(patch.as_object().unwrap()));
        assert_eq!(dev.data["faulted"], true);
        assert_eq!(dev.data["batteryLevel"], 80);
    }

    #[test]
    fn nested_objects_merge_key_by_key() {
        let mut dev = device();
        dev.merge(json!({ "settings": { "volume": 3, "theme": "dark" } }).as_object().unwrap());

        assert!(dev.merge(json!({ "settings": { "volume": 7 } }).as_object().unwrap()));
        assert_eq!(dev.data["settings"], json!({ "volume": 7, "theme": "dark" }));
        assert!(!dev.merge(json!({ "settings": { "volume": 7 } }).as_object().unwrap()));
    }

    #[test]
    fn topic_groups() {
        assert_eq!(DeviceCategory::Hub.topic_group(), "alarm");
        assert_eq!(DeviceCategory::Camera.to_string(), "camera");
    }
}

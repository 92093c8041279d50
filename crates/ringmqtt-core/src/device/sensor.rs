// ── Read-only hub sensors ──

use serde_json::{Map, Value, json};

use super::entity::{Component, EntityDef};
use super::{DeviceBehavior, DeviceInfo, StateView, common_attributes, format_number, on_off};

// ── Contact / motion / tilt / glass-break / zone ─────────────────────

/// Security-panel zone sensors. One wrapper covers every fault-style
/// sensor; the entity key and device class come from the vendor type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinarySensor {
    key: &'static str,
    device_class: &'static str,
}

impl BinarySensor {
    pub fn from_type(device_type: &str) -> Self {
        let (key, device_class) = match device_type {
            "sensor.contact" => ("contact", "door"),
            "sensor.motion" => ("motion", "motion"),
            "sensor.tilt" => ("tilt", "garage_door"),
            "sensor.glassbreak" => ("glassbreak", "safety"),
            _ => ("zone", "safety"),
        };
        Self { key, device_class }
    }

    pub fn key(&self) -> &'static str {
        self.key
    }
}

impl DeviceBehavior for BinarySensor {
    fn entities(&self, _info: &DeviceInfo) -> Vec<EntityDef> {
        vec![
            EntityDef::new(self.key, Component::BinarySensor)
                .primary()
                .class(self.device_class),
            EntityDef::info(),
        ]
    }

    fn state(&self, suffix: &str, view: &StateView<'_>) -> Option<String> {
        (suffix == self.key)
            .then(|| view.info.bool_at(&["faulted"]))
            .flatten()
            .map(on_off)
    }

    fn attributes(&self, info: &DeviceInfo) -> Map<String, Value> {
        let mut attrs = common_attributes(info);
        if let Some(bypassed) = info.bool_at(&["bypassed"]) {
            attrs.insert("bypassed".into(), json!(bypassed));
        }
        if let Some(panel) = &info.security_panel {
            attrs.insert("security_panel".into(), json!(panel));
        }
        attrs
    }
}

// ── Flood / freeze ───────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FloodFreezeSensor;

impl DeviceBehavior for FloodFreezeSensor {
    fn entities(&self, _info: &DeviceInfo) -> Vec<EntityDef> {
        vec![
            EntityDef::new("flood", Component::BinarySensor)
                .primary()
                .class("moisture"),
            EntityDef::new("freeze", Component::BinarySensor).class("cold"),
            EntityDef::info(),
        ]
    }

    fn state(&self, suffix: &str, view: &StateView<'_>) -> Option<String> {
        match suffix {
            "flood" | "freeze" => view.info.bool_at(&[suffix, "faulted"]).map(on_off),
            _ => None,
        }
    }
}

// ── Temperature ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TemperatureSensor;

impl DeviceBehavior for TemperatureSensor {
    fn entities(&self, _info: &DeviceInfo) -> Vec<EntityDef> {
        vec![
            EntityDef::new("temperature", Component::Sensor)
                .primary()
                .class("temperature")
                .extra("unit_of_measurement", "°C")
                .extra("state_class", "measurement"),
            EntityDef::info(),
        ]
    }

    fn state(&self, suffix: &str, view: &StateView<'_>) -> Option<String> {
        (suffix == "temperature")
            .then(|| view.info.f64_at(&["celsius"]))
            .flatten()
            .map(format_number)
    }
}

// ── Smoke / CO ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlarmSensor {
    Smoke,
    Co,
    /// Listens for a legacy smoke/CO alarm's siren; reports both.
    SmokeCoListener,
}

impl AlarmSensor {
    fn keys(self) -> &'static [&'static str] {
        match self {
            Self::Smoke => &["smoke"],
            Self::Co => &["co"],
            Self::SmokeCoListener => &["smoke", "co"],
        }
    }
}

impl DeviceBehavior for AlarmSensor {
    fn entities(&self, _info: &DeviceInfo) -> Vec<EntityDef> {
        let mut defs: Vec<EntityDef> = self
            .keys()
            .iter()
            .map(|&key| {
                let class = if key == "co" { "carbon_monoxide" } else { "smoke" };
                EntityDef::new(key, Component::BinarySensor).class(class)
            })
            .collect();
        if let Some(first) = defs.first_mut() {
            first.primary = true;
        }
        defs.push(EntityDef::info());
        defs
    }

    fn state(&self, suffix: &str, view: &StateView<'_>) -> Option<String> {
        if !self.keys().iter().any(|key| *key == suffix) {
            return None;
        }
        let status = match self {
            Self::SmokeCoListener => view.info.str_at(&[suffix, "alarmStatus"]),
            _ => view.info.str_at(&["alarmStatus"]),
        };
        Some(on_off(status == Some("active")))
    }
}

// ── Panic button ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PanicButton;

impl DeviceBehavior for PanicButton {
    fn entities(&self, _info: &DeviceInfo) -> Vec<EntityDef> {
        vec![
            EntityDef::new("panic", Component::BinarySensor)
                .primary()
                .class("safety"),
            EntityDef::info(),
        ]
    }

    fn state(&self, suffix: &str, view: &StateView<'_>) -> Option<String> {
        (suffix == "panic").then(|| on_off(view.info.bool_at(&["faulted"]).unwrap_or(false)))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::device::test_support::{hub_device, state_of};

    #[test]
    fn binary_sensor_key_follows_type() {
        assert_eq!(BinarySensor::from_type("sensor.tilt").key(), "tilt");
        assert_eq!(BinarySensor::from_type("sensor").key(), "zone");

        let sensor = BinarySensor::from_type("sensor.contact");
        let info = DeviceInfo::new(hub_device("z1", "sensor.contact", json!({ "faulted": true })));
        assert_eq!(state_of(&sensor, &info, "contact").as_deref(), Some("ON"));
        assert_eq!(state_of(&sensor, &info, "motion"), None);
    }

    #[test]
    fn bypass_metadata_in_attributes() {
        let sensor = BinarySensor::from_type("sensor.motion");
        let mut info = DeviceInfo::new(hub_device("z1", "sensor.motion", json!({ "bypassed": false })));
        info.security_panel = Some("panel-1".into());

        let attrs = sensor.attributes(&info);
        assert_eq!(attrs["bypassed"], false);
        assert_eq!(attrs["security_panel"], "panel-1");
    }

    #[test]
    fn listener_reports_smoke_and_co_separately() {
        let info = DeviceInfo::new(hub_device(
            "z2",
            "listener.smoke-co",
            json!({ "smoke": { "alarmStatus": "active" }, "co": { "alarmStatus": "inactive" } }),
        ));
        let listener = AlarmSensor::SmokeCoListener;
        assert_eq!(state_of(&listener, &info, "smoke").as_deref(), Some("ON"));
        assert_eq!(state_of(&listener, &info, "co").as_deref(), Some("OFF"));

        let keys: Vec<String> = listener.entities(&info).into_iter().map(|d| d.key).collect();
        assert_eq!(keys, ["smoke", "co", "info"]);
    }

    #[test]
    fn flood_freeze_reads_nested_faults() {
        let info = DeviceInfo::new(hub_device(
            "z3",
            "sensor.flood-freeze",
            json!({ "flood": { "faulted": false }, "freeze": { "faulted": true } }),
        ));
        assert_eq!(state_of(&FloodFreezeSensor, &info, "flood").as_deref(), Some("OFF"));
        assert_eq!(state_of(&FloodFreezeSensor, &info, "freeze").as_deref(), Some("ON"));
    }
}

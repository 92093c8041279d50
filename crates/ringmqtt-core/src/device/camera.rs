// ── Cameras and doorbells ──

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value, json};

use super::entity::{Component, EntityDef};
use super::{CommandPlan, DeviceBehavior, DeviceInfo, StateView, on_off, parse_on_off};
use crate::command::VendorCommand;
use crate::error::CoreError;
use crate::model::{CameraEventKind, HistoryEvent};

const SIREN_SECONDS: u64 = 30;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Camera {
    /// Most recent event time per kind, seeded from the history.
    last_events: BTreeMap<String, DateTime<Utc>>,
}

impl Camera {
    pub fn new(recent: &[HistoryEvent]) -> Self {
        let mut last_events = BTreeMap::new();
        for event in recent {
            let slot = last_events
                .entry(event.kind.to_string())
                .or_insert(event.created_at);
            if event.created_at > *slot {
                *slot = event.created_at;
            }
        }
        Self { last_events }
    }
}

fn is_doorbell(info: &DeviceInfo) -> bool {
    info.bool_at(&["doorbell"]).unwrap_or(false)
}

fn has_light(info: &DeviceInfo) -> bool {
    info.field(&["led_status"]).is_some()
}

fn has_siren(info: &DeviceInfo) -> bool {
    info.field(&["siren_status"]).is_some()
}

impl DeviceBehavior for Camera {
    fn entities(&self, info: &DeviceInfo) -> Vec<EntityDef> {
        let mut defs = vec![
            EntityDef::new("motion", Component::BinarySensor)
                .primary()
                .class("motion"),
        ];
        if is_doorbell(info) {
            defs.push(EntityDef::new("ding", Component::BinarySensor).class("occupancy"));
        }
        if has_light(info) {
            defs.push(EntityDef::new("light", Component::Light).commandable());
        }
        if has_siren(info) {
            defs.push(EntityDef::new("siren", Component::Switch).commandable().extra("icon", "mdi:alarm-light"));
        }
        defs.push(EntityDef::info());
        defs
    }

    fn state(&self, suffix: &str, view: &StateView<'_>) -> Option<String> {
        let info = view.info;
        match suffix {
            "motion" | "ding" => Some(on_off(view.pulse_active(suffix))),
            "light" => info.str_at(&["led_status"]).map(|s| on_off(s == "on")),
            "siren" => Some(on_off(
                info.f64_at(&["siren_status", "seconds_remaining"])
                    .is_some_and(|s| s > 0.0),
            )),
            _ => None,
        }
    }

    fn attributes(&self, info: &DeviceInfo) -> Map<String, Value> {
        let mut attrs = Map::new();
        if let Some(level) = info.field(&["battery_life"]).filter(|v| !v.is_null()) {
            attrs.insert("battery_level".into(), level.clone());
        }
        if let Some(fw) = info.str_at(&["firmware_version"]) {
            attrs.insert("firmware_version".into(), json!(fw));
        }
        if let Some(ssid) = info.str_at(&["health", "wifi_name"]) {
            attrs.insert("wireless_network".into(), json!(ssid));
        }
        if let Some(rssi) = info.field(&["health", "rssi"]) {
            attrs.insert("wireless_signal".into(), rssi.clone());
        }
        for (kind, at) in &self.last_events {
            attrs.insert(format!("last_{kind}"), json!(at.to_rfc3339()));
        }
        let status = if self.availability(info) == Some(false) {
            "offline"
        } else {
            "online"
        };
        attrs.insert("status".into(), json!(status));
        attrs
    }

    fn plan_command(
        &self,
        suffix: &str,
        payload: &str,
        view: &StateView<'_>,
    ) -> Result<CommandPlan, CoreError> {
        let device_id = view.info.id().to_owned();
        match suffix {
            "light" if has_light(view.info) => {
                let on = parse_on_off(payload)?;
                Ok(CommandPlan::send(VendorCommand::SetCameraLight { device_id, on })
                    .patch("led_status", if on { "on" } else { "off" }))
            }
            "siren" if has_siren(view.info) => {
                let on = parse_on_off(payload)?;
                let remaining = if on { SIREN_SECONDS } else { 0 };
                Ok(CommandPlan::send(VendorCommand::SetCameraSiren { device_id, on })
                    .patch("siren_status", json!({ "seconds_remaining": remaining })))
            }
            other => Err(CoreError::invalid(format!("camera has no {other} control"))),
        }
    }

    fn availability(&self, info: &DeviceInfo) -> Option<bool> {
        (info.str_at(&["alerts", "connection"]) == Some("offline")).then_some(false)
    }

    fn on_event(&mut self, info: &DeviceInfo, kind: &CameraEventKind) -> Option<&'static str> {
        let entity = match kind {
            CameraEventKind::Ding if is_doorbell(info) => "ding",
            CameraEventKind::Motion => "motion",
            _ => return None,
        };
        self.last_events.insert(kind.to_string(), Utc::now());
        Some(entity)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::device::test_support::{plan, rest_device, state_of};
    use crate::model::DeviceCategory;
    use chrono::TimeZone;

    fn floodlight() -> DeviceInfo {
        DeviceInfo::new(rest_device(
            "42",
            DeviceCategory::Camera,
            json!({ "led_status": "off", "siren_status": { "seconds_remaining": 0 }, "battery_life": "88" }),
        ))
    }

    #[test]
    fn entities_follow_capabilities() {
        let keys: Vec<String> = Camera::default()
            .entities(&floodlight())
            .into_iter()
            .map(|d| d.key)
            .collect();
        assert_eq!(keys, ["motion", "light", "siren", "info"]);

        let doorbell = DeviceInfo::new(rest_device("1", DeviceCategory::Camera, json!({ "doorbell": true })));
        let keys: Vec<String> = Camera::default().entities(&doorbell).into_iter().map(|d| d.key).collect();
        assert_eq!(keys, ["motion", "ding", "info"]);
    }

    #[test]
    fn light_command_patches_led_status() {
        let info = floodlight();
        let cam = Camera::default();
        let plan = plan(&cam, &info, "light", "ON").unwrap();
        assert_eq!(
            plan.commands,
            [VendorCommand::SetCameraLight { device_id: "42".into(), on: true }]
        );
        assert_eq!(plan.patch["led_status"], "on");
        assert_eq!(state_of(&cam, &info, "light").as_deref(), Some("OFF"));
    }

    #[test]
    fn offline_alert_marks_camera_unavailable() {
        let info = DeviceInfo::new(rest_device(
            "5",
            DeviceCategory::Camera,
            json!({ "alerts": { "connection": "offline" } }),
        ));
        let cam = Camera::default();
        assert_eq!(cam.availability(&info), Some(false));
        assert_eq!(cam.attributes(&info)["status"], "offline");
    }

    #[test]
    fn history_seeds_last_event_attributes() {
        let at = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let recent = [HistoryEvent {
            id: "1".into(),
            device_id: "42".into(),
            kind: CameraEventKind::Motion,
            created_at: at,
        }];
        let attrs = Camera::new(&recent).attributes(&floodlight());
        assert_eq!(attrs["last_motion"], at.to_rfc3339());
        assert_eq!(attrs["battery_level"], "88");
    }

    #[test]
    fn ding_only_pulses_doorbells() {
        let mut cam = Camera::default();
        assert_eq!(cam.on_event(&floodlight(), &CameraEventKind::Ding), None);
        assert_eq!(cam.on_event(&floodlight(), &CameraEventKind::Motion), Some("motion"));
    }
}

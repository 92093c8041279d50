// ── Intercoms ──
//
// The vendor never reports the door's lock state. An unlock shows as
// UNLOCKED for the unlock pulse, then falls back to LOCKED. LOCK ends the
// pulse locally; there is no vendor call for it.

use serde_json::{Map, Value};

use super::entity::{Component, EntityDef};
use super::{CommandPlan, DeviceBehavior, DeviceInfo, PulseLength, StateView, on_off};
use crate::command::VendorCommand;
use crate::error::CoreError;
use crate::model::CameraEventKind;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Intercom;

impl DeviceBehavior for Intercom {
    fn entities(&self, _info: &DeviceInfo) -> Vec<EntityDef> {
        vec![
            EntityDef::new("ding", Component::BinarySensor).class("occupancy"),
            EntityDef::new("lock", Component::Lock).primary().commandable(),
            EntityDef::info(),
        ]
    }

    fn state(&self, suffix: &str, view: &StateView<'_>) -> Option<String> {
        match suffix {
            "ding" => Some(on_off(view.pulse_active("ding"))),
            "lock" => Some(
                if view.pulse_active("lock") {
                    "UNLOCKED"
                } else {
                    "LOCKED"
                }
                .to_owned(),
            ),
            _ => None,
        }
    }

    fn attributes(&self, info: &DeviceInfo) -> Map<String, Value> {
        let mut attrs = Map::new();
        if let Some(level) = info.field(&["battery_life"]).filter(|v| !v.is_null()) {
            attrs.insert("battery_level".into(), level.clone());
        }
        if let Some(fw) = info.field(&["firmware_version"]) {
            attrs.insert("firmware_version".into(), fw.clone());
        }
        attrs.insert("status".into(), Value::from("online"));
        attrs
    }

    fn plan_command(
        &self,
        suffix: &str,
        payload: &str,
        view: &StateView<'_>,
    ) -> Result<CommandPlan, CoreError> {
        match (suffix, payload.to_ascii_uppercase().as_str()) {
            ("lock", "UNLOCK") => Ok(CommandPlan::send(VendorCommand::UnlockIntercom {
                device_id: view.info.id().to_owned(),
            })
            .pulse("lock", PulseLength::Unlock)),
            ("lock", "LOCK") => Ok(CommandPlan::none().cancel_pulse("lock")),
            ("lock", other) => Err(CoreError::invalid(format!(
                "expected LOCK or UNLOCK, got {other:?}"
            ))),
            (other, _) => Err(CoreError::invalid(format!("intercom has no {other} control"))),
        }
    }

    fn availability(&self, _info: &DeviceInfo) -> Option<bool> {
        None
    }

    fn on_event(&mut self, _info: &DeviceInfo, kind: &CameraEventKind) -> Option<&'static str> {
        matches!(kind, CameraEventKind::Ding).then_some("ding")
    }
}

// ── Alarm panels, base stations and keypads ──

use serde_json::{Map, Value, json};

use super::entity::{Component, EntityDef};
use super::{
    CommandPlan, DeviceBehavior, DeviceInfo, StateView, common_attributes, hub_command, hub_set,
    on_off, parse_number, parse_on_off, percent,
};
use crate::command::{LocationMode, VendorCommand};
use crate::error::CoreError;

const ALARM_COMMANDS: [&str; 3] = ["DISARM", "ARM_HOME", "ARM_AWAY"];

fn alarm_panel_entity(key: &str) -> EntityDef {
    EntityDef::new(key, Component::AlarmControlPanel)
        .primary()
        .commandable()
        .extra("supported_features", json!(["arm_home", "arm_away"]))
        .extra("code_arm_required", false)
        .extra("code_disarm_required", false)
}

// ── Security panel ───────────────────────────────────────────────────

/// The alarm base station's virtual panel device.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SecurityPanel {
    /// Expose police and fire panic switches.
    pub panic: bool,
}

impl SecurityPanel {
    fn alarm_state(info: &DeviceInfo) -> Option<&'static str> {
        if info.field(&["alarmInfo", "state"]).is_some_and(|s| !s.is_null()) {
            return Some("triggered");
        }
        Some(match info.str_at(&["mode"])? {
            "some" => "armed_home",
            "all" => "armed_away",
            _ => "disarmed",
        })
    }
}

impl DeviceBehavior for SecurityPanel {
    fn entities(&self, _info: &DeviceInfo) -> Vec<EntityDef> {
        let mut defs = vec![
            alarm_panel_entity("alarm"),
            EntityDef::new("siren", Component::Switch)
                .commandable()
                .extra("icon", "mdi:alarm-light"),
        ];
        if self.panic {
            defs.push(
                EntityDef::new("police", Component::Switch)
                    .commandable()
                    .extra("icon", "mdi:police-badge"),
            );
            defs.push(
                EntityDef::new("fire", Component::Switch)
                    .commandable()
                    .extra("icon", "mdi:fire"),
            );
        }
        defs
    }

    fn state(&self, suffix: &str, view: &StateView<'_>) -> Option<String> {
        let info = view.info;
        let alarm_type = info.str_at(&["alarmInfo", "state"]);
        match suffix {
            "alarm" => Self::alarm_state(info).map(str::to_owned),
            "siren" => Some(on_off(info.str_at(&["siren", "state"]) == Some("on"))),
            "police" => Some(on_off(alarm_type == Some("burglar-alarm"))),
            "fire" => Some(on_off(alarm_type == Some("fire-alarm"))),
            _ => None,
        }
    }

    fn attributes(&self, info: &DeviceInfo) -> Map<String, Value> {
        let mut attrs = common_attributes(info);
        if let Some(alarm) = info.field(&["alarmInfo"]).filter(|v| !v.is_null()) {
            attrs.insert("alarm_info".into(), alarm.clone());
        }
        attrs
    }

    fn plan_command(
        &self,
        suffix: &str,
        payload: &str,
        view: &StateView<'_>,
    ) -> Result<CommandPlan, CoreError> {
        let info = view.info;
        match suffix {
            "alarm" => {
                let mode = match payload {
                    "DISARM" => "none",
                    "ARM_HOME" => "some",
                    "ARM_AWAY" => "all",
                    other => {
                        return Err(CoreError::invalid(format!(
                            "expected one of {ALARM_COMMANDS:?}, got {other:?}"
                        )));
                    }
                };
                Ok(CommandPlan::send(hub_command(
                    info,
                    "security-panel.switch-mode",
                    json!({ "mode": mode, "bypass": null }),
                )))
            }
            "siren" => {
                let command = if parse_on_off(payload)? {
                    "security-panel.sound-siren"
                } else {
                    "security-panel.silence-siren"
                };
                Ok(CommandPlan::send(hub_command(info, command, json!({}))))
            }
            "police" | "fire" if self.panic => {
                if !parse_on_off(payload)? {
                    // Clearing a panic alarm is a disarm
                    return Ok(CommandPlan::send(hub_command(
                        info,
                        "security-panel.switch-mode",
                        json!({ "mode": "none", "bypass": null }),
                    )));
                }
                let command = if suffix == "police" {
                    "security-panel.trigger-burglar-alarm"
                } else {
                    "security-panel.trigger-fire-alarm"
                };
                Ok(CommandPlan::send(hub_command(info, command, json!({}))))
            }
            other => Err(CoreError::invalid(format!("security panel has no {other} control"))),
        }
    }
}

// ── Location modes ───────────────────────────────────────────────────

/// Ring "Modes" for locations without an alarm hub.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ModesPanel;

impl DeviceBehavior for ModesPanel {
    fn entities(&self, _info: &DeviceInfo) -> Vec<EntityDef> {
        vec![alarm_panel_entity("mode")]
    }

    fn state(&self, suffix: &str, view: &StateView<'_>) -> Option<String> {
        if suffix != "mode" {
            return None;
        }
        let state = match view.info.str_at(&["mode"])? {
            "home" => "armed_home",
            "away" => "armed_away",
            _ => "disarmed",
        };
        Some(state.to_owned())
    }

    fn attributes(&self, _info: &DeviceInfo) -> Map<String, Value> {
        Map::new()
    }

    fn plan_command(
        &self,
        suffix: &str,
        payload: &str,
        view: &StateView<'_>,
    ) -> Result<CommandPlan, CoreError> {
        if suffix != "mode" {
            return Err(CoreError::invalid(format!("modes panel has no {suffix} control")));
        }
        let mode = match payload {
            "DISARM" => LocationMode::Disarmed,
            "ARM_HOME" => LocationMode::Home,
            "ARM_AWAY" => LocationMode::Away,
            other => {
                return Err(CoreError::invalid(format!(
                    "expected one of {ALARM_COMMANDS:?}, got {other:?}"
                )));
            }
        };
        Ok(CommandPlan::send(VendorCommand::SetLocationMode {
            location_id: view.info.device.location_id.clone(),
            mode,
        })
        .patch("mode", mode.to_string()))
    }
}

// ── Base station / keypad ────────────────────────────────────────────

fn volume_entity() -> EntityDef {
    EntityDef::new("volume", Component::Number)
        .commandable()
        .extra("min", 0)
        .extra("max", 100)
        .extra("icon", "mdi:volume-high")
}

fn volume_state(suffix: &str, info: &DeviceInfo) -> Option<String> {
    (suffix == "volume")
        .then(|| info.f64_at(&["volume"]))
        .flatten()
        .map(percent)
}

fn volume_command(suffix: &str, payload: &str, info: &DeviceInfo) -> Result<CommandPlan, CoreError> {
    if suffix != "volume" {
        return Err(CoreError::invalid(format!("no {suffix} control")));
    }
    let volume = parse_number(payload, 0.0, 100.0)? / 100.0;
    Ok(CommandPlan::send(hub_set(info, json!({ "volume": volume }))).patch("volume", volume))
}

/// Alarm base station. Volume is exposed only when the hub reports one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BaseStation;

impl DeviceBehavior for BaseStation {
    fn entities(&self, info: &DeviceInfo) -> Vec<EntityDef> {
        let mut defs = vec![EntityDef::info().primary()];
        if info.f64_at(&["volume"]).is_some() {
            defs.push(volume_entity());
        }
        defs
    }

    fn state(&self, suffix: &str, view: &StateView<'_>) -> Option<String> {
        volume_state(suffix, view.info)
    }

    fn plan_command(
        &self,
        suffix: &str,
        payload: &str,
        view: &StateView<'_>,
    ) -> Result<CommandPlan, CoreError> {
        volume_command(suffix, payload, view.info)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Keypad;

impl DeviceBehavior for Keypad {
    fn entities(&self, _info: &DeviceInfo) -> Vec<EntityDef> {
        vec![EntityDef::info().primary(), volume_entity()]
    }

    fn state(&self, suffix: &str, view: &StateView<'_>) -> Option<String> {
        volume_state(suffix, view.info)
    }

    fn plan_command(
        &self,
        suffix: &str,
        payload: &str,
        view: &StateView<'_>,
    ) -> Result<CommandPlan, CoreError> {
        volume_command(suffix, payload, view.info)
    }
}

// ── Range extenders / bridges ────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InfoOnly;

impl DeviceBehavior for InfoOnly {
    fn entities(&self, _info: &DeviceInfo) -> Vec<EntityDef> {
        vec![EntityDef::info().primary()]
    }

    fn state(&self, _suffix: &str, _view: &StateView<'_>) -> Option<String> {
        None
    }
}

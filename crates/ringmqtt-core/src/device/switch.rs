// ── Switches, dimmers, fans, sirens and valves ──

use serde_json::json;

use super::entity::{Component, EntityDef};
use super::{
    CommandPlan, DeviceBehavior, DeviceInfo, StateView, format_number, hub_command, hub_set,
    on_off, parse_number, parse_on_off, percent,
};
use crate::error::CoreError;

fn unknown(kind: &str, suffix: &str) -> CoreError {
    CoreError::invalid(format!("{kind} has no {suffix} control"))
}

// ── Switch ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Switch;

impl DeviceBehavior for Switch {
    fn entities(&self, _info: &DeviceInfo) -> Vec<EntityDef> {
        vec![EntityDef::new("switch", Component::Switch).primary().commandable()]
    }

    fn state(&self, suffix: &str, view: &StateView<'_>) -> Option<String> {
        (suffix == "switch")
            .then(|| view.info.bool_at(&["on"]))
            .flatten()
            .map(on_off)
    }

    fn plan_command(
        &self,
        suffix: &str,
        payload: &str,
        view: &StateView<'_>,
    ) -> Result<CommandPlan, CoreError> {
        if suffix != "switch" {
            return Err(unknown("switch", suffix));
        }
        let on = parse_on_off(payload)?;
        Ok(CommandPlan::send(hub_set(view.info, json!({ "on": on }))).patch("on", on))
    }
}

// ── Dimmer ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MultiLevelSwitch;

impl DeviceBehavior for MultiLevelSwitch {
    fn entities(&self, _info: &DeviceInfo) -> Vec<EntityDef> {
        vec![
            EntityDef::new("light", Component::Light)
                .primary()
                .commandable()
                .aux("brightness")
                .extra("brightness_scale", 100),
        ]
    }

    fn state(&self, suffix: &str, view: &StateView<'_>) -> Option<String> {
        match suffix {
            "light" => view.info.bool_at(&["on"]).map(on_off),
            "light_brightness" => view.info.f64_at(&["level"]).map(percent),
            _ => None,
        }
    }

    fn plan_command(
        &self,
        suffix: &str,
        payload: &str,
        view: &StateView<'_>,
    ) -> Result<CommandPlan, CoreError> {
        match suffix {
            "light" => {
                let on = parse_on_off(payload)?;
                Ok(CommandPlan::send(hub_set(view.info, json!({ "on": on }))).patch("on", on))
            }
            "light_brightness" => {
                let level = parse_number(payload, 0.0, 100.0)? / 100.0;
                Ok(CommandPlan::send(hub_set(view.info, json!({ "level": level })))
                    .patch("level", level))
            }
            other => Err(unknown("light", other)),
        }
    }
}

// ── Fan ──────────────────────────────────────────────────────────────

const FAN_PRESETS: [(&str, f64); 3] = [("low", 0.33), ("medium", 0.67), ("high", 1.0)];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Fan;

impl DeviceBehavior for Fan {
    fn entities(&self, _info: &DeviceInfo) -> Vec<EntityDef> {
        let presets: Vec<&str> = FAN_PRESETS.iter().map(|(name, _)| *name).collect();
        vec![
            EntityDef::new("fan", Component::Fan)
                .primary()
                .commandable()
                .aux("percentage")
                .aux("preset_mode")
                .extra("preset_modes", presets),
        ]
    }

    fn state(&self, suffix: &str, view: &StateView<'_>) -> Option<String> {
        let level = view.info.f64_at(&["level"]);
        match suffix {
            "fan" => view.info.bool_at(&["on"]).map(on_off),
            "fan_percentage" => level.map(percent),
            "fan_preset_mode" => level.map(|level| {
                FAN_PRESETS
                    .iter()
                    .find(|(_, threshold)| level <= *threshold)
                    .map_or("high", |(name, _)| *name)
                    .to_owned()
            }),
            _ => None,
        }
    }

    fn plan_command(
        &self,
        suffix: &str,
        payload: &str,
        view: &StateView<'_>,
    ) -> Result<CommandPlan, CoreError> {
        let level = match suffix {
            "fan" => {
                let on = parse_on_off(payload)?;
                return Ok(
                    CommandPlan::send(hub_set(view.info, json!({ "on": on }))).patch("on", on)
                );
            }
            "fan_percentage" => parse_number(payload, 0.0, 100.0)? / 100.0,
            "fan_preset_mode" => FAN_PRESETS
                .iter()
                .find(|(name, _)| *name == payload)
                .map(|(_, level)| *level)
                .ok_or_else(|| CoreError::invalid(format!("unknown fan preset {payload:?}")))?,
            other => return Err(unknown("fan", other)),
        };
        Ok(CommandPlan::send(hub_set(view.info, json!({ "level": level }))).patch("level", level))
    }
}

// ── Siren ────────────────────────────────────────────────────────────

const MAX_SIREN_VOLUME: f64 = 4.0;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Siren;

impl DeviceBehavior for Siren {
    fn entities(&self, _info: &DeviceInfo) -> Vec<EntityDef> {
        vec![
            EntityDef::new("siren", Component::Switch)
                .primary()
                .commandable()
                .extra("icon", "mdi:alarm-light"),
            EntityDef::new("volume", Component::Number)
                .commandable()
                .extra("min", 0)
                .extra("max", MAX_SIREN_VOLUME)
                .extra("icon", "mdi:volume-high"),
        ]
    }

    fn state(&self, suffix: &str, view: &StateView<'_>) -> Option<String> {
        match suffix {
            "siren" => Some(on_off(view.info.str_at(&["sirenStatus"]) == Some("active"))),
            "volume" => view.info.f64_at(&["volume"]).map(format_number),
            _ => None,
        }
    }

    fn plan_command(
        &self,
        suffix: &str,
        payload: &str,
        view: &StateView<'_>,
    ) -> Result<CommandPlan, CoreError> {
        match suffix {
            "siren" => {
                let command = if parse_on_off(payload)? {
                    "siren-test.start"
                } else {
                    "siren-test.stop"
                };
                Ok(CommandPlan::send(hub_command(view.info, command, json!({}))))
            }
            "volume" => {
                let volume = parse_number(payload, 0.0, MAX_SIREN_VOLUME)?.round();
                Ok(CommandPlan::send(hub_set(view.info, json!({ "volume": volume })))
                    .patch("volume", volume))
            }
            other => Err(unknown("siren", other)),
        }
    }
}

// ── Water valve ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Valve;

impl DeviceBehavior for Valve {
    fn entities(&self, _info: &DeviceInfo) -> Vec<EntityDef> {
        vec![
            EntityDef::new("valve", Component::Switch)
                .primary()
                .commandable()
                .extra("icon", "mdi:water-pump"),
            EntityDef::info(),
        ]
    }

    fn state(&self, suffix: &str, view: &StateView<'_>) -> Option<String> {
        (suffix == "valve")
            .then(|| view.info.str_at(&["valveState"]))
            .flatten()
            .map(|s| on_off(s == "open"))
    }

    fn plan_command(
        &self,
        suffix: &str,
        payload: &str,
        view: &StateView<'_>,
    ) -> Result<CommandPlan, CoreError> {
        if suffix != "valve" {
            return Err(unknown("valve", suffix));
        }
        let (command, state) = if parse_on_off(payload)? {
            ("valve.open", "open")
        } else {
            ("valve.close", "closed")
        };
        Ok(CommandPlan::send(hub_command(view.info, command, json!({}))).patch("valveState", state))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::command::VendorCommand;
    use crate::device::test_support::{hub_device, plan, state_of};

    #[test]
    fn dimmer_scales_brightness() {
        let info = DeviceInfo::new(hub_device("d1", "switch.multilevel", json!({ "on": true, "level": 0.5 })));
        assert_eq!(state_of(&MultiLevelSwitch, &info, "light_brightness").as_deref(), Some("50"));

        let p = plan(&MultiLevelSwitch, &info, "light_brightness", "25").unwrap();
        assert_eq!(
            p.commands,
            [VendorCommand::SetHubDeviceInfo {
                location_id: "loc".into(),
                device_id: "d1".into(),
                fields: json!({ "level": 0.25 }),
            }]
        );
        assert!(plan(&MultiLevelSwitch, &info, "light_brightness", "101").is_err());
    }

    #[test]
    fn fan_presets_map_to_levels() {
        let info = DeviceInfo::new(hub_device("f1", "switch.multilevel", json!({ "level": 0.6 })));
        assert_eq!(state_of(&Fan, &info, "fan_preset_mode").as_deref(), Some("medium"));

        let p = plan(&Fan, &info, "fan_preset_mode", "high").unwrap();
        assert_eq!(p.patch["level"], 1.0);
        assert!(plan(&Fan, &info, "fan_preset_mode", "turbo").is_err());
    }

    #[test]
    fn valve_commands_use_hub_command_types() {
        let info = DeviceInfo::new(hub_device("v1", "valve.water", json!({ "valveState": "closed" })));
        assert_eq!(state_of(&Valve, &info, "valve").as_deref(), Some("OFF"));

        let p = plan(&Valve, &info, "valve", "ON").unwrap();
        let VendorCommand::SendHubCommand { command_type, .. } = &p.commands[0] else {
            panic!("expected hub command");
        };
        assert_eq!(command_type, "valve.open");
        assert_eq!(p.patch["valveState"], "open");
    }

    #[test]
    fn siren_volume_is_bounded() {
        let info = DeviceInfo::new(hub_device("s1", "siren", json!({ "volume": 2 })));
        assert_eq!(state_of(&Siren, &info, "volume").as_deref(), Some("2"));
        assert!(plan(&Siren, &info, "volume", "5").is_err());
    }
}

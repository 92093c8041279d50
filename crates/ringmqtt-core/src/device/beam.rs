// ── Ring smart lighting (Beams) ──
//
// A light command assigns the optimistic `on` value outright. The hub
// later echoes the real state through a data push.

use serde_json::json;

use super::entity::{Component, EntityDef};
use super::{
    CommandPlan, DeviceBehavior, DeviceInfo, StateView, hub_set, on_off, parse_number,
    parse_on_off, percent,
};
use crate::error::CoreError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Beam {
    light: bool,
    motion: bool,
    brightness: bool,
}

impl Beam {
    pub fn from_type(device_type: &str) -> Self {
        match device_type {
            "motion-sensor.beams" => Self {
                motion: true,
                ..Self::default()
            },
            "switch.multilevel.beams" => Self {
                light: true,
                motion: true,
                brightness: true,
            },
            _ => Self {
                light: true,
                ..Self::default()
            },
        }
    }
}

impl DeviceBehavior for Beam {
    fn entities(&self, _info: &DeviceInfo) -> Vec<EntityDef> {
        let mut defs = Vec::new();
        if self.light {
            let mut light = EntityDef::new("light", Component::Light).primary().commandable();
            if self.brightness {
                light = light.aux("brightness").extra("brightness_scale", 100);
            }
            defs.push(light);
        }
        if self.motion {
            let mut motion = EntityDef::new("motion", Component::BinarySensor).class("motion");
            motion.primary = !self.light;
            defs.push(motion);
        }
        defs.push(EntityDef::info());
        defs
    }

    fn state(&self, suffix: &str, view: &StateView<'_>) -> Option<String> {
        let info = view.info;
        match suffix {
            "light" if self.light => info.bool_at(&["on"]).map(on_off),
            "light_brightness" if self.brightness => info.f64_at(&["level"]).map(percent),
            "motion" if self.motion => Some(on_off(info.str_at(&["motionStatus"]) == Some("faulted"))),
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
            "light" if self.light => {
                let on = parse_on_off(payload)?;
                let light_mode = if on { "on" } else { "default" };
                Ok(CommandPlan::send(hub_set(view.info, json!({ "lightMode": light_mode })))
                    .patch("on", on))
            }
            "light_brightness" if self.brightness => {
                let level = parse_number(payload, 0.0, 100.0)? / 100.0;
                Ok(CommandPlan::send(hub_set(view.info, json!({ "level": level })))
                    .patch("level", level))
            }
            other => Err(CoreError::invalid(format!("beam has no {other} control"))),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::command::VendorCommand;
    use crate::device::test_support::{hub_device, plan, state_of};

    #[test]
    fn entities_by_beam_type() {
        let info = DeviceInfo::new(hub_device("b", "motion-sensor.beams", json!({})));
        let keys = |beam: Beam| -> Vec<String> { beam.entities(&info).into_iter().map(|d| d.key).collect() };

        assert_eq!(keys(Beam::from_type("motion-sensor.beams")), ["motion", "info"]);
        assert_eq!(keys(Beam::from_type("switch.transformer.beams")), ["light", "info"]);
        assert_eq!(
            keys(Beam::from_type("switch.multilevel.beams")),
            ["light", "motion", "info"]
        );
    }

    #[test]
    fn off_command_assigns_false_and_restores_default_mode() {
        let beam = Beam::from_type("group.light-group.beams");
        let info = DeviceInfo::new(hub_device("g1", "group.light-group.beams", json!({ "on": true })));

        let p = plan(&beam, &info, "light", "OFF").unwrap();
        assert_eq!(
            p.commands,
            [VendorCommand::SetHubDeviceInfo {
                location_id: "loc".into(),
                device_id: "g1".into(),
                fields: json!({ "lightMode": "default" }),
            }]
        );
        assert_eq!(p.patch["on"], false);

        let p = plan(&beam, &info, "light", "ON").unwrap();
        assert_eq!(p.patch["on"], true);
    }

    #[test]
    fn motion_beam_reports_motion_status() {
        let beam = Beam::from_type("motion-sensor.beams");
        let info = DeviceInfo::new(hub_device("m1", "motion-sensor.beams", json!({ "motionStatus": "faulted" })));
        assert_eq!(state_of(&beam, &info, "motion").as_deref(), Some("ON"));
        assert!(plan(&beam, &info, "light", "ON").is_err());
    }
}

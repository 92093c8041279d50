// ── Thermostats ──
//
// The current temperature comes from the thermostat's child
// `sensor.temperature`, which the mapper folds into this wrapper.

use serde_json::json;

use super::entity::{Component, EntityDef};
use super::{CommandPlan, DeviceBehavior, DeviceInfo, StateView, format_number, hub_set, parse_number};
use crate::error::CoreError;

const MODES: [&str; 4] = ["off", "heat", "cool", "auto"];
const MIN_SETPOINT: f64 = 10.0;
const MAX_SETPOINT: f64 = 37.0;

fn is_mode(mode: &str) -> bool {
    MODES.iter().any(|m| *m == mode)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Thermostat;

impl Thermostat {
    fn current_temperature(info: &DeviceInfo) -> Option<f64> {
        info.child_of_type("sensor.temperature")
            .and_then(|c| c.data.get("celsius"))
            .and_then(serde_json::Value::as_f64)
    }
}

impl DeviceBehavior for Thermostat {
    fn entities(&self, _info: &DeviceInfo) -> Vec<EntityDef> {
        vec![
            EntityDef::new("climate", Component::Climate)
                .primary()
                .stateless()
                .aux("mode")
                .aux("temperature")
                .aux_state("current_temperature", "current_temperature_topic")
                .extra("modes", json!(MODES))
                .extra("min_temp", MIN_SETPOINT)
                .extra("max_temp", MAX_SETPOINT)
                .extra("temp_step", 0.5)
                .extra("temperature_unit", "C"),
            EntityDef::info(),
        ]
    }

    fn state(&self, suffix: &str, view: &StateView<'_>) -> Option<String> {
        let info = view.info;
        match suffix {
            "climate_mode" => info
                .str_at(&["mode"])
                .map(|m| (if is_mode(m) { m } else { "off" }).to_owned()),
            "climate_temperature" => info.f64_at(&["setPoint"]).map(format_number),
            "climate_current_temperature" => Self::current_temperature(info).map(format_number),
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
            "climate_mode" => {
                let mode = payload.to_ascii_lowercase();
                if !is_mode(&mode) {
                    return Err(CoreError::invalid(format!("unsupported mode {payload:?}")));
                }
                Ok(CommandPlan::send(hub_set(view.info, json!({ "mode": mode })))
                    .patch("mode", mode))
            }
            "climate_temperature" => {
                let setpoint = parse_number(payload, MIN_SETPOINT, MAX_SETPOINT)?;
                Ok(CommandPlan::send(hub_set(view.info, json!({ "setPoint": setpoint })))
                    .patch("setPoint", setpoint))
            }
            other => Err(CoreError::invalid(format!("thermostat has no {other} control"))),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::device::test_support::{hub_device, plan, state_of};

    fn thermostat() -> DeviceInfo {
        let mut info = DeviceInfo::new(hub_device(
            "t1",
            "temperature-control.thermostat",
            json!({ "mode": "heat", "setPoint": 21 }),
        ));
        let mut sensor = hub_device("t2", "sensor.temperature", json!({ "celsius": 19.5 }));
        sensor.parent_id = Some("t1".into());
        info.children.push(sensor);
        info
    }

    #[test]
    fn current_temperature_comes_from_child() {
        let info = thermostat();
        assert_eq!(state_of(&Thermostat, &info, "climate_current_temperature").as_deref(), Some("19.5"));
        assert_eq!(state_of(&Thermostat, &info, "climate_mode").as_deref(), Some("heat"));
        assert_eq!(state_of(&Thermostat, &info, "climate"), None);
    }

    #[test]
    fn setpoint_is_validated() {
        let info = thermostat();
        assert!(plan(&Thermostat, &info, "climate_temperature", "9").is_err());
        assert!(plan(&Thermostat, &info, "climate_temperature", "38").is_err());

        let ok = plan(&Thermostat, &info, "climate_temperature", "22.5").unwrap();
        assert_eq!(ok.patch["setPoint"], 22.5);
        assert!(plan(&Thermostat, &info, "climate_mode", "dry").is_err());
    }
}

// ── Chimes ──

use serde_json::json;

use super::entity::{Component, EntityDef};
use super::{
    CommandPlan, DeviceBehavior, DeviceInfo, StateView, format_number, on_off, parse_number,
    parse_on_off,
};
use crate::command::{ChimeSound, VendorCommand};
use crate::error::CoreError;

const MAX_VOLUME: f64 = 11.0;
const SNOOZE_MINUTES: u32 = 24 * 60;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Chime;

impl DeviceBehavior for Chime {
    fn entities(&self, _info: &DeviceInfo) -> Vec<EntityDef> {
        vec![
            EntityDef::new("volume", Component::Number)
                .primary()
                .commandable()
                .extra("min", 0)
                .extra("max", MAX_VOLUME)
                .extra("icon", "mdi:volume-high"),
            EntityDef::new("snooze", Component::Switch)
                .commandable()
                .extra("icon", "mdi:bell-sleep"),
            EntityDef::new("play_ding_sound", Component::Button)
                .stateless()
                .commandable()
                .extra("icon", "mdi:bell-ring"),
            EntityDef::new("play_motion_sound", Component::Button)
                .stateless()
                .commandable()
                .extra("icon", "mdi:bell-ring"),
            EntityDef::info(),
        ]
    }

    fn state(&self, suffix: &str, view: &StateView<'_>) -> Option<String> {
        let info = view.info;
        match suffix {
            "volume" => info.f64_at(&["settings", "volume"]).map(format_number),
            "snooze" => Some(on_off(
                info.f64_at(&["do_not_disturb", "seconds_left"])
                    .is_some_and(|s| s > 0.0),
            )),
            _ => None,
        }
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn plan_command(
        &self,
        suffix: &str,
        payload: &str,
        view: &StateView<'_>,
    ) -> Result<CommandPlan, CoreError> {
        let device_id = view.info.id().to_owned();
        match suffix {
            "volume" => {
                let volume = parse_number(payload, 0.0, MAX_VOLUME)?.round() as u8;
                Ok(CommandPlan::send(VendorCommand::SetChimeVolume { device_id, volume })
                    .patch("settings", json!({ "volume": volume })))
            }
            "snooze" => {
                if parse_on_off(payload)? {
                    Ok(CommandPlan::send(VendorCommand::SnoozeChime {
                        device_id,
                        minutes: SNOOZE_MINUTES,
                    })
                    .patch("do_not_disturb", json!({ "seconds_left": SNOOZE_MINUTES * 60 })))
                } else {
                    Ok(CommandPlan::send(VendorCommand::ClearChimeSnooze { device_id })
                        .patch("do_not_disturb", json!({ "seconds_left": 0 })))
                }
            }
            "play_ding_sound" | "play_motion_sound" => {
                let sound = if suffix == "play_ding_sound" {
                    ChimeSound::Ding
                } else {
                    ChimeSound::Motion
                };
                Ok(CommandPlan::send(VendorCommand::PlayChimeSound { device_id, sound }))
            }
            other => Err(CoreError::invalid(format!("chime has no {other} control"))),
        }
    }
}

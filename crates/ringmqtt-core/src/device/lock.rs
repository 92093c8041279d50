// ── Z-Wave locks ──
//
// An unlock reports UNLOCKED for the unlock pulse. The hub's next lock
// report, or a LOCK command, ends the pulse early; after that the hub's
// value stands. Without a report the lock falls back to its last known
// state, which is LOCKED for a lock that was locked before.

use serde_json::{Map, Value, json};

use super::entity::{Component, EntityDef};
use super::{CommandPlan, DeviceBehavior, DeviceInfo, PulseLength, StateView, hub_command};
use crate::error::CoreError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Lock;

impl DeviceBehavior for Lock {
    fn entities(&self, _info: &DeviceInfo) -> Vec<EntityDef> {
        vec![
            EntityDef::new("lock", Component::Lock).primary().commandable(),
            EntityDef::info(),
        ]
    }

    fn state(&self, suffix: &str, view: &StateView<'_>) -> Option<String> {
        if suffix != "lock" {
            return None;
        }
        if view.pulse_active("lock") {
            return Some("UNLOCKED".to_owned());
        }
        let state = match view.info.str_at(&["locked"])? {
            "locked" => "LOCKED",
            "unlocked" => "UNLOCKED",
            "jammed" => "JAMMED",
            _ => "UNKNOWN",
        };
        Some(state.to_owned())
    }

    // Lock state is reported back by the hub, nothing is patched locally.
    fn plan_command(
        &self,
        suffix: &str,
        payload: &str,
        view: &StateView<'_>,
    ) -> Result<CommandPlan, CoreError> {
        if suffix != "lock" {
            return Err(CoreError::invalid(format!("lock has no {suffix} control")));
        }
        match payload.to_ascii_uppercase().as_str() {
            "LOCK" => Ok(CommandPlan::send(hub_command(view.info, "lock.lock", json!({})))
                .cancel_pulse("lock")),
            "UNLOCK" => Ok(CommandPlan::send(hub_command(view.info, "lock.unlock", json!({})))
                .pulse("lock", PulseLength::Unlock)),
            other => Err(CoreError::invalid(format!(
                "expected LOCK or UNLOCK, got {other:?}"
            ))),
        }
    }

    fn settled_pulse(&self, patch: &Map<String, Value>) -> Option<&'static str> {
        patch.contains_key("locked").then_some("lock")
    }
}

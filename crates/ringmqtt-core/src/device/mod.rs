// ── Device wrappers ──
//
// A wrapper turns one vendor device into Home Assistant entities. The
// lifecycle (discovery, state caching, availability, pulses) lives in
// `DeviceWrapper`; what differs per device family is expressed by a
// `DeviceBehavior` impl selected through `DeviceKind`.

mod beam;
mod camera;
mod chime;
pub mod discovery;
pub mod entity;
mod intercom;
mod lock;
mod panel;
mod pulse;
mod sensor;
mod switch;
mod thermostat;
pub mod topics;
mod wrapper;

use std::collections::HashMap;
use std::time::Duration;

use secrecy::SecretString;
use serde_json::{Map, Value, json};

use crate::command::{CommandSender, VendorCommand};
use crate::config::Timings;
use crate::error::CoreError;
use crate::event::EventSender;
use crate::model::{CameraEventKind, VendorDevice};
use crate::mqtt::MqttPublisher;

pub use self::beam::Beam;
pub use self::camera::Camera;
pub use self::chime::Chime;
pub use self::entity::{Component, EntityDef};
pub use self::intercom::Intercom;
pub use self::lock::Lock;
pub use self::panel::{BaseStation, InfoOnly, Keypad, ModesPanel, SecurityPanel};
pub use self::sensor::{
    AlarmSensor, BinarySensor, FloodFreezeSensor, PanicButton, TemperatureSensor,
};
pub use self::switch::{Fan, MultiLevelSwitch, Siren, Switch, Valve};
pub use self::thermostat::Thermostat;
pub use self::wrapper::DeviceWrapper;

use self::pulse::PulseTimer;

// ── Shared context ───────────────────────────────────────────────────

/// Handles and settings every wrapper needs.
#[derive(Debug, Clone)]
pub struct DeviceContext {
    pub publisher: MqttPublisher,
    pub commands: CommandSender,
    pub events: EventSender,
    pub ring_topic: String,
    pub discovery_prefix: String,
    pub timings: Timings,
    pub disarm_code: Option<SecretString>,
}

// ── Mapped device ────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParentInfo {
    pub id: String,
    pub device_type: String,
    pub name: String,
}

/// A vendor device plus what the mapper resolved around it.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceInfo {
    pub device: VendorDevice,
    pub parent: Option<ParentInfo>,
    /// Devices whose `parentZid` is this device.
    pub children: Vec<VendorDevice>,
    /// Id of the location's security panel, for bypass metadata.
    pub security_panel: Option<String>,
}

impl DeviceInfo {
    pub fn new(device: VendorDevice) -> Self {
        Self {
            device,
            parent: None,
            children: Vec::new(),
            security_panel: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.device.id
    }

    pub fn data(&self) -> &Map<String, Value> {
        &self.device.data
    }

    pub(crate) fn field(&self, path: &[&str]) -> Option<&Value> {
        let (first, rest) = path.split_first()?;
        rest.iter()
            .try_fold(self.device.data.get(*first)?, |value, key| value.get(*key))
    }

    pub(crate) fn str_at(&self, path: &[&str]) -> Option<&str> {
        self.field(path).and_then(Value::as_str)
    }

    pub(crate) fn f64_at(&self, path: &[&str]) -> Option<f64> {
        self.field(path).and_then(Value::as_f64)
    }

    pub(crate) fn bool_at(&self, path: &[&str]) -> Option<bool> {
        self.field(path).and_then(Value::as_bool)
    }

    pub(crate) fn child_of_type(&self, device_type: &str) -> Option<&VendorDevice> {
        self.children.iter().find(|c| c.device_type == device_type)
    }
}

/// Output of the mapper: the device and the behaviour it is bridged with.
#[derive(Debug, Clone, PartialEq)]
pub struct MappedDevice {
    pub info: DeviceInfo,
    pub kind: DeviceKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DeviceKind {
    Camera(Camera),
    Chime(Chime),
    Intercom(Intercom),
    BinarySensor(BinarySensor),
    FloodFreeze(FloodFreezeSensor),
    Temperature(TemperatureSensor),
    Alarm(AlarmSensor),
    PanicButton(PanicButton),
    Lock(Lock),
    Switch(Switch),
    MultiLevelSwitch(MultiLevelSwitch),
    Fan(Fan),
    Siren(Siren),
    Valve(Valve),
    SecurityPanel(SecurityPanel),
    ModesPanel(ModesPanel),
    BaseStation(BaseStation),
    Keypad(Keypad),
    Thermostat(Thermostat),
    Beam(Beam),
    /// Range extenders and bridges: diagnostics only.
    Info(InfoOnly),
}

impl DeviceKind {
    pub(crate) fn behavior(&self) -> &dyn DeviceBehavior {
        match self {
            Self::Camera(k) => k,
            Self::Chime(k) => k,
            Self::Intercom(k) => k,
            Self::BinarySensor(k) => k,
            Self::FloodFreeze(k) => k,
            Self::Temperature(k) => k,
            Self::Alarm(k) => k,
            Self::PanicButton(k) => k,
            Self::Lock(k) => k,
            Self::Switch(k) => k,
            Self::MultiLevelSwitch(k) => k,
            Self::Fan(k) => k,
            Self::Siren(k) => k,
            Self::Valve(k) => k,
            Self::SecurityPanel(k) => k,
            Self::ModesPanel(k) => k,
            Self::BaseStation(k) => k,
            Self::Keypad(k) => k,
            Self::Thermostat(k) => k,
            Self::Beam(k) => k,
            Self::Info(k) => k,
        }
    }

    pub(crate) fn behavior_mut(&mut self) -> &mut dyn DeviceBehavior {
        match self {
            Self::Camera(k) => k,
            Self::Chime(k) => k,
            Self::Intercom(k) => k,
            Self::BinarySensor(k) => k,
            Self::FloodFreeze(k) => k,
            Self::Temperature(k) => k,
            Self::Alarm(k) => k,
            Self::PanicButton(k) => k,
            Self::Lock(k) => k,
            Self::Switch(k) => k,
            Self::MultiLevelSwitch(k) => k,
            Self::Fan(k) => k,
            Self::Siren(k) => k,
            Self::Valve(k) => k,
            Self::SecurityPanel(k) => k,
            Self::ModesPanel(k) => k,
            Self::BaseStation(k) => k,
            Self::Keypad(k) => k,
            Self::Thermostat(k) => k,
            Self::Beam(k) => k,
            Self::Info(k) => k,
        }
    }
}

// ── Behaviour interface ──────────────────────────────────────────────

/// Read-only view handed to behaviours when they compute state.
pub(crate) struct StateView<'a> {
    pub info: &'a DeviceInfo,
    pulses: &'a HashMap<String, PulseTimer>,
}

impl<'a> StateView<'a> {
    pub(crate) fn new(info: &'a DeviceInfo, pulses: &'a HashMap<String, PulseTimer>) -> Self {
        Self { info, pulses }
    }

    pub(crate) fn pulse_active(&self, entity: &str) -> bool {
        self.pulses.get(entity).is_some_and(PulseTimer::is_active)
    }
}

/// Which timing a pulse runs for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PulseLength {
    Event,
    Unlock,
}

impl PulseLength {
    pub(crate) fn duration(self, timings: &Timings) -> Duration {
        match self {
            Self::Event => timings.ding_duration,
            Self::Unlock => timings.unlock_duration,
        }
    }
}

/// What a validated command turns into.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommandPlan {
    pub commands: Vec<VendorCommand>,
    /// Optimistic data applied once every command succeeded.
    pub patch: Map<String, Value>,
    pub pulse: Option<(String, PulseLength)>,
    /// Pulse ended early once the commands succeeded.
    pub cancel_pulse: Option<String>,
}

impl CommandPlan {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn send(command: VendorCommand) -> Self {
        Self {
            commands: vec![command],
            ..Self::default()
        }
    }

    pub fn patch(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.patch.insert(key.to_owned(), value.into());
        self
    }

    pub fn pulse(mut self, entity: &str, length: PulseLength) -> Self {
        self.pulse = Some((entity.to_owned(), length));
        self
    }

    pub fn cancel_pulse(mut self, entity: &str) -> Self {
        self.cancel_pulse = Some(entity.to_owned());
        self
    }
}

pub(crate) trait DeviceBehavior: Send + Sync {
    fn entities(&self, info: &DeviceInfo) -> Vec<EntityDef>;

    /// State payload for a topic suffix, `None` when unknown.
    fn state(&self, suffix: &str, view: &StateView<'_>) -> Option<String>;

    fn attributes(&self, info: &DeviceInfo) -> Map<String, Value> {
        common_attributes(info)
    }

    fn plan_command(
        &self,
        suffix: &str,
        _payload: &str,
        _view: &StateView<'_>,
    ) -> Result<CommandPlan, CoreError> {
        Err(CoreError::invalid(format!("{suffix} does not accept commands")))
    }

    /// Vendor-reported reachability; `None` defers to the connection.
    fn availability(&self, info: &DeviceInfo) -> Option<bool> {
        (info.str_at(&["commStatus"]) == Some("offline")).then_some(false)
    }

    /// Record a camera event. Returns the entity to pulse, if any.
    fn on_event(&mut self, _info: &DeviceInfo, _kind: &CameraEventKind) -> Option<&'static str> {
        None
    }

    /// Pulse made obsolete by a vendor push for the device itself.
    fn settled_pulse(&self, _patch: &Map<String, Value>) -> Option<&'static str> {
        None
    }
}

// ── Payload helpers ──────────────────────────────────────────────────

pub(crate) fn on_off(on: bool) -> String {
    (if on { "ON" } else { "OFF" }).to_owned()
}

pub(crate) fn parse_on_off(payload: &str) -> Result<bool, CoreError> {
    match payload.to_ascii_uppercase().as_str() {
        "ON" => Ok(true),
        "OFF" => Ok(false),
        other => Err(CoreError::invalid(format!("expected ON or OFF, got {other:?}"))),
    }
}

pub(crate) fn parse_number(payload: &str, min: f64, max: f64) -> Result<f64, CoreError> {
    let value: f64 = payload
        .parse()
        .map_err(|_| CoreError::invalid(format!("not a number: {payload:?}")))?;
    if !(min..=max).contains(&value) {
        return Err(CoreError::invalid(format!(
            "{value} outside the range {min}..={max}"
        )));
    }
    Ok(value)
}

pub(crate) fn format_number(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{value:.0}")
    } else {
        format!("{value:.1}")
    }
}

/// Vendor fractions (0.0..=1.0) as Home Assistant percentages.
#[allow(clippy::cast_possible_truncation)]
pub(crate) fn percent(fraction: f64) -> String {
    ((fraction * 100.0).round() as i64).to_string()
}

pub(crate) fn hub_set(info: &DeviceInfo, fields: Value) -> VendorCommand {
    VendorCommand::SetHubDeviceInfo {
        location_id: info.device.location_id.clone(),
        device_id: info.device.id.clone(),
        fields,
    }
}

pub(crate) fn hub_command(info: &DeviceInfo, command_type: &str, data: Value) -> VendorCommand {
    VendorCommand::SendHubCommand {
        location_id: info.device.location_id.clone(),
        device_id: info.device.id.clone(),
        command_type: command_type.to_owned(),
        data,
    }
}

/// Battery, tamper and connectivity attributes shared by hub devices.
pub(crate) fn common_attributes(info: &DeviceInfo) -> Map<String, Value> {
    const FIELDS: [(&str, &str); 6] = [
        ("batteryLevel", "battery_level"),
        ("batteryStatus", "battery_status"),
        ("tamperStatus", "tamper_status"),
        ("commStatus", "comm_status"),
        ("acStatus", "ac_status"),
        ("firmwareVersion", "firmware_version"),
    ];

    let mut attrs = Map::new();
    for (vendor, name) in FIELDS {
        if let Some(value) = info.field(&[vendor]).filter(|v| !v.is_null()) {
            attrs.insert(name.to_owned(), value.clone());
        }
    }
    let status = match info.str_at(&["commStatus"]) {
        Some("offline") => "offline",
        _ => "online",
    };
    attrs.insert("status".into(), json!(status));
    attrs
}


#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::test_support::hub_device;
    use super::*;

    #[test]
    fn numbers_are_range_checked() {
        assert_eq!(parse_number("7", 0.0, 11.0).unwrap(), 7.0);
        assert!(parse_number("12", 0.0, 11.0).is_err());
        assert!(parse_number("loud", 0.0, 11.0).is_err());
    }

    #[test]
    fn on_off_is_case_insensitive() {
        assert!(parse_on_off("on").unwrap());
        assert!(!parse_on_off("OFF").unwrap());
        assert!(parse_on_off("toggle").is_err());
    }

    #[test]
    fn nested_field_lookup() {
        let info = DeviceInfo::new(hub_device(
            "z1",
            "sensor.flood-freeze",
            json!({ "flood": { "faulted": true }, "batteryLevel": 90 }),
        ));
        assert_eq!(info.bool_at(&["flood", "faulted"]), Some(true));
        assert_eq!(info.bool_at(&["freeze", "faulted"]), None);
        assert_eq!(info.f64_at(&["batteryLevel"]), Some(90.0));
    }

    #[test]
    fn common_attributes_skip_missing_fields() {
        let info = DeviceInfo::new(hub_device(
            "z1",
            "sensor.contact",
            json!({ "batteryLevel": 80, "tamperStatus": "ok", "acStatus": null }),
        ));
        let attrs = common_attributes(&info);
        assert_eq!(
            Value::Object(attrs),
            json!({ "battery_level": 80, "tamper_status": "ok", "status": "online" })
        );
    }

    #[test]
    fn percentages_round() {
        assert_eq!(percent(0.333), "33");
        assert_eq!(format_number(21.0), "21");
        assert_eq!(format_number(21.5), "21.5");
    }
}

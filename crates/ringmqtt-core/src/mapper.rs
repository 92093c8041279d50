// ── Device mapper ──
//
// Decides, for each vendor device, whether and how it is bridged. The
// mapping is a pure function of the device, its siblings and its recent
// history; it never fails.

use crate::device::{
    AlarmSensor, BaseStation, Beam, BinarySensor, Camera, Chime, DeviceInfo, DeviceKind,
    FloodFreezeSensor, Fan, InfoOnly, Intercom, Keypad, Lock, MappedDevice, ModesPanel,
    MultiLevelSwitch, PanicButton, ParentInfo, SecurityPanel, Siren, Switch, TemperatureSensor,
    Thermostat, Valve,
};
use crate::model::{DeviceCategory, HistoryEvent, VendorDevice};

/// Types that are never bridged and never reported as unsupported.
pub const IGNORED_TYPES: &[&str] = &[
    "access-code",
    "access-code.vault",
    "adapter.zwave",
    "adapter.zigbee",
    "adapter.shadow",
    "switch.spare",
    "device.beams",
    "thermostat-operating-status",
];

const THERMOSTAT_TYPE: &str = "temperature-control.thermostat";
const SECURITY_PANEL_TYPE: &str = "security-panel";
/// Multi-level switches in this category are ceiling fans.
const FAN_CATEGORY_ID: u64 = 17;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MapperOptions {
    pub enable_cameras: bool,
    pub enable_modes: bool,
    pub enable_panic: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MapOutcome {
    Mapped(MappedDevice),
    /// Deliberately not bridged.
    Ignore,
    /// No wrapper exists for this device type.
    Unsupported,
}

type Constructor = fn(&VendorDevice, &MapperOptions) -> Option<DeviceKind>;

/// Hub device types and how to build their behaviour. `None` from a
/// constructor means the type is disabled by configuration.
const HUB_TABLE: &[(&str, Constructor)] = &[
    ("sensor.contact", binary_sensor),
    ("sensor.motion", binary_sensor),
    ("sensor.tilt", binary_sensor),
    ("sensor.glassbreak", binary_sensor),
    ("sensor.zone", binary_sensor),
    ("sensor", binary_sensor),
    ("sensor.flood-freeze", |_, _| Some(DeviceKind::FloodFreeze(FloodFreezeSensor))),
    ("sensor.freeze", |_, _| Some(DeviceKind::FloodFreeze(FloodFreezeSensor))),
    ("sensor.water", |_, _| Some(DeviceKind::FloodFreeze(FloodFreezeSensor))),
    ("sensor.temperature", |_, _| Some(DeviceKind::Temperature(TemperatureSensor))),
    (SECURITY_PANEL_TYPE, |_, o| {
        Some(DeviceKind::SecurityPanel(SecurityPanel { panic: o.enable_panic }))
    }),
    ("location.mode", |_, o| o.enable_modes.then_some(DeviceKind::ModesPanel(ModesPanel))),
    ("hub.redsky", |_, _| Some(DeviceKind::BaseStation(BaseStation))),
    ("hub.kili", |_, _| Some(DeviceKind::BaseStation(BaseStation))),
    ("security-keypad", |_, _| Some(DeviceKind::Keypad(Keypad))),
    ("alarm.smoke", |_, _| Some(DeviceKind::Alarm(AlarmSensor::Smoke))),
    ("alarm.co", |_, _| Some(DeviceKind::Alarm(AlarmSensor::Co))),
    ("listener.smoke-co", |_, _| Some(DeviceKind::Alarm(AlarmSensor::SmokeCoListener))),
    ("switch", |_, _| Some(DeviceKind::Switch(Switch))),
    ("switch.multilevel", multilevel),
    ("switch.multilevel.bulb", multilevel),
    ("motion-sensor.beams", beam),
    ("switch.multilevel.beams", beam),
    ("switch.transformer.beams", beam),
    ("group.light-group.beams", beam),
    ("siren", |_, _| Some(DeviceKind::Siren(Siren))),
    ("siren.outdoor-strobe", |_, _| Some(DeviceKind::Siren(Siren))),
    (THERMOSTAT_TYPE, |_, _| Some(DeviceKind::Thermostat(Thermostat))),
    ("valve.water", |_, _| Some(DeviceKind::Valve(Valve))),
    ("range-extender.zwave", |_, _| Some(DeviceKind::Info(InfoOnly))),
    ("adapter.ringnet", |_, _| Some(DeviceKind::Info(InfoOnly))),
    ("security-panic", |_, o| o.enable_panic.then_some(DeviceKind::PanicButton(PanicButton))),
];

fn binary_sensor(device: &VendorDevice, _: &MapperOptions) -> Option<DeviceKind> {
    Some(DeviceKind::BinarySensor(BinarySensor::from_type(&device.device_type)))
}

fn multilevel(device: &VendorDevice, _: &MapperOptions) -> Option<DeviceKind> {
    if device.category_id == Some(FAN_CATEGORY_ID) {
        Some(DeviceKind::Fan(Fan))
    } else {
        Some(DeviceKind::MultiLevelSwitch(MultiLevelSwitch))
    }
}

fn beam(device: &VendorDevice, _: &MapperOptions) -> Option<DeviceKind> {
    Some(DeviceKind::Beam(Beam::from_type(&device.device_type)))
}

fn is_lock_type(device_type: &str) -> bool {
    device_type == "lock" || device_type.starts_with("lock.")
}

fn hub_kind(device: &VendorDevice, options: &MapperOptions) -> Option<Option<DeviceKind>> {
    HUB_TABLE
        .iter()
        .find(|(ty, _)| *ty == device.device_type)
        .map(|(_, build)| build(device, options))
        .or_else(|| is_lock_type(&device.device_type).then_some(Some(DeviceKind::Lock(Lock))))
}

/// Classify one device.
///
/// `all_devices` is every device of the same location and is used to
/// resolve parent/child links; `recent_events` seeds camera attributes.
pub fn map(
    device: &VendorDevice,
    all_devices: &[VendorDevice],
    recent_events: &[HistoryEvent],
    options: &MapperOptions,
) -> MapOutcome {
    if IGNORED_TYPES.iter().any(|ty| *ty == device.device_type) {
        return MapOutcome::Ignore;
    }

    let parent = device
        .parent_id
        .as_deref()
        .and_then(|pid| all_devices.iter().find(|d| d.id == pid));

    let kind = match device.category {
        DeviceCategory::Camera if !options.enable_cameras => return MapOutcome::Ignore,
        DeviceCategory::Camera => DeviceKind::Camera(Camera::new(recent_events)),
        DeviceCategory::Chime => DeviceKind::Chime(Chime),
        DeviceCategory::Intercom => DeviceKind::Intercom(Intercom),
        DeviceCategory::Hub => {
            // Exposed through the thermostat's climate entity
            if device.device_type == "sensor.temperature"
                && parent.is_some_and(|p| p.device_type == THERMOSTAT_TYPE)
            {
                return MapOutcome::Ignore;
            }
            match hub_kind(device, options) {
                Some(Some(kind)) => kind,
                Some(None) => return MapOutcome::Ignore,
                None => return MapOutcome::Unsupported,
            }
        }
    };

    let children = all_devices
        .iter()
        .filter(|d| d.parent_id.as_deref() == Some(device.id.as_str()))
        .cloned()
        .collect();
    let security_panel = all_devices
        .iter()
        .find(|d| d.device_type == SECURITY_PANEL_TYPE && d.location_id == device.location_id)
        .map(|d| d.id.clone());

    MapOutcome::Mapped(MappedDevice {
        info: DeviceInfo {
            device: device.clone(),
            parent: parent.map(|p| ParentInfo {
                id: p.id.clone(),
                device_type: p.device_type.clone(),
                name: p.name.clone(),
            }),
            children,
            security_panel,
        },
        kind,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::device::test_support::hub_device;
    use crate::model::CameraEventKind;
    use serde_json::json;

    fn options() -> MapperOptions {
        MapperOptions {
            enable_cameras: true,
            ..MapperOptions::default()
        }
    }

    fn map_one(device: &VendorDevice) -> MapOutcome {
        map(device, std::slice::from_ref(device), &[], &options())
    }

    fn kind_of(outcome: MapOutcome) -> DeviceKind {
        match outcome {
            MapOutcome::Mapped(mapped) => mapped.kind,
            other => panic!("expected mapped, got {other:?}"),
        }
    }

    #[test]
    fn ignored_types_are_ignored() {
        for ty in IGNORED_TYPES {
            assert_eq!(map_one(&hub_device("x", ty, json!({}))), MapOutcome::Ignore, "{ty}");
        }
    }

    #[test]
    fn unknown_types_are_unsupported_but_locks_fall_back() {
        assert_eq!(map_one(&hub_device("x", "sensor.gizmo", json!({}))), MapOutcome::Unsupported);
        assert_eq!(map_one(&hub_device("x", "lockbox", json!({}))), MapOutcome::Unsupported);
        assert_eq!(kind_of(map_one(&hub_device("x", "lock.zwave", json!({})))), DeviceKind::Lock(Lock));
        assert_eq!(kind_of(map_one(&hub_device("x", "lock", json!({})))), DeviceKind::Lock(Lock));
    }

    #[test]
    fn thermostat_temperature_child_is_folded_into_parent() {
        let thermostat = hub_device("t1", THERMOSTAT_TYPE, json!({}));
        let mut sensor = hub_device("t2", "sensor.temperature", json!({ "celsius": 20 }));
        sensor.parent_id = Some("t1".into());
        let mut standalone = hub_device("t3", "sensor.temperature", json!({}));
        standalone.parent_id = Some("hub".into());
        let all = [thermostat.clone(), sensor.clone(), standalone.clone()];

        assert_eq!(map(&sensor, &all, &[], &options()), MapOutcome::Ignore);
        assert_eq!(
            kind_of(map(&standalone, &all, &[], &options())),
            DeviceKind::Temperature(TemperatureSensor)
        );

        let MapOutcome::Mapped(parent) = map(&thermostat, &all, &[], &options()) else {
            panic!("thermostat must map");
        };
        assert_eq!(parent.info.children, [sensor]);
    }

    #[test]
    fn parent_and_children_resolve_both_ways() {
        let hub = hub_device("hub", "hub.redsky", json!({}));
        let mut contact = hub_device("c1", "sensor.contact", json!({}));
        contact.parent_id = Some("hub".into());
        let all = [hub.clone(), contact.clone()];

        let MapOutcome::Mapped(h) = map(&hub, &all, &[], &options()) else { panic!() };
        assert_eq!(h.info.children.len(), 1);
        assert_eq!(h.info.children[0].id, "c1");

        let MapOutcome::Mapped(c) = map(&contact, &all, &[], &options()) else { panic!() };
        assert_eq!(c.info.parent.unwrap().device_type, "hub.redsky");
    }

    #[test]
    fn zone_sensors_reference_security_panel() {
        let panel = hub_device("p1", "security-panel", json!({}));
        let glass = hub_device("g1", "sensor.glassbreak", json!({}));
        let all = [panel, glass.clone()];

        let MapOutcome::Mapped(m) = map(&glass, &all, &[], &options()) else { panic!() };
        assert_eq!(m.info.security_panel.as_deref(), Some("p1"));
        assert_eq!(m.kind, DeviceKind::BinarySensor(BinarySensor::from_type("sensor.glassbreak")));
    }

    #[test]
    fn fan_category_and_feature_flags() {
        let mut fan = hub_device("f1", "switch.multilevel", json!({}));
        fan.category_id = Some(17);
        assert_eq!(kind_of(map_one(&fan)), DeviceKind::Fan(Fan));

        let mode = hub_device("loc", "location.mode", json!({}));
        assert_eq!(map_one(&mode), MapOutcome::Ignore);
        let enabled = MapperOptions { enable_modes: true, ..options() };
        assert_eq!(
            kind_of(map(&mode, std::slice::from_ref(&mode), &[], &enabled)),
            DeviceKind::ModesPanel(ModesPanel)
        );

        let panic_button = hub_device("pb", "security-panic", json!({}));
        assert_eq!(map_one(&panic_button), MapOutcome::Ignore);
    }

    #[test]
    fn cameras_carry_recent_events() {
        let mut cam = hub_device("42", "doorbell_v3", json!({ "doorbell": true }));
        cam.category = DeviceCategory::Camera;
        let events = [HistoryEvent {
            id: "e1".into(),
            device_id: "42".into(),
            kind: CameraEventKind::Ding,
            created_at: chrono::Utc::now(),
        }];

        let outcome = map(&cam, std::slice::from_ref(&cam), &events, &options());
        assert_eq!(kind_of(outcome), DeviceKind::Camera(Camera::new(&events)));

        let disabled = MapperOptions::default();
        assert_eq!(map(&cam, &[], &[], &disabled), MapOutcome::Ignore);
    }
}

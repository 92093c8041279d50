// ── Entity declarations ──
//
// An entity is one Home Assistant object (a sensor, a switch, a lock)
// exposed by a device. Wrappers declare their entities once at
// construction; the topic set of each is derived from the declaration.

use serde_json::{Map, Value};
use strum::{AsRefStr, Display};

/// Home Assistant MQTT component kinds used by the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum Component {
    AlarmControlPanel,
    BinarySensor,
    Button,
    Climate,
    Fan,
    Light,
    Lock,
    Number,
    Sensor,
    Switch,
}

/// A secondary state/command pair of an entity, e.g. a fan's percentage.
///
/// Its topic suffix is `<entity>_<name>`; the discovery payload links the
/// topics under `state_field` and `command_field`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuxDef {
    pub name: &'static str,
    pub state_field: String,
    pub command_field: Option<String>,
}

/// Declaration of one entity.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityDef {
    pub key: String,
    pub component: Component,
    /// The primary entity's discovery object id is the bare device id.
    pub primary: bool,
    pub stateful: bool,
    pub commandable: bool,
    pub device_class: Option<&'static str>,
    pub aux: Vec<AuxDef>,
    /// Component-specific discovery fields.
    pub extras: Map<String, Value>,
}

impl EntityDef {
    pub fn new(key: impl Into<String>, component: Component) -> Self {
        Self {
            key: key.into(),
            component,
            primary: false,
            stateful: true,
            commandable: false,
            device_class: None,
            aux: Vec::new(),
            extras: Map::new(),
        }
    }

    pub fn primary(mut self) -> Self {
        self.primary = true;
        self
    }

    pub fn commandable(mut self) -> Self {
        self.commandable = true;
        self
    }

    /// Buttons and climate entities carry no main state topic.
    pub fn stateless(mut self) -> Self {
        self.stateful = false;
        self
    }

    pub fn class(mut self, device_class: &'static str) -> Self {
        self.device_class = Some(device_class);
        self
    }

    pub fn extra(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.extras.insert(field.to_owned(), value.into());
        self
    }

    /// Add a state/command pair linked as `<name>_state_topic` and
    /// `<name>_command_topic`.
    pub fn aux(mut self, name: &'static str) -> Self {
        self.aux.push(AuxDef {
            name,
            state_field: format!("{name}_state_topic"),
            command_field: Some(format!("{name}_command_topic")),
        });
        self
    }

    /// Add a read-only state linked under an explicit discovery field.
    pub fn aux_state(mut self, name: &'static str, state_field: &str) -> Self {
        self.aux.push(AuxDef {
            name,
            state_field: state_field.to_owned(),
            command_field: None,
        });
        self
    }

    /// Topic suffix of an aux pair.
    pub fn aux_suffix(&self, aux: &AuxDef) -> String {
        format!("{}_{}", self.key, aux.name)
    }

    /// The shared `info` sensor every battery/hub device exposes.
    pub fn info() -> Self {
        Self::new("info", Component::Sensor)
            .extra("value_template", "{{ value_json.status }}")
            .extra("entity_category", "diagnostic")
            .extra("icon", "mdi:information-outline")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn component_names_match_home_assistant() {
        assert_eq!(Component::AlarmControlPanel.as_ref(), "alarm_control_panel");
        assert_eq!(Component::BinarySensor.to_string(), "binary_sensor");
    }

    #[test]
    fn aux_pairs_get_derived_fields() {
        let def = EntityDef::new("fan", Component::Fan)
            .aux("percentage")
            .aux_state("current_temperature", "current_temperature_topic");

        assert_eq!(def.aux[0].state_field, "percentage_state_topic");
        assert_eq!(def.aux[0].command_field.as_deref(), Some("percentage_command_topic"));
        assert_eq!(def.aux[1].command_field, None);
        assert_eq!(def.aux_suffix(&def.aux[0]), "fan_percentage");
    }
}

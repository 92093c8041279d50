// ── Topic layout ──
//
//   discovery:    <prefix>/<component>/<location>/<object_id>/config
//   state:        <root>/<component>/<device>/<suffix>_state
//   command:      <root>/<component>/<device>/<suffix>_command
//   attributes:   <root>/<component>/<device>/attributes
//   availability: <root>/<component>/<device>/status
//
// with <root> = <ring_topic>/<location>/<group> and <object_id> the device
// id for the primary entity, <device>_<entity> otherwise. Every topic is a
// pure function of its inputs, so it is stable across restarts.

use crate::device::entity::{Component, EntityDef};
use crate::model::DeviceCategory;

/// Device-level topics, rooted at the primary entity's component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceTopics {
    pub attributes: String,
    pub availability: String,
}

/// Topic set of one entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityTopics {
    pub config: String,
    /// `(suffix, topic)` for the main state and each aux state.
    pub states: Vec<(String, String)>,
    /// `(suffix, topic)` for the main command and each aux command.
    pub commands: Vec<(String, String)>,
}

impl EntityTopics {
    pub fn state(&self, suffix: &str) -> Option<&str> {
        lookup(&self.states, suffix)
    }

    pub fn command(&self, suffix: &str) -> Option<&str> {
        lookup(&self.commands, suffix)
    }
}

fn lookup<'a>(pairs: &'a [(String, String)], suffix: &str) -> Option<&'a str> {
    pairs
        .iter()
        .find(|(s, _)| s == suffix)
        .map(|(_, t)| t.as_str())
}

pub(crate) struct TopicBuilder<'a> {
    root: String,
    discovery_prefix: &'a str,
    location_id: &'a str,
    device_id: &'a str,
}

impl<'a> TopicBuilder<'a> {
    pub(crate) fn new(
        ring_topic: &str,
        discovery_prefix: &'a str,
        location_id: &'a str,
        category: DeviceCategory,
        device_id: &'a str,
    ) -> Self {
        Self {
            root: format!("{ring_topic}/{location_id}/{}", category.topic_group()),
            discovery_prefix,
            location_id,
            device_id,
        }
    }

    fn base(&self, component: Component) -> String {
        format!("{}/{component}/{}", self.root, self.device_id)
    }

    pub(crate) fn device(&self, primary: Component) -> DeviceTopics {
        let base = self.base(primary);
        DeviceTopics {
            attributes: format!("{base}/attributes"),
            availability: format!("{base}/status"),
        }
    }

    pub(crate) fn entity(&self, def: &EntityDef) -> EntityTopics {
        let base = self.base(def.component);
        let object_id = if def.primary {
            self.device_id.to_owned()
        } else {
            format!("{}_{}", self.device_id, def.key)
        };

        let mut states = Vec::new();
        let mut commands = Vec::new();
        if def.stateful {
            states.push((def.key.clone(), format!("{base}/{}_state", def.key)));
        }
        if def.commandable {
            commands.push((def.key.clone(), format!("{base}/{}_command", def.key)));
        }
        for aux in &def.aux {
            let suffix = def.aux_suffix(aux);
            states.push((suffix.clone(), format!("{base}/{suffix}_state")));
            if aux.command_field.is_some() {
                commands.push((suffix.clone(), format!("{base}/{suffix}_command")));
            }
        }

        EntityTopics {
            config: format!(
                "{}/{}/{}/{object_id}/config",
                self.discovery_prefix, def.component, self.location_id
            ),
            states,
            commands,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn builder() -> TopicBuilder<'static> {
        TopicBuilder::new("ring", "homeassistant", "loc1", DeviceCategory::Hub, "z1")
    }

    #[test]
    fn primary_entity_uses_device_id_as_object_id() {
        let def = EntityDef::new("contact", Component::BinarySensor).primary();
        let topics = builder().entity(&def);

        assert_eq!(topics.config, "homeassistant/binary_sensor/loc1/z1/config");
        assert_eq!(
            topics.state("contact"),
            Some("ring/loc1/alarm/binary_sensor/z1/contact_state")
        );
        assert!(topics.commands.is_empty());
    }

    #[test]
    fn secondary_entity_and_aux_topics() {
        let def = EntityDef::new("fan", Component::Fan).commandable().aux("percentage");
        let topics = builder().entity(&def);

        assert_eq!(topics.config, "homeassistant/fan/loc1/z1_fan/config");
        assert_eq!(topics.command("fan"), Some("ring/loc1/alarm/fan/z1/fan_command"));
        assert_eq!(
            topics.command("fan_percentage"),
            Some("ring/loc1/alarm/fan/z1/fan_percentage_command")
        );
        assert_eq!(
            topics.state("fan_percentage"),
            Some("ring/loc1/alarm/fan/z1/fan_percentage_state")
        );
    }

    #[test]
    fn device_topics_follow_category_group() {
        let cam = TopicBuilder::new("ring", "homeassistant", "loc1", DeviceCategory::Camera, "42");
        let topics = cam.device(Component::BinarySensor);
        assert_eq!(topics.availability, "ring/loc1/camera/binary_sensor/42/status");
        assert_eq!(topics.attributes, "ring/loc1/camera/binary_sensor/42/attributes");
    }

    #[test]
    fn topics_are_deterministic() {
        let def = EntityDef::new("siren", Component::Switch).commandable();
        assert_eq!(builder().entity(&def), builder().entity(&def));
    }
}

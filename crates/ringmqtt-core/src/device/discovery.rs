// ── Home Assistant discovery payloads ──

use serde::Serialize;
use serde_json::{Map, Value};

use crate::device::entity::EntityDef;
use crate::device::topics::{DeviceTopics, EntityTopics};
use crate::model::VendorDevice;

pub const PAYLOAD_AVAILABLE: &str = "online";
pub const PAYLOAD_NOT_AVAILABLE: &str = "offline";

#[derive(Debug, Clone, Serialize)]
pub struct DeviceBlock {
    pub identifiers: Vec<String>,
    pub name: String,
    pub manufacturer: &'static str,
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub via_device: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DiscoveryPayload {
    pub name: String,
    pub unique_id: String,
    pub availability_topic: String,
    pub payload_available: &'static str,
    pub payload_not_available: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_topic: Option<String>,
    pub json_attributes_topic: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_class: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command_topic: Option<String>,
    pub device: DeviceBlock,
    #[serde(flatten)]
    pub extras: Map<String, Value>,
}

impl DiscoveryPayload {
    pub fn build(
        device: &VendorDevice,
        def: &EntityDef,
        topics: &EntityTopics,
        device_topics: &DeviceTopics,
    ) -> Self {
        let name = if def.primary {
            device.name.clone()
        } else {
            format!("{} {}", device.name, title_case(&def.key))
        };

        let mut extras = def.extras.clone();
        for aux in &def.aux {
            let suffix = def.aux_suffix(aux);
            if let Some(topic) = topics.state(&suffix) {
                extras.insert(aux.state_field.clone(), Value::from(topic));
            }
            if let (Some(field), Some(topic)) = (&aux.command_field, topics.command(&suffix)) {
                extras.insert(field.clone(), Value::from(topic));
            }
        }

        Self {
            name,
            unique_id: format!("{}_{}", device.id, def.key),
            availability_topic: device_topics.availability.clone(),
            payload_available: PAYLOAD_AVAILABLE,
            payload_not_available: PAYLOAD_NOT_AVAILABLE,
            state_topic: topics.state(&def.key).map(str::to_owned),
            json_attributes_topic: device_topics.attributes.clone(),
            device_class: def.device_class,
            command_topic: topics.command(&def.key).map(str::to_owned),
            device: DeviceBlock {
                identifiers: vec![device.id.clone()],
                name: device.name.clone(),
                manufacturer: "Ring",
                model: device.device_type.clone(),
                via_device: device.parent_id.clone(),
            },
            extras,
        }
    }
}

fn title_case(key: &str) -> String {
    key.split('_')
        .map(|word| {
            let mut chars = word.chars();
            chars.next().map_or_else(String::new, |first| {
                first.to_uppercase().chain(chars).collect()
            })
        })
        .collect::<Vec<_>>()
        .join(" ")
}

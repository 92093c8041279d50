use std::collections::HashMap;
use std::sync::Arc;

use secrecy::ExposeSecret;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use super::discovery::{DiscoveryPayload, PAYLOAD_AVAILABLE, PAYLOAD_NOT_AVAILABLE};
use super::entity::{Component, EntityDef};
use super::pulse::PulseTimer;
use super::topics::{DeviceTopics, EntityTopics, TopicBuilder};
use super::{DeviceContext, DeviceInfo, DeviceKind, MappedDevice, PulseLength, StateView};
use crate::model::{CameraEventKind, DeviceCategory};

struct EntityState {
    def: EntityDef,
    topics: EntityTopics,
    /// Last published payload per state suffix.
    published: HashMap<String, String>,
}

/// Bridges one vendor device to its Home Assistant entities.
pub struct DeviceWrapper {
    info: DeviceInfo,
    kind: DeviceKind,
    ctx: Arc<DeviceContext>,
    entities: Vec<EntityState>,
    device_topics: DeviceTopics,
    published_attributes: Option<String>,
    published_availability: Option<bool>,
    /// Cleared while the device's hub connection is down.
    online: bool,
    pulses: HashMap<String, PulseTimer>,
}

impl DeviceWrapper {
    pub fn new(mapped: MappedDevice, ctx: Arc<DeviceContext>) -> Self {
        let MappedDevice { info, kind } = mapped;
        let defs = kind.behavior().entities(&info);
        let primary = defs
            .iter()
            .find(|d| d.primary)
            .or_else(|| defs.first())
            .map_or(Component::Sensor, |d| d.component);

        let builder = TopicBuilder::new(
            &ctx.ring_topic,
            &ctx.discovery_prefix,
            &info.device.location_id,
            info.device.category,
            &info.device.id,
        );
        let device_topics = builder.device(primary);
        let entities = defs
            .into_iter()
            .map(|def| EntityState {
                topics: builder.entity(&def),
                def,
                published: HashMap::new(),
            })
            .collect();

        Self {
            info,
            kind,
            ctx,
            entities,
            device_topics,
            published_attributes: None,
            published_availability: None,
            online: true,
            pulses: HashMap::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.info.device.id
    }

    pub fn name(&self) -> &str {
        &self.info.device.name
    }

    pub fn info(&self) -> &DeviceInfo {
        &self.info
    }

    pub fn kind(&self) -> &DeviceKind {
        &self.kind
    }

    pub fn is_camera(&self) -> bool {
        self.info.device.category == DeviceCategory::Camera
    }

    pub fn device_topics(&self) -> &DeviceTopics {
        &self.device_topics
    }

    /// `(command topic, suffix)` pairs this wrapper answers to.
    pub fn command_routes(&self) -> Vec<(String, String)> {
        self.entities
            .iter()
            .flat_map(|e| e.topics.commands.iter())
            .map(|(suffix, topic)| (topic.clone(), suffix.clone()))
            .collect()
    }

    /// Ids of children whose data this wrapper exposes.
    pub fn child_ids(&self) -> Vec<String> {
        self.info.children.iter().map(|c| c.id.clone()).collect()
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Discovery, settle, full state, then command subscriptions.
    pub async fn initialize(&mut self) {
        info!(
            device_id = %self.id(),
            name = %self.name(),
            entities = self.entities.len(),
            "publishing device"
        );
        self.publish_discovery();
        tokio::time::sleep(self.ctx.timings.settle_delay).await;
        self.publish_state(true);
        self.subscribe_commands();
    }

    /// Discovery and forced state; used after a broker reconnect and by
    /// republish cycles.
    pub async fn republish(&mut self) {
        self.publish_discovery();
        tokio::time::sleep(self.ctx.timings.settle_delay).await;
        self.publish_state(true);
    }

    pub fn subscribe_commands(&self) {
        for (topic, _) in self.command_routes() {
            self.ctx.publisher.subscribe(topic);
        }
    }

    fn publish_discovery(&self) {
        for entity in &self.entities {
            let mut payload = DiscoveryPayload::build(
                &self.info.device,
                &entity.def,
                &entity.topics,
                &self.device_topics,
            );
            if entity.def.component == Component::AlarmControlPanel {
                if let Some(code) = &self.ctx.disarm_code {
                    payload
                        .extras
                        .insert("code".into(), Value::from(code.expose_secret()));
                }
            }
            match serde_json::to_string(&payload) {
                Ok(json) => self.ctx.publisher.publish(&entity.topics.config, json, true),
                Err(e) => warn!(device_id = %self.id(), error = %e, "discovery payload failed"),
            }
        }
    }

    /// Publish entity states, attributes and availability. Unchanged
    /// values are skipped unless `forced`.
    pub fn publish_state(&mut self, forced: bool) {
        let view = StateView::new(&self.info, &self.pulses);
        let behavior = self.kind.behavior();
        let attributes = behavior.attributes(&self.info);

        for entity in &mut self.entities {
            for (suffix, topic) in &entity.topics.states {
                let state = if suffix == "info" {
                    serde_json::to_string(&attributes).ok()
                } else {
                    behavior.state(suffix, &view)
                };
                let Some(state) = state else { continue };
                if !forced && entity.published.get(suffix) == Some(&state) {
                    continue;
                }
                self.ctx.publisher.publish(topic, state.clone(), true);
                entity.published.insert(suffix.clone(), state);
            }
        }

        if let Ok(json) = serde_json::to_string(&attributes) {
            if forced || self.published_attributes.as_ref() != Some(&json) {
                self.ctx
                    .publisher
                    .publish(&self.device_topics.attributes, json.clone(), true);
                self.published_attributes = Some(json);
            }
        }

        let available = self.online && behavior.availability(&self.info) != Some(false);
        self.publish_availability(available, forced);
    }

    fn publish_availability(&mut self, available: bool, forced: bool) {
        if !forced && self.published_availability == Some(available) {
            return;
        }
        let payload = if available {
            PAYLOAD_AVAILABLE
        } else {
            PAYLOAD_NOT_AVAILABLE
        };
        self.ctx
            .publisher
            .publish(&self.device_topics.availability, payload, true);
        self.published_availability = Some(available);
    }

    pub fn go_offline(&mut self) {
        self.online = false;
        self.publish_availability(false, true);
    }

    pub fn set_online(&mut self) {
        self.online = true;
        self.publish_state(false);
    }

    // ── Inbound ──────────────────────────────────────────────────────

    /// Apply a vendor data push for this device or one of its children.
    pub fn update_data(&mut self, device_id: &str, patch: &Map<String, Value>) {
        let changed = if device_id == self.info.device.id {
            let settled = self.kind.behavior().settled_pulse(patch);
            let cancelled = settled.is_some_and(|entity| self.cancel_pulse(entity));
            self.info.device.merge(patch) || cancelled
        } else if let Some(child) = self.info.children.iter_mut().find(|c| c.id == device_id) {
            child.merge(patch)
        } else {
            false
        };
        if changed {
            self.publish_state(false);
        }
    }

    /// Validate and execute a command received on one of our topics.
    /// Failures are logged and leave local state untouched.
    pub async fn process_command(&mut self, suffix: &str, payload: &str) {
        let payload = payload.trim();
        let view = StateView::new(&self.info, &self.pulses);
        let plan = match self.kind.behavior().plan_command(suffix, payload, &view) {
            Ok(plan) => plan,
            Err(e) => {
                warn!(device_id = %self.id(), suffix, payload, error = %e, "command rejected");
                return;
            }
        };

        debug!(device_id = %self.id(), suffix, payload, "processing command");
        for command in plan.commands {
            if let Err(e) = self.ctx.commands.execute(command).await {
                warn!(device_id = %self.id(), suffix, error = %e, "vendor command failed");
                return;
            }
        }

        self.info.device.merge(&plan.patch);
        if let Some(entity) = plan.cancel_pulse {
            self.cancel_pulse(&entity);
        }
        if let Some((entity, length)) = plan.pulse {
            self.start_pulse(&entity, length);
        }
        self.publish_state(false);
    }

    /// A ding or motion reported by the vendor.
    pub fn trigger_event(&mut self, kind: &CameraEventKind) {
        let Some(entity) = self.kind.behavior_mut().on_event(&self.info, kind) else {
            debug!(device_id = %self.id(), %kind, "event has no entity");
            return;
        };
        self.start_pulse(entity, PulseLength::Event);
        self.publish_state(false);
    }

    pub fn pulse_expired(&mut self, entity: &str, generation: u64) {
        let expired = self
            .pulses
            .get_mut(entity)
            .is_some_and(|timer| timer.expire(generation));
        if expired {
            debug!(device_id = %self.id(), entity, "pulse ended");
            self.publish_state(false);
        }
    }

    fn start_pulse(&mut self, entity: &str, length: PulseLength) {
        let duration = length.duration(&self.ctx.timings);
        let events = self.ctx.events.clone();
        let device_id = self.info.device.id.clone();
        self.pulses
            .entry(entity.to_owned())
            .or_default()
            .start(duration, &device_id, entity, &events);
    }

    /// End a pulse before it expires. Returns `true` if one was running.
    fn cancel_pulse(&mut self, entity: &str) -> bool {
        let Some(timer) = self.pulses.get_mut(entity) else {
            return false;
        };
        let active = timer.is_active();
        timer.cancel();
        if active {
            debug!(device_id = %self.info.device.id, entity, "pulse cancelled");
        }
        active
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use pretty_assertions::assert_eq;
    use serde_json::json;
    use tokio::sync::mpsc;

    use super::*;
    use crate::command::{CommandEnvelope, CommandSender, VendorCommand};
    use crate::config::Timings;
    use crate::device::test_support::{hub_device, rest_device};
    use crate::device::{Beam, Intercom, Lock, Switch};
    use crate::event::{self, BridgeEvent, EventReceiver};
    use crate::mqtt::{MqttPublisher, MqttRequest};

    struct Harness {
        mqtt_rx: mpsc::UnboundedReceiver<MqttRequest>,
        command_rx: mpsc::Receiver<CommandEnvelope>,
        events_rx: EventReceiver,
        ctx: Arc<DeviceContext>,
    }

    impl Harness {
        fn new() -> Self {
            let (publisher, mqtt_rx) = MqttPublisher::channel();
            let (commands, command_rx) = CommandSender::channel();
            let (events, events_rx) = event::channel();
            let ctx = Arc::new(DeviceContext {
                publisher,
                commands,
                events,
                ring_topic: "ring".into(),
                discovery_prefix: "homeassistant".into(),
                timings: Timings::default(),
                disarm_code: None,
            });
            Self {
                mqtt_rx,
                command_rx,
                events_rx,
                ctx,
            }
        }

        fn published(&mut self) -> Vec<(String, String)> {
            let mut out = Vec::new();
            while let Ok(req) = self.mqtt_rx.try_recv() {
                if let MqttRequest::Publish { topic, payload, .. } = req {
                    out.push((topic, payload));
                }
            }
            out
        }

        /// Answer every queued vendor command with `ok`.
        fn answer_commands(mut rx: mpsc::Receiver<CommandEnvelope>, ok: bool) -> tokio::task::JoinHandle<Vec<VendorCommand>> {
            tokio::spawn(async move {
                let mut seen = Vec::new();
                while let Some(env) = rx.recv().await {
                    seen.push(env.command);
                    let result = if ok {
                        Ok(())
                    } else {
                        Err(crate::error::CoreError::Rejected { message: "nope".into() })
                    };
                    let _ = env.response_tx.send(result);
                }
                seen
            })
        }
    }

    fn switch_wrapper(h: &Harness) -> DeviceWrapper {
        let info = DeviceInfo::new(hub_device("z1", "switch", json!({ "on": false })));
        DeviceWrapper::new(
            MappedDevice {
                info,
                kind: DeviceKind::Switch(Switch),
            },
            h.ctx.clone(),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn initialize_publishes_discovery_then_state() {
        let mut h = Harness::new();
        let mut wrapper = switch_wrapper(&h);

        wrapper.initialize().await;
        let published = h.published();
        let topics: Vec<&str> = published.iter().map(|(t, _)| t.as_str()).collect();

        assert_eq!(
            topics,
            [
                "homeassistant/switch/loc/z1/config",
                "ring/loc/alarm/switch/z1/switch_state",
                "ring/loc/alarm/switch/z1/attributes",
                "ring/loc/alarm/switch/z1/status",
            ]
        );
        assert_eq!(published[1].1, "OFF");
        assert_eq!(published[3].1, "online");
    }

    #[tokio::test]
    async fn command_topics_are_routed_and_subscribed() {
        let mut h = Harness::new();
        let wrapper = switch_wrapper(&h);

        let routes = wrapper.command_routes();
        assert_eq!(
            routes,
            [(
                "ring/loc/alarm/switch/z1/switch_command".to_owned(),
                "switch".to_owned()
            )]
        );

        wrapper.subscribe_commands();
        assert_eq!(
            h.mqtt_rx.try_recv().unwrap(),
            MqttRequest::Subscribe {
                topic: routes[0].0.clone()
            }
        );
    }

    #[tokio::test]
    async fn unchanged_state_is_not_republished() {
        let mut h = Harness::new();
        let mut wrapper = switch_wrapper(&h);

        wrapper.publish_state(false);
        assert_eq!(h.published().len(), 3);

        wrapper.publish_state(false);
        assert!(h.published().is_empty());

        wrapper.publish_state(true);
        assert_eq!(h.published().len(), 3);
    }

    #[tokio::test]
    async fn data_push_publishes_only_changes() {
        let mut h = Harness::new();
        let mut wrapper = switch_wrapper(&h);
        wrapper.publish_state(false);
        h.published();

        wrapper.update_data("z1", json!({ "on": true }).as_object().unwrap());
        assert_eq!(
            h.published(),
            [("ring/loc/alarm/switch/z1/switch_state".to_owned(), "ON".to_owned())]
        );

        wrapper.update_data("other", json!({ "on": false }).as_object().unwrap());
        assert!(h.published().is_empty());
    }

    #[tokio::test]
    async fn failed_command_leaves_state_unchanged() {
        let mut h = Harness::new();
        let mut wrapper = switch_wrapper(&h);
        wrapper.publish_state(false);
        h.published();

        let command_rx = std::mem::replace(&mut h.command_rx, mpsc::channel(1).1);
        let responder = Harness::answer_commands(command_rx, false);
        wrapper.process_command("switch", "ON").await;

        assert!(h.published().is_empty());
        assert_eq!(wrapper.info().data()["on"], false);
        drop(wrapper);
        drop(h.ctx);
        let seen = responder.await.unwrap();
        assert_eq!(seen.len(), 1);
    }

    #[tokio::test]
    async fn invalid_payload_never_reaches_vendor() {
        let mut h = Harness::new();
        let mut wrapper = switch_wrapper(&h);

        wrapper.process_command("switch", "MAYBE").await;
        assert!(h.command_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn go_offline_publishes_offline_availability() {
        let mut h = Harness::new();
        let mut wrapper = switch_wrapper(&h);
        wrapper.publish_state(false);
        h.published();

        wrapper.go_offline();
        assert_eq!(
            h.published(),
            [("ring/loc/alarm/switch/z1/status".to_owned(), "offline".to_owned())]
        );

        wrapper.publish_state(true);
        assert!(h.published().iter().any(|(t, p)| t.ends_with("/status") && p == "offline"));

        wrapper.set_online();
        assert_eq!(
            h.published(),
            [("ring/loc/alarm/switch/z1/status".to_owned(), "online".to_owned())]
        );
    }

    fn intercom_wrapper(h: &Harness) -> DeviceWrapper {
        let info = DeviceInfo::new(rest_device("77", DeviceCategory::Intercom, json!({})));
        DeviceWrapper::new(
            MappedDevice {
                info,
                kind: DeviceKind::Intercom(Intercom::default()),
            },
            h.ctx.clone(),
        )
    }

    fn lock_state(published: &[(String, String)]) -> Option<&str> {
        published
            .iter()
            .rev()
            .find(|(t, _)| t.ends_with("/lock_state"))
            .map(|(_, p)| p.as_str())
    }

    #[tokio::test(start_paused = true)]
    async fn intercom_unlock_reverts_and_resets() {
        let mut h = Harness::new();
        let mut wrapper = intercom_wrapper(&h);
        wrapper.publish_state(false);
        assert_eq!(lock_state(&h.published()), Some("LOCKED"));

        let command_rx = std::mem::replace(&mut h.command_rx, mpsc::channel(1).1);
        let _responder = Harness::answer_commands(command_rx, true);

        wrapper.process_command("lock", "UNLOCK").await;
        assert_eq!(lock_state(&h.published()), Some("UNLOCKED"));

        // A second unlock 3 s in restarts the 5 s window
        tokio::time::sleep(Duration::from_secs(3)).await;
        wrapper.process_command("lock", "UNLOCK").await;
        assert!(lock_state(&h.published()).is_none(), "still unlocked, nothing new");

        tokio::time::sleep(Duration::from_secs(3)).await;
        let stale = h.events_rx.try_recv();
        assert!(stale.is_err(), "first timer was cancelled");

        tokio::time::sleep(Duration::from_secs(2)).await;
        let Some(BridgeEvent::PulseExpired { entity, generation, .. }) = h.events_rx.recv().await
        else {
            panic!("expected pulse expiry");
        };
        wrapper.pulse_expired(&entity, generation);
        assert_eq!(lock_state(&h.published()), Some("LOCKED"));
    }

    #[tokio::test(start_paused = true)]
    async fn intercom_lock_ends_unlock_early() {
        let mut h = Harness::new();
        let mut wrapper = intercom_wrapper(&h);
        wrapper.publish_state(false);
        h.published();

        let command_rx = std::mem::replace(&mut h.command_rx, mpsc::channel(1).1);
        let responder = Harness::answer_commands(command_rx, true);

        wrapper.process_command("lock", "UNLOCK").await;
        assert_eq!(lock_state(&h.published()), Some("UNLOCKED"));
        tokio::time::sleep(Duration::from_secs(1)).await;
        wrapper.process_command("lock", "LOCK").await;
        assert_eq!(lock_state(&h.published()), Some("LOCKED"));

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(h.events_rx.try_recv().is_err(), "cancelled pulse never expires");

        // Only the unlock reached the vendor.
        drop(wrapper);
        drop(h);
        assert_eq!(responder.await.unwrap().len(), 1);
    }

    fn lock_wrapper(h: &Harness) -> DeviceWrapper {
        let info = DeviceInfo::new(hub_device("l1", "lock.zwave", json!({ "locked": "locked" })));
        DeviceWrapper::new(
            MappedDevice {
                info,
                kind: DeviceKind::Lock(Lock),
            },
            h.ctx.clone(),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn lock_unlock_reverts_without_hub_report() {
        let mut h = Harness::new();
        let mut wrapper = lock_wrapper(&h);
        wrapper.publish_state(false);
        assert_eq!(lock_state(&h.published()), Some("LOCKED"));

        let command_rx = std::mem::replace(&mut h.command_rx, mpsc::channel(1).1);
        let _responder = Harness::answer_commands(command_rx, true);

        wrapper.process_command("lock", "UNLOCK").await;
        assert_eq!(lock_state(&h.published()), Some("UNLOCKED"));

        tokio::time::sleep(Duration::from_secs(5)).await;
        let Some(BridgeEvent::PulseExpired { entity, generation, .. }) = h.events_rx.recv().await
        else {
            panic!("expected pulse expiry");
        };
        wrapper.pulse_expired(&entity, generation);
        assert_eq!(lock_state(&h.published()), Some("LOCKED"));
    }

    #[tokio::test(start_paused = true)]
    async fn lock_report_or_command_ends_unlock_pulse() {
        let mut h = Harness::new();
        let mut wrapper = lock_wrapper(&h);
        wrapper.publish_state(false);
        h.published();

        let command_rx = std::mem::replace(&mut h.command_rx, mpsc::channel(1).1);
        let _responder = Harness::answer_commands(command_rx, true);

        // The hub confirms the unlock: its value stands after the pulse.
        wrapper.process_command("lock", "UNLOCK").await;
        h.published();
        let report = json!({ "locked": "unlocked" }).as_object().cloned().unwrap();
        wrapper.update_data("l1", &report);
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(h.events_rx.try_recv().is_err());
        assert_eq!(lock_state(&h.published()), None, "still UNLOCKED, nothing new");
        assert_eq!(wrapper.info().data()["locked"], "unlocked");

        // LOCK during a second unlock window publishes the hub's value.
        let relocked = json!({ "locked": "locked" }).as_object().cloned().unwrap();
        wrapper.update_data("l1", &relocked);
        assert_eq!(lock_state(&h.published()), Some("LOCKED"));
        wrapper.process_command("lock", "UNLOCK").await;
        assert_eq!(lock_state(&h.published()), Some("UNLOCKED"));
        wrapper.process_command("lock", "LOCK").await;
        assert_eq!(lock_state(&h.published()), Some("LOCKED"));
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(h.events_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn beam_light_state_is_assigned() {
        let mut h = Harness::new();
        let info = DeviceInfo::new(hub_device(
            "b1",
            "switch.transformer.beams",
            json!({ "on": false }),
        ));
        let mut wrapper = DeviceWrapper::new(
            MappedDevice {
                info,
                kind: DeviceKind::Beam(Beam::from_type("switch.transformer.beams")),
            },
            h.ctx.clone(),
        );
        wrapper.publish_state(false);
        h.published();

        let command_rx = std::mem::replace(&mut h.command_rx, mpsc::channel(1).1);
        let _responder = Harness::answer_commands(command_rx, true);

        wrapper.process_command("light", "ON").await;
        assert_eq!(wrapper.info().data()["on"], true);
        wrapper.process_command("light", "OFF").await;
        assert_eq!(wrapper.info().data()["on"], false);
        wrapper.process_command("light", "OFF").await;
        assert_eq!(wrapper.info().data()["on"], false);

        let states: Vec<String> = h
            .published()
            .into_iter()
            .filter(|(t, _)| t.ends_with("/light_state"))
            .map(|(_, p)| p)
            .collect();
        assert_eq!(states, ["ON", "OFF"]);
    }
}

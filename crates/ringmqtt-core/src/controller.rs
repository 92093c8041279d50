// ── Publish/subscribe lifecycle controller ──
//
// Drives the bridge from `BridgeEvent`s: discovers devices on the first
// broker connection, publishes each location once it is reachable,
// republishes after broker reconnects and Home Assistant restarts, and
// routes vendor pushes and MQTT commands to the owning wrapper. Failed
// location or device listings are retried after a fixed delay.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};

use dashmap::{DashMap, DashSet};
use tokio::sync::{Mutex, mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::command::{CommandEnvelope, CommandSender, command_processor_task};
use crate::config::BridgeConfig;
use crate::device::{DeviceContext, DeviceWrapper};
use crate::error::CoreError;
use crate::event::{BridgeEvent, EventReceiver, EventSender};
use crate::mapper::{self, MapOutcome, MapperOptions};
use crate::model::{CameraEventKind, DeviceCategory, Location};
use crate::mqtt::MqttPublisher;
use crate::source::RingSource;
use crate::store::Registry;

// ── Republish gate ───────────────────────────────────────────────────

/// What a Home Assistant `online` message did to a location's gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateTrigger {
    /// No loop was running; the caller must start one.
    Start,
    /// A running loop had its remaining cycles refilled.
    Reset,
}

/// Counts the remaining cycles of a location's republish loop. `None`
/// means no loop is running.
#[derive(Debug)]
pub struct RepublishGate {
    cycles: u8,
    remaining: StdMutex<Option<u8>>,
}

impl RepublishGate {
    pub fn new(cycles: u8) -> Self {
        Self {
            cycles,
            remaining: StdMutex::new(None),
        }
    }

    pub fn trigger(&self) -> GateTrigger {
        let mut remaining = self.remaining.lock().unwrap_or_else(PoisonError::into_inner);
        let outcome = if remaining.is_some() {
            GateTrigger::Reset
        } else {
            GateTrigger::Start
        };
        *remaining = Some(self.cycles);
        outcome
    }

    /// Consume one cycle. Returns `false` and closes the gate once the
    /// counter reaches zero.
    pub fn next_cycle(&self) -> bool {
        let mut remaining = self.remaining.lock().unwrap_or_else(PoisonError::into_inner);
        match *remaining {
            Some(n) if n > 0 => {
                *remaining = Some(n - 1);
                true
            }
            _ => {
                *remaining = None;
                false
            }
        }
    }

    pub fn stop(&self) {
        *self.remaining.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }

    pub fn is_running(&self) -> bool {
        self.remaining
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

// ── Location state ───────────────────────────────────────────────────

struct LocationState {
    location: Location,
    /// The vendor device list was fetched and its devices registered.
    listed: AtomicBool,
    hub_connected: AtomicBool,
    /// Devices have been initialized on the broker at least once.
    published: AtomicBool,
    /// Devices were marked unavailable after a websocket outage.
    offline: AtomicBool,
    /// Bumped on every disconnect so stale grace checks do nothing.
    disconnects: AtomicU64,
    gate: RepublishGate,
    device_ids: StdMutex<Vec<String>>,
}

impl LocationState {
    fn new(location: Location, republish_count: u8) -> Self {
        Self {
            location,
            listed: AtomicBool::new(false),
            hub_connected: AtomicBool::new(false),
            published: AtomicBool::new(false),
            offline: AtomicBool::new(false),
            disconnects: AtomicU64::new(0),
            gate: RepublishGate::new(republish_count),
            device_ids: StdMutex::new(Vec::new()),
        }
    }

    /// Hub locations are reachable only while their websocket is up.
    fn is_reachable(&self) -> bool {
        !self.location.has_hubs || self.hub_connected.load(Ordering::SeqCst)
    }

    fn device_ids(&self) -> Vec<String> {
        self.device_ids
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// How a location publish task treats its devices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PublishMode {
    /// Discovery, state and command subscriptions.
    Initial,
    /// Discovery and forced state after a broker reconnect, with command
    /// subscriptions renewed.
    Resubscribe,
    /// Discovery and forced state only.
    Republish,
}

// ── Controller ───────────────────────────────────────────────────────

/// The bridge lifecycle. Cheaply cloneable via `Arc<ControllerInner>`.
#[derive(Clone)]
pub struct Controller {
    inner: Arc<ControllerInner>,
}

struct ControllerInner {
    config: BridgeConfig,
    source: Arc<dyn RingSource>,
    ctx: Arc<DeviceContext>,
    command_rx: StdMutex<Option<mpsc::Receiver<CommandEnvelope>>>,
    locations: Registry<LocationState>,
    devices: Registry<Mutex<DeviceWrapper>>,
    /// Command topic to `(device id, state suffix)`.
    routes: DashMap<String, (String, String)>,
    /// Child device id to the wrappers that fold its data in.
    owners: DashMap<String, Vec<String>>,
    /// Ids of bridged cameras, for the media supervisor.
    cameras: watch::Sender<Vec<String>>,
    /// Unsupported device types already logged.
    reported: DashSet<String>,
    /// The location list was fetched successfully.
    discovered: AtomicBool,
    retry_scheduled: AtomicBool,
    mqtt_connected: AtomicBool,
    cancel: CancellationToken,
}

impl Controller {
    pub fn new(
        config: BridgeConfig,
        source: Arc<dyn RingSource>,
        publisher: MqttPublisher,
        events: EventSender,
        cancel: CancellationToken,
    ) -> Self {
        let (commands, command_rx) = CommandSender::channel();
        let ctx = Arc::new(DeviceContext {
            publisher,
            commands,
            events,
            ring_topic: config.ring_topic.clone(),
            discovery_prefix: config.discovery_prefix.clone(),
            timings: config.timings.clone(),
            disarm_code: config.disarm_code.clone(),
        });

        Self {
            inner: Arc::new(ControllerInner {
                config,
                source,
                ctx,
                command_rx: StdMutex::new(Some(command_rx)),
                locations: Registry::new(),
                devices: Registry::new(),
                routes: DashMap::new(),
                owners: DashMap::new(),
                cameras: watch::channel(Vec::new()).0,
                reported: DashSet::new(),
                discovered: AtomicBool::new(false),
                retry_scheduled: AtomicBool::new(false),
                mqtt_connected: AtomicBool::new(false),
                cancel,
            }),
        }
    }

    pub fn device(&self, device_id: &str) -> Option<Arc<Mutex<DeviceWrapper>>> {
        self.inner.devices.get(device_id)
    }

    pub fn device_count(&self) -> usize {
        self.inner.devices.len()
    }

    pub fn location_ids(&self) -> Vec<String> {
        (*self.inner.locations.keys()).clone()
    }

    /// Camera ids, extended as locations are listed.
    pub fn subscribe_cameras(&self) -> watch::Receiver<Vec<String>> {
        self.inner.cameras.subscribe()
    }

    // ── Event loop ───────────────────────────────────────────────────

    /// Process bridge events until cancelled or every sender is gone.
    pub async fn run(&self, mut events: EventReceiver) {
        self.spawn_background_tasks();

        loop {
            tokio::select! {
                biased;
                () = self.inner.cancel.cancelled() => break,
                event = events.recv() => {
                    let Some(event) = event else { break };
                    self.handle_event(event).await;
                }
            }
        }
        debug!("controller event loop stopped");
    }

    fn spawn_background_tasks(&self) {
        let command_rx = self
            .inner
            .command_rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(rx) = command_rx {
            tokio::spawn(command_processor_task(
                Arc::clone(&self.inner.source),
                rx,
                self.inner.cancel.clone(),
            ));
        }
        tokio::spawn(token_watchdog_task(
            Arc::clone(&self.inner.source),
            self.inner.config.timings.token_watchdog_period,
            self.inner.cancel.clone(),
        ));
    }

    async fn handle_event(&self, event: BridgeEvent) {
        match event {
            BridgeEvent::MqttConnected => self.on_mqtt_connected().await,
            BridgeEvent::MqttDisconnected => {
                info!("mqtt disconnected");
                self.inner.mqtt_connected.store(false, Ordering::SeqCst);
            }
            BridgeEvent::MqttMessage { topic, payload } => self.on_mqtt_message(&topic, &payload),
            BridgeEvent::LocationConnection {
                location_id,
                connected,
            } => self.on_location_connection(&location_id, connected).await,
            BridgeEvent::DeviceData { device_id, data } => {
                for owner in self.owners_of(&device_id) {
                    if let Some(wrapper) = self.inner.devices.get(&owner) {
                        wrapper.lock().await.update_data(&device_id, &data);
                    }
                }
            }
            BridgeEvent::CameraEvent { device_id, kind } => self.on_camera_event(&device_id, &kind).await,
            BridgeEvent::PulseExpired {
                device_id,
                entity,
                generation,
            } => {
                if let Some(wrapper) = self.inner.devices.get(&device_id) {
                    wrapper.lock().await.pulse_expired(&entity, generation);
                }
            }
            BridgeEvent::DiscoveryRetry => {
                self.inner.retry_scheduled.store(false, Ordering::SeqCst);
                if self.inner.mqtt_connected.load(Ordering::SeqCst) {
                    self.refresh().await;
                } else {
                    debug!("broker offline, discovery retry waits for reconnect");
                }
            }
        }
    }

    /// The wrapper of the device itself, plus any parent exposing it.
    fn owners_of(&self, device_id: &str) -> Vec<String> {
        let mut owners = Vec::new();
        if self.inner.devices.contains(device_id) {
            owners.push(device_id.to_owned());
        }
        if let Some(parents) = self.inner.owners.get(device_id) {
            owners.extend(parents.iter().cloned());
        }
        owners
    }

    async fn on_camera_event(&self, device_id: &str, kind: &CameraEventKind) {
        match self.inner.devices.get(device_id) {
            Some(wrapper) => wrapper.lock().await.trigger_event(kind),
            None => debug!(device_id, %kind, "event for unknown device"),
        }
    }

    // ── MQTT ─────────────────────────────────────────────────────────

    async fn on_mqtt_connected(&self) {
        let was_connected = self.inner.mqtt_connected.swap(true, Ordering::SeqCst);
        if was_connected {
            return;
        }

        if self.inner.discovered.load(Ordering::SeqCst) {
            info!("mqtt reconnected, republishing devices");
            for state in self.inner.locations.values() {
                if state.published.load(Ordering::SeqCst) && state.is_reachable() {
                    self.spawn_publish(&state, PublishMode::Resubscribe);
                }
            }
        } else {
            info!("mqtt connected, discovering devices");
        }
        self.refresh().await;
    }

    /// Finish whatever discovery is outstanding, initialize every
    /// reachable location not yet published, and schedule a retry if
    /// some listing still failed.
    async fn refresh(&self) {
        if !self.inner.discovered.load(Ordering::SeqCst) {
            match self.discover().await {
                Ok(()) => self.inner.discovered.store(true, Ordering::SeqCst),
                Err(e) => warn!(error = %e, "device discovery failed"),
            }
        } else {
            for state in self.inner.locations.values() {
                if !state.listed.load(Ordering::SeqCst) {
                    self.list_devices(&state).await;
                }
            }
        }

        for state in self.inner.locations.values() {
            if state.is_reachable() {
                self.spawn_initial(&state);
            } else {
                debug!(location_id = %state.location.id, "waiting for hub connection");
            }
        }
        self.schedule_retry();
    }

    fn schedule_retry(&self) {
        let inner = &self.inner;
        let outstanding = !inner.discovered.load(Ordering::SeqCst)
            || inner
                .locations
                .values()
                .iter()
                .any(|state| !state.listed.load(Ordering::SeqCst));
        if !outstanding || inner.retry_scheduled.swap(true, Ordering::SeqCst) {
            return;
        }

        let delay = inner.config.timings.discovery_retry;
        info!(delay_secs = delay.as_secs(), "retrying discovery later");
        let events = inner.ctx.events.clone();
        let cancel = inner.cancel.clone();
        tokio::spawn(async move {
            tokio::select! {
                biased;
                () = cancel.cancelled() => {}
                () = tokio::time::sleep(delay) => {
                    let _ = events.send(BridgeEvent::DiscoveryRetry);
                }
            }
        });
    }

    fn on_mqtt_message(&self, topic: &str, payload: &str) {
        if topic == self.inner.config.hass_topic {
            self.on_hass_status(payload);
            return;
        }
        let Some(route) = self.inner.routes.get(topic) else {
            debug!(topic, "message on unrouted topic");
            return;
        };
        let (device_id, suffix) = route.value().clone();
        drop(route);

        let Some(wrapper) = self.inner.devices.get(&device_id) else {
            return;
        };
        let payload = payload.to_owned();
        tokio::spawn(async move {
            wrapper.lock().await.process_command(&suffix, &payload).await;
        });
    }

    fn on_hass_status(&self, payload: &str) {
        if payload.trim() != "online" {
            debug!(payload, "home assistant status");
            return;
        }
        for state in self.inner.locations.values() {
            if !state.published.load(Ordering::SeqCst) {
                continue;
            }
            match state.gate.trigger() {
                GateTrigger::Reset => {
                    debug!(location_id = %state.location.id, "republish counter reset");
                }
                GateTrigger::Start => {
                    info!(location_id = %state.location.id, "home assistant online, starting republish");
                    tokio::spawn(republish_loop(Arc::clone(&self.inner), state));
                }
            }
        }
    }

    // ── Hub connectivity ─────────────────────────────────────────────

    async fn on_location_connection(&self, location_id: &str, connected: bool) {
        let Some(state) = self.inner.locations.get(location_id) else {
            debug!(location_id, connected, "connection change for unknown location");
            return;
        };
        state.hub_connected.store(connected, Ordering::SeqCst);

        if !connected {
            let generation = state.disconnects.fetch_add(1, Ordering::SeqCst) + 1;
            info!(location_id, "hub disconnected, waiting before marking offline");
            tokio::spawn(grace_check(Arc::clone(&self.inner), state, generation));
            return;
        }

        if !state.listed.load(Ordering::SeqCst) {
            self.list_devices(&state).await;
        }
        if !self.inner.mqtt_connected.load(Ordering::SeqCst) {
            return;
        }
        if !state.published.load(Ordering::SeqCst) {
            self.spawn_initial(&state);
        } else if state.offline.swap(false, Ordering::SeqCst) {
            info!(location_id, "hub reconnected, republishing location");
            self.spawn_publish(&state, PublishMode::Republish);
        }
    }

    // ── Discovery ────────────────────────────────────────────────────

    /// Fetch the location list and every location's devices. Only the
    /// location list failing is an error; a location whose devices could
    /// not be listed is registered anyway and listed again later.
    async fn discover(&self) -> Result<(), CoreError> {
        let inner = &self.inner;
        for location in inner.source.locations().await? {
            let id = location.id.clone();
            let state = LocationState::new(location, inner.config.timings.republish_count);
            let Some(state) = inner.locations.insert_new(&id, state) else {
                continue;
            };
            self.list_devices(&state).await;
        }
        Ok(())
    }

    /// List a location's devices and register their wrappers. Returns
    /// `false` and leaves the location unlisted if the vendor call fails.
    async fn list_devices(&self, state: &LocationState) -> bool {
        let inner = &self.inner;
        let location = &state.location;
        let devices = match inner.source.devices(location).await {
            Ok(devices) => devices,
            Err(e) => {
                warn!(location_id = %location.id, error = %e, "failed to list devices");
                return false;
            }
        };

        let options = MapperOptions {
            enable_cameras: inner.config.enable_cameras,
            enable_modes: inner.config.enable_modes,
            enable_panic: inner.config.enable_panic,
        };
        let mut ids = Vec::new();
        let mut cameras = Vec::new();
        for device in &devices {
            let history = if matches!(
                device.category,
                DeviceCategory::Camera | DeviceCategory::Intercom
            ) {
                inner.source.recent_events(device).await.unwrap_or_else(|e| {
                    debug!(device_id = %device.id, error = %e, "no event history");
                    Vec::new()
                })
            } else {
                Vec::new()
            };

            match mapper::map(device, &devices, &history, &options) {
                MapOutcome::Mapped(mapped) => {
                    let wrapper = DeviceWrapper::new(mapped, Arc::clone(&inner.ctx));
                    if self.register(wrapper) {
                        if device.category == DeviceCategory::Camera {
                            cameras.push(device.id.clone());
                        }
                        ids.push(device.id.clone());
                    }
                }
                MapOutcome::Ignore => {
                    debug!(device_id = %device.id, device_type = %device.device_type, "ignoring device");
                }
                MapOutcome::Unsupported => {
                    if inner.reported.insert(device.device_type.clone()) {
                        info!(
                            device_type = %device.device_type,
                            name = %device.name,
                            "unsupported device type"
                        );
                    }
                }
            }
        }

        info!(
            location_id = %location.id,
            name = %location.name,
            devices = ids.len(),
            "location discovered"
        );
        state
            .device_ids
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(ids);
        state.listed.store(true, Ordering::SeqCst);
        if !cameras.is_empty() {
            inner.cameras.send_modify(|known| known.extend(cameras));
        }
        true
    }

    fn register(&self, wrapper: DeviceWrapper) -> bool {
        let id = wrapper.id().to_owned();
        let routes = wrapper.command_routes();
        let children = wrapper.child_ids();
        if self.inner.devices.insert_new(&id, Mutex::new(wrapper)).is_none() {
            debug!(device_id = %id, "device already registered");
            return false;
        }
        for (topic, suffix) in routes {
            self.inner.routes.insert(topic, (id.clone(), suffix));
        }
        for child in children {
            self.inner.owners.entry(child).or_default().push(id.clone());
        }
        true
    }

    fn spawn_initial(&self, state: &Arc<LocationState>) {
        if !state.listed.load(Ordering::SeqCst) {
            return;
        }
        if !state.published.swap(true, Ordering::SeqCst) {
            self.spawn_publish(state, PublishMode::Initial);
        }
    }

    fn spawn_publish(&self, state: &Arc<LocationState>, mode: PublishMode) {
        let inner = Arc::clone(&self.inner);
        let ids = state.device_ids();
        tokio::spawn(async move { publish_devices(&inner, &ids, mode).await });
    }

    // ── Shutdown ─────────────────────────────────────────────────────

    /// Mark every device unavailable. Publishes are queued on the broker
    /// handle, so the MQTT transport must be stopped after this returns.
    pub async fn shutdown(&self) {
        info!(devices = self.inner.devices.len(), "marking devices offline");
        for state in self.inner.locations.values() {
            state.gate.stop();
        }
        for wrapper in self.inner.devices.values() {
            wrapper.lock().await.go_offline();
        }
    }
}

// ── Background tasks ─────────────────────────────────────────────────

async fn publish_devices(inner: &ControllerInner, ids: &[String], mode: PublishMode) {
    for id in ids {
        let Some(wrapper) = inner.devices.get(id) else { continue };
        let mut wrapper = wrapper.lock().await;
        match mode {
            PublishMode::Initial => wrapper.initialize().await,
            PublishMode::Resubscribe => {
                wrapper.republish().await;
                wrapper.subscribe_commands();
            }
            PublishMode::Republish => {
                wrapper.set_online();
                wrapper.republish().await;
            }
        }
    }
}

async fn republish_loop(inner: Arc<ControllerInner>, state: Arc<LocationState>) {
    let timings = &inner.config.timings;
    tokio::select! {
        biased;
        () = inner.cancel.cancelled() => return,
        () = tokio::time::sleep(timings.hass_online_delay) => {}
    }

    loop {
        if !inner.mqtt_connected.load(Ordering::SeqCst) {
            state.gate.stop();
            break;
        }
        if !state.gate.next_cycle() {
            break;
        }
        if state.is_reachable() {
            debug!(location_id = %state.location.id, "republish cycle");
            publish_devices(&inner, &state.device_ids(), PublishMode::Republish).await;
        }
        tokio::select! {
            biased;
            () = inner.cancel.cancelled() => break,
            () = tokio::time::sleep(timings.republish_interval) => {}
        }
    }
    debug!(location_id = %state.location.id, "republish loop finished");
}

async fn grace_check(inner: Arc<ControllerInner>, state: Arc<LocationState>, generation: u64) {
    tokio::select! {
        biased;
        () = inner.cancel.cancelled() => return,
        () = tokio::time::sleep(inner.config.timings.websocket_grace) => {}
    }
    if state.hub_connected.load(Ordering::SeqCst)
        || state.disconnects.load(Ordering::SeqCst) != generation
    {
        return;
    }

    warn!(location_id = %state.location.id, "hub still disconnected, marking devices offline");
    state.offline.store(true, Ordering::SeqCst);
    for id in state.device_ids() {
        let Some(wrapper) = inner.devices.get(&id) else { continue };
        let mut wrapper = wrapper.lock().await;
        if !wrapper.is_camera() {
            wrapper.go_offline();
        }
    }
}

async fn token_watchdog_task(
    source: Arc<dyn RingSource>,
    period: std::time::Duration,
    cancel: CancellationToken,
) {
    let mut interval = tokio::time::interval(period);
    interval.tick().await;

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = interval.tick() => {
                if source.restore_token().await {
                    info!("restored last known good refresh token");
                }
            }
        }
    }
}

// ── Vendor session manager ──
//
// Owns the authenticated `RingClient`, the persisted state file and one
// hub websocket per alarm/lighting location. Vendor pushes and polled
// changes leave the session as `BridgeEvent`s; writes arrive through the
// `RingSource` trait.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use arc_swap::ArcSwap;
use async_trait::async_trait;
use dashmap::DashMap;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Map, Value, json};
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use ringmqtt_api::{
    Endpoints, HubConnection, HubEvent, ReconnectConfig, RingClient, RingDevicesResponse,
    TransportConfig,
};

use crate::command::VendorCommand;
use crate::config::SessionConfig;
use crate::convert::{device_from_hub, history_event, location_from_raw, rest_devices};
use crate::error::CoreError;
use crate::event::{BridgeEvent, EventSender};
use crate::model::{CameraEventKind, DeviceCategory, HistoryEvent, Location, VendorDevice};
use crate::source::RingSource;
use crate::store::{PersistedState, StateStore};

const HISTORY_LIMIT: u32 = 5;
/// Extra device lists (one per hub asset) arrive shortly after the first.
const HUB_LIST_SETTLE: Duration = Duration::from_secs(1);

pub struct RingSession {
    client: RingClient,
    config: SessionConfig,
    store: StateStore,
    state: Mutex<PersistedState>,
    last_good_token: ArcSwap<String>,
    events: EventSender,
    cancel: CancellationToken,
    hubs: DashMap<String, Arc<HubConnection>>,
    /// Last `ring_devices` response, reused by `devices()`.
    rest_snapshot: tokio::sync::Mutex<Option<RingDevicesResponse>>,
    locations: Mutex<Vec<Location>>,
}

/// Pick the refresh token: a previously rotated one from the state file
/// wins over the configured seed.
fn resolve_token(state: &PersistedState, configured: Option<&SecretString>) -> Option<String> {
    Some(state.ring_token.clone())
        .filter(|t| !t.is_empty())
        .or_else(|| configured.map(|t| t.expose_secret().to_owned()))
        .filter(|t| !t.is_empty())
}

impl RingSession {
    /// Load state, build the client and start persisting token rotations.
    pub fn start(
        config: SessionConfig,
        endpoints: Endpoints,
        events: EventSender,
        cancel: CancellationToken,
    ) -> Result<Arc<Self>, CoreError> {
        let store = StateStore::new(&config.state_file);
        let mut state = store.load_or_default();
        state.ensure_system_id();

        let token = resolve_token(&state, config.refresh_token.as_ref()).ok_or_else(|| {
            CoreError::AuthenticationFailed {
                message: "no refresh token configured; run `ringmqtt token <TOKEN>`".into(),
            }
        })?;
        state.ring_token.clone_from(&token);
        store.save(&state)?;

        let transport = TransportConfig::new(state.system_id.clone());
        let client = RingClient::new(
            token.clone(),
            config.control_center_name.clone(),
            endpoints,
            &transport,
        )?;
        info!(
            state_file = %store.path().display(),
            system_id = %state.system_id,
            "ring session ready"
        );

        let session = Arc::new(Self {
            client,
            config,
            store,
            state: Mutex::new(state),
            last_good_token: ArcSwap::from_pointee(token),
            events,
            cancel,
            hubs: DashMap::new(),
            rest_snapshot: tokio::sync::Mutex::new(None),
            locations: Mutex::new(Vec::new()),
        });

        let rotations = session.client.subscribe_refresh_token();
        tokio::spawn(Arc::clone(&session).persist_rotations(rotations));
        Ok(session)
    }

    pub fn client(&self) -> &RingClient {
        &self.client
    }

    /// Start the ding and device-health pollers.
    pub fn spawn_pollers(self: &Arc<Self>) {
        tokio::spawn(Arc::clone(self).ding_poll_task());
        tokio::spawn(Arc::clone(self).health_poll_task());
    }

    /// Close every hub websocket.
    pub fn shutdown(&self) {
        for hub in &self.hubs {
            hub.value().shutdown();
        }
    }

    // ── Token persistence ────────────────────────────────────────────

    async fn persist_rotations(self: Arc<Self>, mut rotations: watch::Receiver<String>) {
        loop {
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => break,
                changed = rotations.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let token = rotations.borrow_and_update().clone();
                    if token.is_empty() {
                        warn!("refresh token was rejected, keeping last known good token");
                        continue;
                    }
                    self.last_good_token.store(Arc::new(token.clone()));
                    self.persist_token(token);
                }
            }
        }
    }

    fn persist_token(&self, token: String) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.ring_token == token {
            return;
        }
        state.ring_token = token;
        match self.store.save(&state) {
            Ok(()) => debug!("refresh token rotated and saved"),
            Err(e) => warn!(error = %e, "failed to save rotated refresh token"),
        }
    }

    // ── Hub websockets ───────────────────────────────────────────────

    fn hub_connection(&self, location_id: &str) -> Arc<HubConnection> {
        let entry = self.hubs.entry(location_id.to_owned()).or_insert_with(|| {
            let hub = Arc::new(HubConnection::connect(
                self.client.clone(),
                location_id.to_owned(),
                ReconnectConfig::default(),
                self.cancel.child_token(),
            ));
            tokio::spawn(forward_hub_events(
                location_id.to_owned(),
                hub.subscribe(),
                hub.connection(),
                self.events.clone(),
                self.cancel.clone(),
            ));
            hub
        });
        Arc::clone(entry.value())
    }

    fn hub(&self, location_id: &str) -> Result<Arc<HubConnection>, CoreError> {
        self.hubs
            .get(location_id)
            .map(|h| Arc::clone(h.value()))
            .ok_or_else(|| CoreError::HubDisconnected {
                location_id: location_id.to_owned(),
            })
    }

    async fn hub_devices(&self, location: &Location) -> Result<Vec<VendorDevice>, CoreError> {
        let hub = self.hub_connection(&location.id);
        let mut rx = hub.subscribe();
        let timeout = self.config.hub_list_timeout;

        let first = tokio::time::timeout(timeout, next_device_list(&mut rx))
            .await
            .map_err(|_| CoreError::Timeout {
                what: format!("device list of location {}", location.id),
                timeout_secs: timeout.as_secs(),
            })??;

        let mut devices: Vec<VendorDevice> = first
            .iter()
            .map(|raw| device_from_hub(&location.id, raw))
            .collect();
        while let Ok(Ok(more)) = tokio::time::timeout(HUB_LIST_SETTLE, next_device_list(&mut rx)).await {
            devices.extend(more.iter().map(|raw| device_from_hub(&location.id, raw)));
        }
        debug!(location_id = %location.id, count = devices.len(), "hub device list received");
        Ok(devices)
    }

    // ── Location modes ───────────────────────────────────────────────

    async fn mode_device(&self, location: &Location) -> VendorDevice {
        let mode = match self.client.location_mode(&location.id).await {
            Ok(mode) => mode,
            Err(e) => {
                warn!(location_id = %location.id, error = %e, "failed to read location mode");
                "disarmed".into()
            }
        };
        VendorDevice {
            id: location.id.clone(),
            location_id: location.id.clone(),
            category: DeviceCategory::Hub,
            device_type: "location.mode".into(),
            name: format!("{} Mode", location.name),
            parent_id: None,
            category_id: None,
            data: mode_data(&mode),
        }
    }

    // ── Pollers ──────────────────────────────────────────────────────

    async fn ding_poll_task(self: Arc<Self>) {
        let mut interval = tokio::time::interval(self.config.camera_poll_interval);
        interval.tick().await;
        let mut seen: HashSet<u64> = HashSet::new();

        loop {
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => break,
                _ = interval.tick() => {
                    match self.client.active_dings().await {
                        Ok(dings) => {
                            let current: HashSet<u64> = dings.iter().map(|d| d.id).collect();
                            for ding in dings.iter().filter(|d| !seen.contains(&d.id)) {
                                let kind = CameraEventKind::from(ding.kind.as_str());
                                debug!(device_id = ding.doorbot_id, %kind, "camera event");
                                let _ = self.events.send(BridgeEvent::CameraEvent {
                                    device_id: ding.doorbot_id.to_string(),
                                    kind,
                                });
                            }
                            seen = current;
                        }
                        Err(e) => warn!(error = %e, "active dings poll failed"),
                    }
                }
            }
        }
    }

    async fn health_poll_task(self: Arc<Self>) {
        let mut interval = tokio::time::interval(self.config.location_poll_interval);
        interval.tick().await;

        loop {
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => break,
                _ = interval.tick() => self.poll_health().await,
            }
        }
    }

    async fn poll_health(&self) {
        let locations = self
            .locations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        match self.client.ring_devices().await {
            Ok(resp) => {
                for location in &locations {
                    for device in rest_devices(&resp, &location.id) {
                        let _ = self.events.send(BridgeEvent::DeviceData {
                            device_id: device.id,
                            data: device.data,
                        });
                    }
                }
                *self.rest_snapshot.lock().await = Some(resp);
            }
            Err(e) => warn!(error = %e, "device health poll failed"),
        }

        if !self.config.enable_modes {
            return;
        }
        for location in locations.iter().filter(|l| !l.has_hubs) {
            match self.client.location_mode(&location.id).await {
                Ok(mode) => {
                    let _ = self.events.send(BridgeEvent::DeviceData {
                        device_id: location.id.clone(),
                        data: mode_data(&mode),
                    });
                }
                Err(e) => warn!(location_id = %location.id, error = %e, "location mode poll failed"),
            }
        }
    }
}

fn mode_data(mode: &str) -> Map<String, Value> {
    let mut data = Map::new();
    data.insert("mode".into(), json!(mode));
    data
}

fn rest_id(device_id: &str) -> Result<u64, CoreError> {
    device_id
        .parse()
        .map_err(|_| CoreError::invalid(format!("not a REST device id: {device_id}")))
}

async fn next_device_list(
    rx: &mut broadcast::Receiver<Arc<HubEvent>>,
) -> Result<Vec<ringmqtt_api::HubDevice>, CoreError> {
    loop {
        match rx.recv().await {
            Ok(event) => {
                if let HubEvent::DeviceList(devices) = &*event {
                    return Ok(devices.clone());
                }
            }
            Err(broadcast::error::RecvError::Lagged(_)) => {}
            Err(broadcast::error::RecvError::Closed) => {
                return Err(CoreError::SessionUnavailable {
                    reason: "hub connection closed".into(),
                });
            }
        }
    }
}

/// Relay a hub's data pushes and connectivity to the controller.
async fn forward_hub_events(
    location_id: String,
    mut rx: broadcast::Receiver<Arc<HubEvent>>,
    mut connection: watch::Receiver<bool>,
    events: EventSender,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            changed = connection.changed() => {
                if changed.is_err() {
                    break;
                }
                let connected = *connection.borrow_and_update();
                info!(location_id = %location_id, connected, "hub connection changed");
                if events
                    .send(BridgeEvent::LocationConnection { location_id: location_id.clone(), connected })
                    .is_err()
                {
                    break;
                }
            }
            event = rx.recv() => match event {
                Ok(event) => {
                    for device in event.devices() {
                        let _ = events.send(BridgeEvent::DeviceData {
                            device_id: device.zid.clone(),
                            data: device.fields.clone(),
                        });
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(location_id = %location_id, skipped = n, "hub event stream lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }
}

// ── RingSource ───────────────────────────────────────────────────────

#[async_trait]
impl RingSource for RingSession {
    async fn locations(&self) -> Result<Vec<Location>, CoreError> {
        let (raw, devices) = tokio::try_join!(self.client.locations(), self.client.ring_devices())?;
        let filter = &self.config.location_ids;

        let locations: Vec<Location> = raw
            .iter()
            .filter(|l| filter.is_empty() || filter.contains(&l.location_id))
            .map(|l| location_from_raw(l, devices.location_has_hubs(&l.location_id)))
            .collect();
        for id in filter {
            if !locations.iter().any(|l| &l.id == id) {
                warn!(location_id = %id, "configured location not found on account");
            }
        }

        *self.rest_snapshot.lock().await = Some(devices);
        self.locations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone_from(&locations);
        Ok(locations)
    }

    async fn devices(&self, location: &Location) -> Result<Vec<VendorDevice>, CoreError> {
        let cached = self.rest_snapshot.lock().await.clone();
        let snapshot = match cached {
            Some(resp) => resp,
            None => self.client.ring_devices().await?,
        };
        let mut devices = rest_devices(&snapshot, &location.id);

        if location.has_hubs {
            devices.extend(self.hub_devices(location).await?);
        } else if self.config.enable_modes {
            devices.push(self.mode_device(location).await);
        }
        Ok(devices)
    }

    async fn recent_events(&self, device: &VendorDevice) -> Result<Vec<HistoryEvent>, CoreError> {
        if !matches!(device.category, DeviceCategory::Camera | DeviceCategory::Intercom) {
            return Ok(Vec::new());
        }
        let history = self
            .client
            .camera_history(rest_id(&device.id)?, HISTORY_LIMIT)
            .await?;
        Ok(history.iter().map(|raw| history_event(&device.id, raw)).collect())
    }

    async fn execute(&self, command: VendorCommand) -> Result<(), CoreError> {
        match command {
            VendorCommand::SetHubDeviceInfo {
                location_id,
                device_id,
                fields,
            } => self.hub(&location_id)?.set_device_info(&device_id, fields)?,
            VendorCommand::SendHubCommand {
                location_id,
                device_id,
                command_type,
                data,
            } => self
                .hub(&location_id)?
                .send_command(&device_id, &command_type, data)?,
            VendorCommand::SetCameraLight { device_id, on } => {
                self.client.set_camera_light(rest_id(&device_id)?, on).await?;
            }
            VendorCommand::SetCameraSiren { device_id, on } => {
                self.client.set_camera_siren(rest_id(&device_id)?, on).await?;
            }
            VendorCommand::SetChimeVolume { device_id, volume } => {
                self.client.set_chime_volume(rest_id(&device_id)?, volume).await?;
            }
            VendorCommand::SnoozeChime { device_id, minutes } => {
                self.client.snooze_chime(rest_id(&device_id)?, minutes).await?;
            }
            VendorCommand::ClearChimeSnooze { device_id } => {
                self.client.clear_chime_snooze(rest_id(&device_id)?).await?;
            }
            VendorCommand::PlayChimeSound { device_id, sound } => {
                self.client.play_chime_sound(rest_id(&device_id)?, sound).await?;
            }
            VendorCommand::UnlockIntercom { device_id } => {
                self.client.unlock_intercom(rest_id(&device_id)?).await?;
            }
            VendorCommand::SetLocationMode { location_id, mode } => {
                self.client
                    .set_location_mode(&location_id, mode.as_ref())
                    .await?;
            }
        }
        Ok(())
    }

    async fn restore_token(&self) -> bool {
        if !self.client.refresh_token().is_empty() {
            return false;
        }
        let last = self.last_good_token.load_full();
        if last.is_empty() {
            return false;
        }
        warn!("live refresh token is empty, restoring last known good token");
        self.client.set_refresh_token((*last).clone());
        self.client.clear_auth_cache().await;
        true
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn state_file_token_wins_over_config() {
        let configured = SecretString::from("seed");
        let mut state = PersistedState::default();
        assert_eq!(resolve_token(&state, Some(&configured)).as_deref(), Some("seed"));

        state.ring_token = "rotated".into();
        assert_eq!(resolve_token(&state, Some(&configured)).as_deref(), Some("rotated"));

        assert_eq!(resolve_token(&PersistedState::default(), None), None);
        let empty = SecretString::from("");
        assert_eq!(resolve_token(&PersistedState::default(), Some(&empty)), None);
    }

    #[test]
    fn rest_ids_must_be_numeric() {
        assert_eq!(rest_id("12345").unwrap(), 12345);
        assert!(rest_id("zid-abc").is_err());
    }

    fn start_in(dir: &std::path::Path) -> Arc<RingSession> {
        let config = SessionConfig {
            refresh_token: Some(SecretString::from("seed")),
            state_file: dir.join("state.json"),
            ..SessionConfig::default()
        };
        let (events, _events_rx) = crate::event::channel();
        RingSession::start(config, Endpoints::default(), events, CancellationToken::new()).unwrap()
    }

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn start_without_token_is_an_auth_error() {
        let dir = tempfile::tempdir().unwrap();
        let config = SessionConfig {
            state_file: dir.path().join("state.json"),
            ..SessionConfig::default()
        };
        let (events, _events_rx) = crate::event::channel();
        let err = RingSession::start(config, Endpoints::default(), events, CancellationToken::new())
            .err()
            .unwrap();
        assert!(matches!(err, CoreError::AuthenticationFailed { .. }));
    }

    #[tokio::test]
    async fn start_seeds_state_file() {
        let dir = tempfile::tempdir().unwrap();
        let _session = start_in(dir.path());

        let state = StateStore::new(dir.path().join("state.json")).load().unwrap();
        assert_eq!(state.ring_token, "seed");
        assert!(!state.system_id.is_empty());
    }

    #[tokio::test]
    async fn rotated_tokens_are_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let session = start_in(dir.path());

        session.client().set_refresh_token("rotated".into());
        settle().await;

        let state = StateStore::new(dir.path().join("state.json")).load().unwrap();
        assert_eq!(state.ring_token, "rotated");
    }

    #[tokio::test]
    async fn rotation_keeps_device_settings() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("state.json"),
            r#"{"ring_token":"old","systemId":"sys-1","devices":{"zw-1":{"chirp":"none"}}}"#,
        )
        .unwrap();
        let session = start_in(dir.path());

        session.client().set_refresh_token("rotated".into());
        settle().await;

        let state = StateStore::new(dir.path().join("state.json")).load().unwrap();
        assert_eq!(state.ring_token, "rotated");
        assert_eq!(state.system_id, "sys-1");
        assert_eq!(state.devices["zw-1"]["chirp"], "none");
    }

    #[tokio::test]
    async fn watchdog_restores_last_good_token() {
        let dir = tempfile::tempdir().unwrap();
        let session = start_in(dir.path());
        assert!(!session.restore_token().await, "live token present");

        session.client().set_refresh_token(String::new());
        settle().await;
        assert!(session.restore_token().await);
        assert_eq!(session.client().refresh_token(), "seed");

        let state = StateStore::new(dir.path().join("state.json")).load().unwrap();
        assert_eq!(state.ring_token, "seed", "empty token never persisted");
    }
}

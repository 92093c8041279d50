// Ring REST client
//
// Wraps `reqwest::Client` with bearer-token management: access tokens are
// minted from the refresh token on demand, cached until expiry, and the
// rotated refresh token is broadcast through a `watch` channel so the
// session layer can persist it.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use reqwest::Method;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tokio::sync::{Mutex, watch};
use tracing::{debug, info, warn};
use url::Url;

use crate::auth::{self, AccessToken};
use crate::error::Error;
use crate::models::{
    HubTicket, LocationsResponse, RawActiveDing, RawHistoryEvent, RawLocation, RingDevicesResponse,
};
use crate::transport::TransportConfig;

// ── Endpoints ────────────────────────────────────────────────────────

/// Base URLs of the three Ring API hosts.
#[derive(Debug, Clone)]
pub struct Endpoints {
    pub oauth: Url,
    pub api: Url,
    pub app: Url,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            oauth: Url::parse("https://oauth.ring.com/").expect("static URL"),
            api: Url::parse("https://api.ring.com/").expect("static URL"),
            app: Url::parse("https://app.ring.com/").expect("static URL"),
        }
    }
}

impl Endpoints {
    /// Route every host to the same base URL (mock servers, proxies).
    pub fn single(base: &Url) -> Self {
        Self {
            oauth: base.clone(),
            api: base.clone(),
            app: base.clone(),
        }
    }
}

/// Chime sounds that can be played on demand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChimeSound {
    Ding,
    Motion,
}

impl ChimeSound {
    fn as_str(self) -> &'static str {
        match self {
            Self::Ding => "ding",
            Self::Motion => "motion",
        }
    }
}

// ── RingClient ───────────────────────────────────────────────────────

/// Async client for the Ring cloud API.
///
/// Cheaply cloneable; all clones share the token cache and the refresh
/// token channel.
#[derive(Clone)]
pub struct RingClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    http: reqwest::Client,
    endpoints: Endpoints,
    hardware_id: String,
    control_center_name: String,
    refresh_token: watch::Sender<String>,
    access: Mutex<Option<AccessToken>>,
    session_ready: AtomicBool,
}

impl RingClient {
    /// Create a client from a refresh token.
    ///
    /// No request is made until the first API call.
    pub fn new(
        refresh_token: String,
        control_center_name: impl Into<String>,
        endpoints: Endpoints,
        transport: &TransportConfig,
    ) -> Result<Self, Error> {
        let http = transport.build_client()?;
        let (refresh_tx, _) = watch::channel(refresh_token);
        Ok(Self {
            inner: Arc::new(ClientInner {
                http,
                endpoints,
                hardware_id: transport.hardware_id.clone(),
                control_center_name: control_center_name.into(),
                refresh_token: refresh_tx,
                access: Mutex::new(None),
                session_ready: AtomicBool::new(false),
            }),
        })
    }

    // ── Token management ─────────────────────────────────────────────

    /// The live refresh token. Empty after the OAuth endpoint rejected it.
    pub fn refresh_token(&self) -> String {
        self.inner.refresh_token.borrow().clone()
    }

    /// Watch refresh-token rotations.
    pub fn subscribe_refresh_token(&self) -> watch::Receiver<String> {
        self.inner.refresh_token.subscribe()
    }

    /// Replace the live refresh token.
    pub fn set_refresh_token(&self, token: String) {
        self.inner.refresh_token.send_replace(token);
    }

    /// Drop the cached access token so the next call re-authenticates.
    pub async fn clear_auth_cache(&self) {
        *self.inner.access.lock().await = None;
        self.inner.session_ready.store(false, Ordering::SeqCst);
    }

    async fn access_token(&self) -> Result<SecretString, Error> {
        let mut guard = self.inner.access.lock().await;
        if let Some(cached) = guard.as_ref().filter(|t| !t.is_expired()) {
            return Ok(cached.token.clone());
        }

        let refresh = self.refresh_token();
        if refresh.is_empty() {
            return Err(Error::MissingToken);
        }

        let grant = match auth::exchange_refresh_token(
            &self.inner.http,
            &self.inner.endpoints.oauth,
            &SecretString::from(refresh),
        )
        .await
        {
            Ok(grant) => grant,
            Err(e @ Error::Authentication { .. }) => {
                warn!(error = %e, "refresh token rejected");
                self.inner.refresh_token.send_replace(String::new());
                return Err(e);
            }
            Err(e) => return Err(e),
        };

        debug!("access token refreshed");
        self.inner.refresh_token.send_replace(grant.refresh_token);
        let token = grant.access.token.clone();
        *guard = Some(grant.access);
        drop(guard);

        if !self.inner.session_ready.load(Ordering::SeqCst) {
            self.create_session(&token).await?;
        }
        Ok(token)
    }

    /// Register this client as a "control center" device on the account.
    async fn create_session(&self, token: &SecretString) -> Result<(), Error> {
        let url = self.inner.endpoints.api.join("clients_api/session")?;
        let body = json!({
            "device": {
                "hardware_id": self.inner.hardware_id,
                "metadata": {
                    "api_version": 11,
                    "device_model": self.inner.control_center_name,
                },
                "os": "android",
            }
        });

        let resp = self
            .inner
            .http
            .post(url)
            .bearer_auth(token.expose_secret())
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(Error::RateLimited {
                retry_after_secs: 60,
            });
        }
        if !status.is_success() {
            return Err(Error::Api {
                status: status.as_u16(),
                message: "session creation failed".into(),
            });
        }

        info!(name = %self.inner.control_center_name, "ring session established");
        self.inner.session_ready.store(true, Ordering::SeqCst);
        Ok(())
    }

    // ── Request helpers ──────────────────────────────────────────────

    async fn send(&self, method: Method, url: Url, body: Option<&Value>) -> Result<String, Error> {
        for attempt in 0..2 {
            let token = self.access_token().await?;
            debug!("{} {}", method, url);

            let mut request = self
                .inner
                .http
                .request(method.clone(), url.clone())
                .bearer_auth(token.expose_secret());
            if let Some(body) = body {
                request = request.json(body);
            }
            let resp = request.send().await?;
            let status = resp.status();

            if status == reqwest::StatusCode::UNAUTHORIZED && attempt == 0 {
                debug!("access token rejected, refreshing");
                self.clear_auth_cache().await;
                continue;
            }
            if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                return Err(Error::RateLimited {
                    retry_after_secs: 60,
                });
            }

            let text = resp.text().await?;
            if !status.is_success() {
                return Err(Error::Api {
                    status: status.as_u16(),
                    message: text.chars().take(200).collect(),
                });
            }
            return Ok(text);
        }

        Err(Error::Authentication {
            message: "request rejected after token refresh".into(),
        })
    }

    async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        url: Url,
        body: Option<&Value>,
    ) -> Result<T, Error> {
        let text = self.send(method, url, body).await?;
        serde_json::from_str(&text).map_err(|e| {
            let preview: String = text.chars().take(200).collect();
            Error::Deserialization {
                message: format!("{e} (body preview: {preview:?})"),
                body: text.clone(),
            }
        })
    }

    fn api_url(&self, path: &str) -> Result<Url, Error> {
        Ok(self.inner.endpoints.api.join(path)?)
    }

    fn app_url(&self, path: &str) -> Result<Url, Error> {
        Ok(self.inner.endpoints.app.join(path)?)
    }

    // ── Discovery ────────────────────────────────────────────────────

    /// List the account's locations.
    pub async fn locations(&self) -> Result<Vec<RawLocation>, Error> {
        let url = self.app_url("rhq/v1/devices/v1/locations")?;
        let resp: LocationsResponse = self.request(Method::GET, url, None).await?;
        Ok(resp.user_locations)
    }

    /// List cameras, chimes, intercoms and hubs.
    pub async fn ring_devices(&self) -> Result<RingDevicesResponse, Error> {
        let url = self.api_url("clients_api/ring_devices")?;
        self.request(Method::GET, url, None).await
    }

    /// Ticket for opening the hub websocket of a location.
    pub async fn hub_ticket(&self, location_id: &str) -> Result<HubTicket, Error> {
        let mut url = self.app_url("api/v1/clap/tickets")?;
        url.query_pairs_mut().append_pair("locationID", location_id);
        self.request(Method::GET, url, None).await
    }

    // ── Events ───────────────────────────────────────────────────────

    /// Recent events for a camera or intercom, newest first.
    pub async fn camera_history(
        &self,
        device_id: u64,
        limit: u32,
    ) -> Result<Vec<RawHistoryEvent>, Error> {
        let mut url = self.api_url(&format!("clients_api/doorbots/{device_id}/history"))?;
        url.query_pairs_mut().append_pair("limit", &limit.to_string());
        self.request(Method::GET, url, None).await
    }

    /// Dings and motions currently in progress across the account.
    pub async fn active_dings(&self) -> Result<Vec<RawActiveDing>, Error> {
        let url = self.api_url("clients_api/dings/active")?;
        self.request(Method::GET, url, None).await
    }

    // ── Camera commands ──────────────────────────────────────────────

    pub async fn set_camera_light(&self, device_id: u64, on: bool) -> Result<(), Error> {
        let state = if on { "on" } else { "off" };
        let url = self.api_url(&format!(
            "clients_api/doorbots/{device_id}/floodlight_light_{state}"
        ))?;
        self.send(Method::PUT, url, None).await.map(drop)
    }

    pub async fn set_camera_siren(&self, device_id: u64, on: bool) -> Result<(), Error> {
        let state = if on { "on" } else { "off" };
        let url = self.api_url(&format!("clients_api/doorbots/{device_id}/siren_{state}"))?;
        self.send(Method::PUT, url, None).await.map(drop)
    }

    // ── Chime commands ───────────────────────────────────────────────

    pub async fn set_chime_volume(&self, device_id: u64, volume: u8) -> Result<(), Error> {
        let url = self.api_url(&format!("clients_api/chimes/{device_id}"))?;
        let body = json!({ "chime": { "settings": { "volume": volume } } });
        self.send(Method::PUT, url, Some(&body)).await.map(drop)
    }

    pub async fn snooze_chime(&self, device_id: u64, minutes: u32) -> Result<(), Error> {
        let url = self.api_url(&format!("clients_api/chimes/{device_id}/do_not_disturb"))?;
        let body = json!({ "time": minutes });
        self.send(Method::POST, url, Some(&body)).await.map(drop)
    }

    pub async fn clear_chime_snooze(&self, device_id: u64) -> Result<(), Error> {
        let url = self.api_url(&format!("clients_api/chimes/{device_id}/do_not_disturb"))?;
        self.send(Method::POST, url, None).await.map(drop)
    }

    pub async fn play_chime_sound(&self, device_id: u64, sound: ChimeSound) -> Result<(), Error> {
        let url = self.api_url(&format!("clients_api/chimes/{device_id}/play_sound"))?;
        let body = json!({ "kind": sound.as_str() });
        self.send(Method::POST, url, Some(&body)).await.map(drop)
    }

    // ── Intercom commands ────────────────────────────────────────────

    pub async fn unlock_intercom(&self, device_id: u64) -> Result<(), Error> {
        let url = self.api_url(&format!("commands/v1/devices/{device_id}/device_rpc"))?;
        let body = json!({
            "command_name": "device_rpc",
            "request": {
                "jsonrpc": "2.0",
                "method": "unlock_door",
                "params": { "door_id": 0, "user_id": 0 },
            }
        });
        self.send(Method::PUT, url, Some(&body)).await.map(drop)
    }

    // ── Location mode ────────────────────────────────────────────────

    /// Current location mode (`disarmed`, `home`, `away`).
    pub async fn location_mode(&self, location_id: &str) -> Result<String, Error> {
        let url = self.app_url(&format!("api/v1/mode/location/{location_id}"))?;
        let value: Value = self.request(Method::GET, url, None).await?;
        Ok(value["mode"].as_str().unwrap_or("disarmed").to_owned())
    }

    pub async fn set_location_mode(&self, location_id: &str, mode: &str) -> Result<(), Error> {
        let url = self.app_url(&format!("api/v1/mode/location/{location_id}"))?;
        let body = json!({ "mode": mode });
        self.send(Method::POST, url, Some(&body)).await.map(drop)
    }
}

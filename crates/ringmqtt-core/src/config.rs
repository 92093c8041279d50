// ── Runtime bridge configuration ──
//
// These types describe how the bridge behaves and where it connects.
// They carry secrets and tuning, but never touch disk. The binary builds
// them from `ringmqtt-config` and hands them in.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;
use url::Url;

/// Lifecycle timings. Defaults match what Home Assistant tolerates well.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timings {
    /// Pause between a discovery payload and the first state publish.
    pub settle_delay: Duration,
    /// How long a hub websocket may stay down before devices go offline.
    pub websocket_grace: Duration,
    /// Period of the republish loop.
    pub republish_interval: Duration,
    /// Number of cycles a republish loop runs before stopping.
    pub republish_count: u8,
    /// Delay between a Home Assistant `online` message and the first cycle.
    pub hass_online_delay: Duration,
    /// Period of the refresh-token watchdog.
    pub token_watchdog_period: Duration,
    /// Wait before retrying a failed location or device listing.
    pub discovery_retry: Duration,
    /// How long ding and motion sensors stay ON.
    pub ding_duration: Duration,
    /// How long a lock or intercom reports UNLOCKED after an unlock.
    pub unlock_duration: Duration,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            settle_delay: Duration::from_secs(2),
            websocket_grace: Duration::from_secs(30),
            republish_interval: Duration::from_secs(30),
            republish_count: 6,
            hass_online_delay: Duration::from_secs(5),
            token_watchdog_period: Duration::from_secs(60),
            discovery_retry: Duration::from_secs(60),
            ding_duration: Duration::from_secs(180),
            unlock_duration: Duration::from_secs(5),
        }
    }
}

/// Behaviour of the publish/subscribe lifecycle controller.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Root of every state/command topic.
    pub ring_topic: String,
    /// Topic Home Assistant publishes its birth/last-will on.
    pub hass_topic: String,
    /// Prefix of discovery config topics.
    pub discovery_prefix: String,
    pub enable_cameras: bool,
    pub enable_modes: bool,
    pub enable_panic: bool,
    /// Exposed to Home Assistant as the alarm panel code when set.
    pub disarm_code: Option<SecretString>,
    pub timings: Timings,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            ring_topic: "ring".into(),
            hass_topic: "homeassistant/status".into(),
            discovery_prefix: "homeassistant".into(),
            enable_cameras: true,
            enable_modes: false,
            enable_panic: false,
            disarm_code: None,
            timings: Timings::default(),
        }
    }
}

/// Vendor session parameters.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Used only when the state file has no token yet.
    pub refresh_token: Option<SecretString>,
    /// Name shown in the Ring app's control center.
    pub control_center_name: String,
    pub state_file: PathBuf,
    /// Only these locations are bridged. Empty means all.
    pub location_ids: Vec<String>,
    /// Synthesize and poll a mode device for locations without a hub.
    pub enable_modes: bool,
    pub camera_poll_interval: Duration,
    pub location_poll_interval: Duration,
    /// How long to wait for a hub's first device list.
    pub hub_list_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            refresh_token: None,
            control_center_name: "ringmqtt".into(),
            state_file: PathBuf::from("ringmqtt.state.json"),
            location_ids: Vec::new(),
            enable_modes: false,
            camera_poll_interval: Duration::from_secs(20),
            location_poll_interval: Duration::from_secs(60),
            hub_list_timeout: Duration::from_secs(30),
        }
    }
}

/// Broker connection parameters.
#[derive(Debug, Clone)]
pub struct MqttConfig {
    /// `mqtt://` or `mqtts://` URL; user info in the URL is honoured.
    pub url: Url,
    pub username: Option<String>,
    pub password: Option<SecretString>,
    pub client_id: String,
    pub keep_alive: Duration,
}

/// Streaming server supervisor parameters.
#[derive(Debug, Clone)]
pub struct MediaConfig {
    /// Executable of the streaming server. `None` disables the supervisor.
    pub binary: Option<PathBuf>,
    /// Where the generated YAML config is written.
    pub config_path: PathBuf,
    /// Helper script invoked by the server to pull a camera stream.
    pub script: PathBuf,
    pub rtsp_port: u16,
    pub username: Option<String>,
    pub password: Option<SecretString>,
    pub restart_delay: Duration,
    pub stop_timeout: Duration,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            binary: None,
            config_path: PathBuf::from("go2rtc.yaml"),
            script: PathBuf::from("stream.sh"),
            rtsp_port: 8554,
            username: None,
            password: None,
            restart_delay: Duration::from_secs(10),
            stop_timeout: Duration::from_secs(5),
        }
    }
}

//! Configuration for the ringmqtt bridge.
//!
//! A flat TOML file layered under `RINGMQTT_`-prefixed environment
//! variables, and translation to the `ringmqtt_core` settings types.
//! Core never reads files; the binary loads a [`Config`] here and hands
//! the resolved settings in.

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use ringmqtt_core::{BridgeConfig, MediaConfig, MqttConfig, SessionConfig, Timings};

const REDACTED: &str = "********";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

fn invalid(field: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Validation {
        field: field.into(),
        reason: reason.into(),
    }
}

// ── File model ──────────────────────────────────────────────────────

/// Top-level configuration. Every key may also be set through the
/// environment, e.g. `RINGMQTT_MQTT_URL`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Broker URL, `mqtt://` or `mqtts://`.
    pub mqtt_url: String,
    pub mqtt_user: Option<String>,
    pub mqtt_pass: Option<String>,
    pub mqtt_client_id: String,

    /// Seed refresh token. Ignored once the state file holds one.
    pub ring_token: Option<String>,
    pub ring_topic: String,
    pub hass_topic: String,
    pub discovery_prefix: String,

    pub enable_cameras: bool,
    pub enable_modes: bool,
    pub enable_panic: bool,
    pub disarm_code: Option<String>,

    /// Locations to bridge. Empty bridges every location on the account.
    pub location_ids: Vec<String>,
    pub control_center_name: String,
    pub state_file: PathBuf,

    /// Seconds between active-ding polls.
    pub camera_poll_interval: u64,
    /// Seconds between device health polls.
    pub location_poll_interval: u64,

    pub livestream_user: Option<String>,
    pub livestream_pass: Option<String>,
    /// Streaming server executable. Unset disables live streams.
    pub media_binary: Option<PathBuf>,
    pub media_config: PathBuf,
    pub media_script: PathBuf,
    pub rtsp_port: u16,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mqtt_url: "mqtt://localhost:1883".into(),
            mqtt_user: None,
            mqtt_pass: None,
            mqtt_client_id: "ringmqtt".into(),
            ring_token: None,
            ring_topic: "ring".into(),
            hass_topic: "homeassistant/status".into(),
            discovery_prefix: "homeassistant".into(),
            enable_cameras: true,
            enable_modes: false,
            enable_panic: false,
            disarm_code: None,
            location_ids: Vec::new(),
            control_center_name: "ringmqtt".into(),
            state_file: PathBuf::from("ringmqtt.state.json"),
            camera_poll_interval: 20,
            location_poll_interval: 60,
            livestream_user: None,
            livestream_pass: None,
            media_binary: None,
            media_config: PathBuf::from("go2rtc.yaml"),
            media_script: PathBuf::from("stream.sh"),
            rtsp_port: 8554,
        }
    }
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("com", "ringmqtt", "ringmqtt").map_or_else(
        || PathBuf::from("ringmqtt.toml"),
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

// ── Config loading ──────────────────────────────────────────────────

/// Layer defaults, the TOML file and the environment. A missing file is
/// not an error.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let config: Config = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("RINGMQTT_"))
        .extract()?;
    Ok(config)
}

/// Write `config` as TOML, creating parent directories.
pub fn save_config(config: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, toml::to_string_pretty(config)?)?;
    Ok(())
}

// ── Translation to core settings ────────────────────────────────────

/// Everything the bridge needs, validated.
#[derive(Debug, Clone)]
pub struct Settings {
    pub bridge: BridgeConfig,
    pub session: SessionConfig,
    pub mqtt: MqttConfig,
    pub media: MediaConfig,
}

fn secret(value: Option<&String>) -> Option<SecretString> {
    value
        .filter(|v| !v.is_empty())
        .map(|v| SecretString::from(v.clone()))
}

fn topic(field: &str, value: &str) -> Result<String, ConfigError> {
    let value = value.trim_end_matches('/');
    if value.is_empty() {
        return Err(invalid(field, "must not be empty"));
    }
    if value.contains(['#', '+']) {
        return Err(invalid(field, format!("wildcards are not allowed: {value}")));
    }
    Ok(value.to_owned())
}

fn interval(field: &str, secs: u64) -> Result<Duration, ConfigError> {
    if secs == 0 {
        return Err(invalid(field, "must be at least 1 second"));
    }
    Ok(Duration::from_secs(secs))
}

impl Config {
    /// Validate and translate into core settings.
    pub fn resolve(&self) -> Result<Settings, ConfigError> {
        Ok(Settings {
            bridge: self.bridge_config()?,
            session: self.session_config()?,
            mqtt: self.mqtt_config()?,
            media: self.media_config(),
        })
    }

    pub fn bridge_config(&self) -> Result<BridgeConfig, ConfigError> {
        Ok(BridgeConfig {
            ring_topic: topic("ring_topic", &self.ring_topic)?,
            hass_topic: topic("hass_topic", &self.hass_topic)?,
            discovery_prefix: topic("discovery_prefix", &self.discovery_prefix)?,
            enable_cameras: self.enable_cameras,
            enable_modes: self.enable_modes,
            enable_panic: self.enable_panic,
            disarm_code: secret(self.disarm_code.as_ref()),
            timings: Timings::default(),
        })
    }

    pub fn session_config(&self) -> Result<SessionConfig, ConfigError> {
        Ok(SessionConfig {
            refresh_token: secret(self.ring_token.as_ref()),
            control_center_name: self.control_center_name.clone(),
            state_file: self.state_file.clone(),
            location_ids: self.location_ids.clone(),
            enable_modes: self.enable_modes,
            camera_poll_interval: interval("camera_poll_interval", self.camera_poll_interval)?,
            location_poll_interval: interval("location_poll_interval", self.location_poll_interval)?,
            ..SessionConfig::default()
        })
    }

    pub fn mqtt_config(&self) -> Result<MqttConfig, ConfigError> {
        let url: url::Url = self
            .mqtt_url
            .parse()
            .map_err(|e| invalid("mqtt_url", format!("{e}: {}", self.mqtt_url)))?;
        if !matches!(url.scheme(), "mqtt" | "mqtts" | "tcp" | "ssl") {
            return Err(invalid(
                "mqtt_url",
                format!("expected mqtt:// or mqtts://, got {}://", url.scheme()),
            ));
        }
        Ok(MqttConfig {
            url,
            username: self.mqtt_user.clone().filter(|u| !u.is_empty()),
            password: secret(self.mqtt_pass.as_ref()),
            client_id: self.mqtt_client_id.clone(),
            keep_alive: Duration::from_secs(30),
        })
    }

    pub fn media_config(&self) -> MediaConfig {
        MediaConfig {
            binary: self.media_binary.clone(),
            config_path: self.media_config.clone(),
            script: self.media_script.clone(),
            rtsp_port: self.rtsp_port,
            username: self.livestream_user.clone().filter(|u| !u.is_empty()),
            password: secret(self.livestream_pass.as_ref()),
            restart_delay: Duration::from_secs(10),
            stop_timeout: Duration::from_secs(5),
        }
    }

    /// A copy with every secret replaced, for display.
    pub fn redacted(&self) -> Self {
        let hide = |v: &Option<String>| v.as_ref().map(|_| REDACTED.to_owned());
        Self {
            mqtt_pass: hide(&self.mqtt_pass),
            ring_token: hide(&self.ring_token),
            disarm_code: hide(&self.disarm_code),
            livestream_pass: hide(&self.livestream_pass),
            mqtt_url: redact_url(&self.mqtt_url),
            ..self.clone()
        }
    }
}

fn redact_url(raw: &str) -> String {
    match url::Url::parse(raw) {
        Ok(mut url) if url.password().is_some() => {
            let _ = url.set_password(Some(REDACTED));
            url.to_string()
        }
        _ => raw.to_owned(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use figment::Jail;
    use pretty_assertions::assert_eq;
    use secrecy::ExposeSecret;

    use super::*;

    #[test]
    fn defaults_without_file() {
        Jail::expect_with(|_jail| {
            let config = load_config(Path::new("missing.toml")).unwrap();
            assert_eq!(config, Config::default());
            let settings = config.resolve().unwrap();
            assert_eq!(settings.bridge.ring_topic, "ring");
            assert_eq!(settings.mqtt.url.as_str(), "mqtt://localhost:1883");
            assert!(settings.media.binary.is_none());
            Ok(())
        });
    }

    #[test]
    fn file_then_environment() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "ringmqtt.toml",
                r#"
                    mqtt_url = "mqtt://broker:1884"
                    ring_topic = "ring-a"
                    enable_panic = true
                    location_ids = ["loc-1"]
                "#,
            )?;
            jail.set_env("RINGMQTT_RING_TOPIC", "ring-b");
            jail.set_env("RINGMQTT_RING_TOKEN", "seed");

            let config = load_config(Path::new("ringmqtt.toml")).unwrap();
            assert_eq!(config.ring_topic, "ring-b");
            assert!(config.enable_panic);
            assert_eq!(config.location_ids, ["loc-1"]);

            let session = config.session_config().unwrap();
            assert_eq!(session.refresh_token.unwrap().expose_secret(), "seed");
            assert_eq!(session.location_ids, ["loc-1"]);
            Ok(())
        });
    }

    #[test]
    fn validation_names_the_field() {
        let config = Config {
            ring_topic: "ring/#".into(),
            ..Config::default()
        };
        let err = config.resolve().unwrap_err();
        assert!(matches!(err, ConfigError::Validation { ref field, .. } if field == "ring_topic"));

        let config = Config {
            mqtt_url: "http://broker".into(),
            ..Config::default()
        };
        let err = config.mqtt_config().unwrap_err();
        assert!(matches!(err, ConfigError::Validation { ref field, .. } if field == "mqtt_url"));

        let config = Config {
            camera_poll_interval: 0,
            ..Config::default()
        };
        assert!(config.session_config().is_err());
    }

    #[test]
    fn empty_secrets_are_unset() {
        let config = Config {
            mqtt_pass: Some(String::new()),
            disarm_code: Some("1234".into()),
            ..Config::default()
        };
        assert!(config.mqtt_config().unwrap().password.is_none());
        assert_eq!(
            config.bridge_config().unwrap().disarm_code.unwrap().expose_secret(),
            "1234"
        );
    }

    #[test]
    fn redaction_hides_every_secret() {
        let config = Config {
            mqtt_url: "mqtt://user:pw@broker".into(),
            mqtt_pass: Some("pw".into()),
            ring_token: Some("tok-value".into()),
            livestream_pass: Some("stream-value".into()),
            ..Config::default()
        };
        let shown = toml::to_string(&config.redacted()).unwrap();
        for secret in ["tok-value", "stream-value", ":pw@"] {
            assert!(!shown.contains(secret), "{secret} leaked: {shown}");
        }
        assert!(shown.contains(REDACTED));
    }

    #[test]
    fn save_then_load() {
        Jail::expect_with(|jail| {
            let path = jail.directory().join("nested/config.toml");
            let config = Config {
                enable_modes: true,
                ..Config::default()
            };
            save_config(&config, &path).unwrap();
            assert_eq!(load_config(&path).unwrap(), config);
            Ok(())
        });
    }
}

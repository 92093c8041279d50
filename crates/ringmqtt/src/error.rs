//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` variants into user-facing errors
//! with actionable help text.

use miette::Diagnostic;
use thiserror::Error;

use ringmqtt_config::ConfigError;
use ringmqtt_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Authentication ───────────────────────────────────────────────
    #[error("Ring authentication failed: {message}")]
    #[diagnostic(
        code(ringmqtt::auth_failed),
        help(
            "Generate a new refresh token and store it with:\n\
             ringmqtt token <TOKEN>"
        )
    )]
    AuthFailed { message: String },

    // ── Connection ───────────────────────────────────────────────────
    #[error("Ring session unavailable: {reason}")]
    #[diagnostic(
        code(ringmqtt::session_unavailable),
        help("Check network access to ring.com and try again.")
    )]
    SessionUnavailable { reason: String },

    #[error("MQTT error: {message}")]
    #[diagnostic(
        code(ringmqtt::mqtt),
        help("Check mqtt_url, mqtt_user and mqtt_pass in your configuration.")
    )]
    Mqtt { message: String },

    #[error("Timed out waiting for {what}")]
    #[diagnostic(code(ringmqtt::timeout))]
    Timeout { what: String },

    // ── Validation ───────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(ringmqtt::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error("Configuration file already exists")]
    #[diagnostic(
        code(ringmqtt::config_exists),
        help("Edit {path} directly, or pass --force to overwrite it.")
    )]
    ConfigExists { path: String },

    #[error(transparent)]
    #[diagnostic(code(ringmqtt::config))]
    Config(Box<figment::Error>),

    // ── Bridge ───────────────────────────────────────────────────────
    #[error("{0}")]
    #[diagnostic(code(ringmqtt::bridge))]
    Bridge(String),

    // ── IO / Serialization ───────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Failed to render YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::AuthFailed { .. } => exit_code::AUTH,
            Self::SessionUnavailable { .. } | Self::Mqtt { .. } => exit_code::CONNECTION,
            Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::Validation { .. } | Self::ConfigExists { .. } | Self::Config(_) => {
                exit_code::USAGE
            }
            _ => exit_code::GENERAL,
        }
    }
}

// ── ConfigError → CliError mapping ───────────────────────────────────

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Validation { field, reason } => CliError::Validation { field, reason },
            ConfigError::Figment(e) => CliError::Config(e),
            ConfigError::Io(e) => CliError::Io(e),
            ConfigError::Serialization(e) => CliError::Validation {
                field: "config".into(),
                reason: e.to_string(),
            },
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::AuthenticationFailed { message } => CliError::AuthFailed { message },
            CoreError::SessionUnavailable { reason } => CliError::SessionUnavailable { reason },
            CoreError::HubDisconnected { location_id } => CliError::SessionUnavailable {
                reason: format!("hub of location {location_id} is unreachable"),
            },
            CoreError::Timeout { what, .. } => CliError::Timeout { what },
            CoreError::Mqtt { message } => CliError::Mqtt { message },
            CoreError::Config { message } => CliError::Validation {
                field: "config".into(),
                reason: message,
            },
            other => CliError::Bridge(other.to_string()),
        }
    }
}

// ── Core error types ──
//
// Domain errors from ringmqtt-core. Consumers never see HTTP status codes
// or JSON parse failures directly; the `From<ringmqtt_api::Error>` impl
// translates transport-layer errors into domain-appropriate variants.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Session errors ───────────────────────────────────────────────
    #[error("Ring session unavailable: {reason}")]
    SessionUnavailable { reason: String },

    #[error("Authentication failed: {message}")]
    AuthenticationFailed { message: String },

    #[error("Hub connection for location {location_id} is down")]
    HubDisconnected { location_id: String },

    #[error("Timed out after {timeout_secs}s waiting for {what}")]
    Timeout { what: String, timeout_secs: u64 },

    // ── Data errors ──────────────────────────────────────────────────
    #[error("Device not found: {identifier}")]
    DeviceNotFound { identifier: String },

    #[error("Location not found: {location_id}")]
    LocationNotFound { location_id: String },

    // ── Operation errors ─────────────────────────────────────────────
    #[error("Command rejected: {message}")]
    InvalidCommand { message: String },

    #[error("Vendor rejected the operation: {message}")]
    Rejected { message: String },

    // ── API errors (wrapped, not exposed raw) ────────────────────────
    #[error("API error: {message}")]
    Api {
        message: String,
        /// HTTP status code (if applicable).
        status: Option<u16>,
    },

    // ── Infrastructure errors ────────────────────────────────────────
    #[error("MQTT error: {message}")]
    Mqtt { message: String },

    #[error("State file {path}: {message}")]
    StateFile { path: String, message: String },

    #[error("Media server: {message}")]
    Media { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    // ── Internal errors ──────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidCommand {
            message: message.into(),
        }
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<ringmqtt_api::Error> for CoreError {
    fn from(err: ringmqtt_api::Error) -> Self {
        match err {
            ringmqtt_api::Error::Authentication { message } => {
                CoreError::AuthenticationFailed { message }
            }
            ringmqtt_api::Error::MissingToken => CoreError::SessionUnavailable {
                reason: "no refresh token".into(),
            },
            ringmqtt_api::Error::TwoFactorRequired => CoreError::AuthenticationFailed {
                message: "two-factor code required; generate a refresh token instead".into(),
            },
            ringmqtt_api::Error::Transport(ref e) => {
                if e.is_timeout() {
                    CoreError::Timeout {
                        what: "Ring API".into(),
                        timeout_secs: 0,
                    }
                } else {
                    CoreError::SessionUnavailable {
                        reason: e.to_string(),
                    }
                }
            }
            ringmqtt_api::Error::RateLimited { retry_after_secs } => CoreError::Api {
                message: format!("rate limited, retry after {retry_after_secs}s"),
                status: Some(429),
            },
            ringmqtt_api::Error::Api { status, message } => CoreError::Api {
                message,
                status: Some(status),
            },
            ringmqtt_api::Error::HubUnavailable { location_id } => {
                CoreError::HubDisconnected { location_id }
            }
            ringmqtt_api::Error::WebSocketConnect(reason) => CoreError::SessionUnavailable {
                reason: format!("hub websocket: {reason}"),
            },
            ringmqtt_api::Error::WebSocketClosed { code, reason } => {
                CoreError::SessionUnavailable {
                    reason: format!("hub websocket closed ({code}): {reason}"),
                }
            }
            ringmqtt_api::Error::Deserialization { message, .. } => CoreError::Api {
                message: format!("unexpected response: {message}"),
                status: None,
            },
            ringmqtt_api::Error::InvalidUrl(e) => CoreError::Internal(e.to_string()),
            ringmqtt_api::Error::Tls(message) => CoreError::SessionUnavailable { reason: message },
        }
    }
}

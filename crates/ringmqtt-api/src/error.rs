use thiserror::Error;

/// Top-level error type for the `ringmqtt-api` crate.
///
/// Covers every failure mode across the REST client, the OAuth token
/// exchange, and the per-location hub websocket. `ringmqtt-core` maps
/// these into domain errors.
#[derive(Debug, Error)]
pub enum Error {
    // ── OAuth ───────────────────────────────────────────────────────
    /// The OAuth endpoint rejected the refresh token.
    #[error("Ring rejected the refresh token: {message}")]
    Authentication { message: String },

    /// No refresh token is available to start a session.
    #[error("No refresh token available -- run `ringmqtt token <TOKEN>` first")]
    MissingToken,

    /// The account requires a two-factor code. Only refresh-token logins
    /// are supported.
    #[error("Two-factor authentication required")]
    TwoFactorRequired,

    // ── Transport ───────────────────────────────────────────────────
    /// The request never produced a response.
    #[error("Request to Ring failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// TLS or HTTP client construction error.
    #[error("TLS error: {0}")]
    Tls(String),

    /// HTTP 429 with the server-provided back-off.
    #[error("Ring is throttling requests, retry in {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    /// Non-success response from a REST endpoint.
    #[error("Ring API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    // ── Hub websocket ───────────────────────────────────────────────
    /// Ticket request or socket handshake failed.
    #[error("Hub socket could not connect: {0}")]
    WebSocketConnect(String),

    /// The hub closed the socket.
    #[error("Hub socket closed ({code}): {reason}")]
    WebSocketClosed { code: u16, reason: String },

    /// A hub command could not be sent because the socket is not connected.
    #[error("Hub connection for location {location_id} is not available")]
    HubUnavailable { location_id: String },

    // ── Payloads ────────────────────────────────────────────────────
    /// A body did not match the expected shape. `body` keeps the raw text.
    #[error("Unexpected payload from Ring: {message}")]
    Deserialization { message: String, body: String },
}

impl Error {
    /// A REST call hit a missing resource (deleted device, wrong id).
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::Api { status, .. } => *status == 404,
            Self::Transport(e) => e.status() == Some(reqwest::StatusCode::NOT_FOUND),
            _ => false,
        }
    }
}

// OAuth refresh-token exchange for the Ring cloud.
//
// Only the refresh-token grant is supported. Every successful exchange
// returns a new refresh token, which the caller must persist.

use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::debug;
use url::Url;

use crate::error::Error;

pub(crate) const CLIENT_ID: &str = "ring_official_android";
const SCOPE: &str = "client";

/// Access tokens are treated as expired this long before the server says so.
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

#[derive(Debug, Serialize)]
struct RefreshRequest<'a> {
    client_id: &'a str,
    scope: &'a str,
    grant_type: &'a str,
    refresh_token: &'a str,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: u64,
}

fn default_expires_in() -> u64 {
    3600
}

#[derive(Debug, Deserialize)]
struct TokenError {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
}

/// A bearer token together with its local expiry.
#[derive(Debug, Clone)]
pub struct AccessToken {
    pub token: SecretString,
    pub expires_at: Instant,
}

impl AccessToken {
    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// Outcome of a successful refresh-token exchange.
#[derive(Debug, Clone)]
pub struct TokenGrant {
    pub access: AccessToken,
    /// The rotated refresh token. Always differs from the one sent.
    pub refresh_token: String,
}

/// Exchange a refresh token for an access token.
pub(crate) async fn exchange_refresh_token(
    http: &reqwest::Client,
    oauth_url: &Url,
    refresh_token: &SecretString,
) -> Result<TokenGrant, Error> {
    let url = oauth_url.join("oauth/token")?;
    debug!("POST {}", url);

    let body = RefreshRequest {
        client_id: CLIENT_ID,
        scope: SCOPE,
        grant_type: "refresh_token",
        refresh_token: refresh_token.expose_secret(),
    };

    let resp = http
        .post(url)
        .header("2fa-support", "true")
        .json(&body)
        .send()
        .await?;
    let status = resp.status();

    if status == reqwest::StatusCode::PRECONDITION_FAILED {
        return Err(Error::TwoFactorRequired);
    }
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        let retry_after_secs = resp
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok())
            .unwrap_or(60);
        return Err(Error::RateLimited { retry_after_secs });
    }

    let text = resp.text().await?;
    if !status.is_success() {
        let detail = serde_json::from_str::<TokenError>(&text)
            .ok()
            .and_then(|e| e.error_description.or(e.error))
            .unwrap_or_else(|| format!("HTTP {status}"));
        return Err(Error::Authentication { message: detail });
    }

    let grant: TokenResponse =
        serde_json::from_str(&text).map_err(|e| Error::Deserialization {
            message: format!("token response: {e}"),
            body: String::new(),
        })?;

    let lifetime = Duration::from_secs(grant.expires_in).saturating_sub(EXPIRY_MARGIN);
    Ok(TokenGrant {
        access: AccessToken {
            token: SecretString::from(grant.access_token),
            expires_at: Instant::now() + lifetime,
        },
        refresh_token: grant.refresh_token,
    })
}

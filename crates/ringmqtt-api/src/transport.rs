// Shared transport configuration for building reqwest::Client instances.
//
// The REST client and the OAuth exchange share the same timeout and
// user-agent settings through this module.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue};

use crate::error::Error;

const USER_AGENT: &str = concat!("ringmqtt/", env!("CARGO_PKG_VERSION"));

/// Shared transport configuration for building HTTP clients.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub timeout: Duration,
    /// Sent as the `hardware_id` header; the Ring API ties sessions to it.
    pub hardware_id: String,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(20),
            hardware_id: String::new(),
        }
    }
}

impl TransportConfig {
    pub fn new(hardware_id: impl Into<String>) -> Self {
        Self {
            hardware_id: hardware_id.into(),
            ..Self::default()
        }
    }

    /// Build a `reqwest::Client` from this config.
    pub fn build_client(&self) -> Result<reqwest::Client, Error> {
        let mut headers = HeaderMap::new();
        if !self.hardware_id.is_empty() {
            let value = HeaderValue::from_str(&self.hardware_id)
                .map_err(|e| Error::Tls(format!("invalid hardware id header: {e}")))?;
            headers.insert("hardware_id", value);
        }

        reqwest::Client::builder()
            .timeout(self.timeout)
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .build()
            .map_err(|e| Error::Tls(format!("failed to build HTTP client: {e}")))
    }
}

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::engine::backoff::{RetryPolicy, DEFAULT_BASE_DELAY, DEFAULT_MAX_RETRIES};
use crate::error::NotifyError;

/// Where the notification service listens when nothing else is configured.
pub const DEFAULT_ENDPOINT: &str = "ws://localhost:8085/notifications";

/// # Client Config
///
/// Settings for one `NotificationClient`. Every field has a default, so a JSON
/// file only needs the keys it wants to change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClientConfig {
    /// The notification WebSocket endpoint.
    pub endpoint: String,
    /// Query parameter that carries the bearer token.
    pub token_param: String,
    /// Automatic reconnection attempts before giving up.
    pub max_retries: u32,
    /// Base reconnection delay in milliseconds; attempt `n` waits `n` times this.
    pub retry_base_delay_ms: u64,
    /// Upper bound on a single channel establishment, in milliseconds.
    pub connect_timeout_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            token_param: "token".to_string(),
            max_retries: DEFAULT_MAX_RETRIES,
            retry_base_delay_ms: DEFAULT_BASE_DELAY.as_millis() as u64,
            connect_timeout_ms: 10_000,
        }
    }
}

impl ClientConfig {
    /// Loads a JSON config file; absent keys keep their defaults.
    pub fn from_file(path: &Path) -> Result<Self, NotifyError> {
        let text = fs::read_to_string(path)?;
        let config = serde_json::from_str(&text)?;
        log::info!("Loaded notification client config from {}", path.display());
        Ok(config)
    }

    /// The reconnection policy these settings describe.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries, Duration::from_millis(self.retry_base_delay_ms))
    }

    /// The channel establishment timeout.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// The connection URL: the endpoint with the token appended as a query
    /// parameter. Without a token the endpoint is used as-is.
    #[cfg(feature = "client")]
    pub fn endpoint_url(&self, token: Option<&str>) -> Result<url::Url, NotifyError> {
        let mut url = url::Url::parse(&self.endpoint)?;
        if let Some(token) = token {
            url.query_pairs_mut().append_pair(&self.token_param, token);
        }
        Ok(url)
    }
}

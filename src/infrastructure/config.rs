use std::env;
use std::time::Duration;

use url::Url;

use crate::domain::CatalogError;

/// Default backend origin
pub const DEFAULT_API_URL: &str = "http://localhost:5010";
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 30;

#[derive(Clone, Debug)]
pub struct Config {
    pub api_url: String,
    pub poll_interval: Duration,
    pub request_timeout: Option<Duration>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            poll_interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            request_timeout: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let api_url = env::var("CATALOG_API_URL")
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| DEFAULT_API_URL.to_string());

        Self {
            api_url,
            poll_interval: Duration::from_secs(
                env::var("CATALOG_POLL_INTERVAL_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .filter(|&secs| secs > 0)
                    .unwrap_or(DEFAULT_POLL_INTERVAL_SECS),
            ),
            request_timeout: env::var("CATALOG_REQUEST_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|&secs| secs > 0)
                .map(Duration::from_secs),
        }
    }

    /// Parsed backend origin. Only http(s) origins are accepted.
    pub fn base_url(&self) -> Result<Url, CatalogError> {
        let url = Url::parse(&self.api_url)?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(CatalogError::Config(format!(
                "unsupported scheme '{}' in {}",
                url.scheme(),
                self.api_url
            )));
        }
        Ok(url)
    }
}

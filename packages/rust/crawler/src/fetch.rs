//! Single-request page fetcher.

use std::time::Duration;

use reqwest::{Client, StatusCode};
use tracing::debug;

use wikidigest_shared::{Result, WikiDigestError};

/// User-Agent string for crawl requests.
const USER_AGENT: &str = concat!("WikiDigest/", env!("CARGO_PKG_VERSION"));

/// Fixed per-request timeout.
const FETCH_TIMEOUT_SECS: u64 = 30;

/// Retrieves raw markup over HTTP. One GET per call, no retries.
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: Client,
}

impl Fetcher {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(FETCH_TIMEOUT_SECS))
            .build()
            .map_err(|e| WikiDigestError::config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client })
    }

    /// GET `url` and return the body. Anything but `200 OK` is a fetch failure.
    pub async fn fetch(&self, url: &str) -> Result<String> {
        debug!(url, "fetching page");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| WikiDigestError::fetch(url, e.to_string()))?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(WikiDigestError::fetch(url, format!("HTTP {status}")));
        }

        response
            .text()
            .await
            .map_err(|e| WikiDigestError::fetch(url, format!("body read failed: {e}")))
    }
}

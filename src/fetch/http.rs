// src/fetch/http.rs

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use tracing::{trace, warn};
use url::Url;

use super::{FetchConfig, Transport};

/// `reqwest`-backed transport carrying the browser user agent and per-request timeout.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(config: &FetchConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(config.user_agent.as_str())
            .timeout(config.timeout)
            .build()
            .context("building HTTP client")?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(&self, url: &Url) -> Result<Vec<u8>> {
        let resp = self
            .client
            .get(url.clone())
            .send()
            .await
            .with_context(|| format!("GET {}", url))?;

        // the portal answers errors with an HTML page; let the table lookup judge it
        let status = resp.status();
        if !status.is_success() {
            warn!(%url, %status, "non-success status");
        }

        let bytes = resp
            .bytes()
            .await
            .with_context(|| format!("reading body from {}", url))?;
        trace!(%url, len = bytes.len(), "body received");
        Ok(bytes.to_vec())
    }
}

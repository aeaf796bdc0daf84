// src/fetch/mod.rs

use anyhow::Result;
use async_trait::async_trait;
use std::{fmt, time::Duration};
use tokio::time::sleep;
use tracing::{debug, error, info, instrument, warn};
use url::Url;

use crate::table::RawTable;

pub mod http;

pub use http::HttpTransport;

pub const DEFAULT_HOST: &str = "isin.twse.com.tw";
pub const DEFAULT_PATH: &str = "/isin/C_public.jsp";
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
     AppleWebKit/537.36 (KHTML, like Gecko) \
     Chrome/124.0.0.0 Safari/537.36";

/// Everything the fetcher needs to know about the portal. Immutable once built.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Host (optionally with port) serving the listing pages.
    pub host: String,
    pub path: String,
    pub user_agent: String,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Total attempts per mode, including the first.
    pub max_retry: u32,
    /// The pause after attempt `i` is `backoff * i`.
    pub backoff: Duration,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            path: DEFAULT_PATH.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout: Duration::from_secs(30),
            max_retry: 3,
            backoff: Duration::from_secs(2),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    Https,
    Http,
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Scheme::Https => "https",
            Scheme::Http => "http",
        })
    }
}

/// Raw page bytes for a URL. Any HTTP response counts as a success here.
#[async_trait]
pub trait Transport {
    async fn get(&self, url: &Url) -> Result<Vec<u8>>;
}

/// Waits between attempts.
#[async_trait]
pub trait Pause {
    async fn pause(&self, delay: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TokioPause;

#[async_trait]
impl Pause for TokioPause {
    async fn pause(&self, delay: Duration) {
        sleep(delay).await;
    }
}

/// Linear backoff: `backoff * attempt`.
pub fn backoff_delay(backoff: Duration, attempt: u32) -> Duration {
    backoff * attempt
}

/// Portal pages are Big5; undecodable bytes become U+FFFD.
pub fn decode_big5(bytes: &[u8]) -> String {
    let (text, _, had_errors) = encoding_rs::BIG5.decode(bytes);
    if had_errors {
        debug!("body contained bytes outside Big5");
    }
    text.into_owned()
}

/// Fetches the ISIN listing table for one market mode.
pub struct TableFetcher<T, P = TokioPause> {
    config: FetchConfig,
    transport: T,
    pause: P,
}

impl TableFetcher<HttpTransport, TokioPause> {
    pub fn new(config: FetchConfig) -> Result<Self> {
        let transport = HttpTransport::new(&config)?;
        Ok(Self::with_parts(config, transport, TokioPause))
    }
}

impl<T: Transport, P: Pause> TableFetcher<T, P> {
    pub fn with_parts(config: FetchConfig, transport: T, pause: P) -> Self {
        Self {
            config,
            transport,
            pause,
        }
    }

    pub fn endpoint(&self, scheme: Scheme, mode: u8) -> Result<Url> {
        let url = Url::parse(&format!(
            "{}://{}{}?strMode={}",
            scheme, self.config.host, self.config.path, mode
        ))?;
        Ok(url)
    }

    /// Fetch the `table.h4` listing for `mode`.
    ///
    /// Starts on HTTPS and drops to HTTP after the first failed attempt of
    /// either kind. When every attempt misses, the last body received is given
    /// one generic first-table parse. Never fails: `None` means no table.
    #[instrument(level = "info", skip(self))]
    pub async fn fetch(&self, mode: u8) -> Option<RawTable> {
        let max_retry = self.config.max_retry;
        let mut scheme = Scheme::Https;
        let mut last_body: Option<String> = None;

        for attempt in 1..=max_retry {
            match self.get_page(scheme, mode).await {
                Ok(html) => {
                    if let Some(table) = RawTable::parse_listing(&html) {
                        info!(attempt, %scheme, rows = table.rows().len(), "listing table found");
                        return Some(table);
                    }
                    warn!(attempt, max_retry, %scheme, "table.h4 not found");
                    last_body = Some(html);
                }
                Err(e) => {
                    let error = format!("{e:#}");
                    warn!(attempt, max_retry, %scheme, %error, "request failed");
                }
            }

            scheme = Scheme::Http;
            if attempt < max_retry {
                let delay = backoff_delay(self.config.backoff, attempt);
                debug!(attempt, delay_ms = delay.as_millis() as u64, "backing off");
                self.pause.pause(delay).await;
            }
        }

        // last resort: any table in the last page we saw
        let Some(html) = last_body else {
            error!(max_retry, "no response received; returning no table");
            return None;
        };
        match RawTable::parse_first(&html) {
            Some(table) => {
                warn!(rows = table.rows().len(), "using generic table fallback");
                Some(table)
            }
            None => {
                error!(max_retry, "parse failed; returning no table");
                None
            }
        }
    }

    async fn get_page(&self, scheme: Scheme, mode: u8) -> Result<String> {
        let url = self.endpoint(scheme, mode)?;
        debug!(%url, "GET");
        let bytes = self.transport.get(&url).await?;
        Ok(decode_big5(&bytes))
    }
}

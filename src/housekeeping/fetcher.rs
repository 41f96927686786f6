use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use tokio::time::timeout;
use tracing::{info, warn};
use url::Url;

use crate::config::{CrlSource, FetchConfig};

use super::errors::{FetchError, FetchResult};

/// Transport seam for CRL downloads, so the orchestrator can run against
/// scripted fetchers in tests.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CrlFetch: Send + Sync {
    /// Downloads one source's CRL and returns the raw bytes.
    async fn fetch(&self, source: &CrlSource) -> FetchResult<Vec<u8>>;
}

/// HTTP fetcher with a bounded timeout and retry budget.
///
/// Transient failures (timeout, 5xx, transport errors) are retried with
/// doubling backoff up to `max_retries` extra attempts; 4xx responses are
/// permanent misconfiguration and fail immediately.
#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
    request_timeout: Duration,
    max_retries: u32,
    backoff: Duration,
}

impl HttpFetcher {
    pub fn new(config: &FetchConfig) -> FetchResult<Self> {
        let client = Client::builder()
            .user_agent(concat!("crl-housekeeper/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            request_timeout: Duration::from_secs(config.timeout_secs),
            max_retries: config.max_retries,
            backoff: Duration::from_millis(config.backoff_ms),
        })
    }

    /// One attempt, bounded by `request_timeout` across headers and body.
    async fn fetch_once(&self, url: &str) -> FetchResult<Vec<u8>> {
        let attempt = async {
            let response = self.client.get(url).send().await?;
            let status = response.status();
            if !status.is_success() {
                return Err(FetchError::HttpStatus(status));
            }
            Ok(response.bytes().await?.to_vec())
        };
        match timeout(self.request_timeout, attempt).await {
            Ok(result) => result,
            Err(_) => Err(FetchError::Timeout),
        }
    }
}

#[async_trait]
impl CrlFetch for HttpFetcher {
    async fn fetch(&self, source: &CrlSource) -> FetchResult<Vec<u8>> {
        let url = Url::parse(&source.url).map_err(|e| FetchError::InvalidUrl(e.to_string()))?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(FetchError::InvalidUrl(format!(
                "scheme '{}' is not fetchable",
                url.scheme()
            )));
        }

        let started = Instant::now();
        let mut attempt: u32 = 0;
        loop {
            match self.fetch_once(url.as_str()).await {
                Ok(bytes) => {
                    info!(
                        "[FETCH] '{}': {} bytes in {:?} ({} attempt(s))",
                        source.name,
                        bytes.len(),
                        started.elapsed(),
                        attempt + 1
                    );
                    return Ok(bytes);
                }
                Err(error) if error.is_transient() && attempt < self.max_retries => {
                    attempt += 1;
                    let delay = self.backoff * 2u32.pow(attempt - 1);
                    warn!(
                        "[FETCH] '{}': attempt {} failed ({error}), retrying in {:?}",
                        source.name, attempt, delay
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(error) => return Err(error),
            }
        }
    }
}

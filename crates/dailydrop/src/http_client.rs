//! Source page fetching.
//!
//! The pipeline only sees the [`SourceFetcher`] trait; [`HttpFetcher`] is the
//! reqwest-backed implementation with per-domain politeness delays.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use thiserror::Error;
use tracing::debug;

use crate::rate_limit::DomainRateLimiter;

/// Default user agent for source fetches.
pub const USER_AGENT: &str = concat!("dailydrop/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("invalid url '{0}'")]
    InvalidUrl(String),
    #[error("HTTP {status} from {url}")]
    Status { url: String, status: u16 },
    #[error("request to {url} failed: {message}")]
    Request { url: String, message: String },
    #[error("fetch of {url} timed out after {timeout:?}")]
    Timeout { url: String, timeout: Duration },
}

/// Fetches raw source content.
#[async_trait]
pub trait SourceFetcher: Send + Sync {
    /// Wait until a request to `url` is allowed. Not counted against the fetch timeout.
    async fn throttle(&self, _url: &str) -> Result<(), FetchError> {
        Ok(())
    }

    async fn fetch(&self, url: &str) -> Result<String, FetchError>;
}

/// Wait for the fetcher's slot, then bound the fetch itself by `timeout`;
/// expiry becomes [`FetchError::Timeout`].
pub async fn fetch_with_timeout(
    fetcher: &dyn SourceFetcher,
    url: &str,
    timeout: Duration,
) -> Result<String, FetchError> {
    fetcher.throttle(url).await?;
    match tokio::time::timeout(timeout, fetcher.fetch(url)).await {
        Ok(result) => result,
        Err(_) => Err(FetchError::Timeout {
            url: url.to_string(),
            timeout,
        }),
    }
}

/// reqwest-backed fetcher.
#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
    rate_limiter: DomainRateLimiter,
}

impl HttpFetcher {
    pub fn new(
        user_agent: &str,
        timeout: Duration,
        rate_limiter: DomainRateLimiter,
    ) -> Result<Self, FetchError> {
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .gzip(true)
            .brotli(true)
            .build()
            .map_err(|e| FetchError::Request {
                url: String::new(),
                message: e.to_string(),
            })?;
        Ok(Self {
            client,
            rate_limiter,
        })
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn rate_limiter(&self) -> &DomainRateLimiter {
        &self.rate_limiter
    }
}

#[async_trait]
impl SourceFetcher for HttpFetcher {
    async fn throttle(&self, url: &str) -> Result<(), FetchError> {
        self.rate_limiter
            .acquire(url)
            .await
            .map(|_| ())
            .ok_or_else(|| FetchError::InvalidUrl(url.to_string()))
    }

    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        let domain = DomainRateLimiter::extract_domain(url)
            .ok_or_else(|| FetchError::InvalidUrl(url.to_string()))?;

        debug!("GET {}", url);
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::Request {
                url: url.to_string(),
                message: e.to_string(),
            })?;

        let status = response.status().as_u16();
        self.rate_limiter.report_status(&domain, status).await;

        if !response.status().is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status,
            });
        }

        response.text().await.map_err(|e| FetchError::Request {
            url: url.to_string(),
            message: e.to_string(),
        })
    }
}

//! Extractors turn raw source pages into structured items.
//!
//! Every extractor is registered under a unique key in an
//! [`ExtractorRegistry`]. The pipeline never special-cases an extractor by
//! identity; it only queries declared capabilities such as
//! [`Extractor::lookback_days`].

mod configurable;
mod dates;
mod llm;
mod registry;

pub use configurable::{ConfigurableExtractor, ExtractorConfig};
pub use dates::parse_heading_date;
pub use llm::{LlmExtractor, LLM_EXTRACTOR_KEY};
pub use registry::{ExtractorRegistry, ExtractorRegistryBuilder, RegistryError, ResolvedBy, Resolution};

use async_trait::async_trait;
use chrono::NaiveDate;
use thiserror::Error;

use crate::models::Item;

/// Raw content of one fetched source page.
#[derive(Debug, Clone)]
pub struct SourceDocument {
    /// URL the content was fetched from (used to resolve relative links).
    pub url: String,
    pub body: String,
}

impl SourceDocument {
    pub fn new(url: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            body: body.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("invalid extractor configuration: {0}")]
    InvalidConfig(String),
    #[error("malformed source content: {0}")]
    Malformed(String),
    #[error("extractor unavailable: {0}")]
    Unavailable(String),
    #[error("extractor backend failed: {0}")]
    Backend(String),
}

/// Converts source content into items for a run date.
#[async_trait]
pub trait Extractor: Send + Sync {
    /// Registry key.
    fn key(&self) -> &str;

    /// Whether this extractor recognises the source URL.
    fn can_handle(&self, url: &str) -> bool;

    /// Extract link items.
    async fn extract(
        &self,
        document: &SourceDocument,
        run_date: NaiveDate,
    ) -> Result<Vec<Item>, ExtractionError>;

    fn supports_promo_codes(&self) -> bool {
        false
    }

    /// Extract promo code items. No-op unless [`Self::supports_promo_codes`].
    async fn extract_promo_codes(
        &self,
        _document: &SourceDocument,
        _run_date: NaiveDate,
    ) -> Result<Vec<Item>, ExtractionError> {
        Ok(Vec::new())
    }

    /// How many days before the run date this extractor's output may echo.
    ///
    /// 0 means every emitted item is dated on the run date.
    fn lookback_days(&self) -> u32 {
        0
    }

    /// Confidence reported to source monitoring (0.0 - 1.0).
    fn confidence(&self) -> f32 {
        1.0
    }
}

/// Host of a URL, lower-cased, without a leading `www.`.
pub(crate) fn url_host(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    let host = parsed.host_str()?.to_lowercase();
    Some(host.strip_prefix("www.").map(str::to_string).unwrap_or(host))
}

/// Whether `host` equals `pattern` or is a subdomain of it.
pub(crate) fn host_matches(host: &str, pattern: &str) -> bool {
    let pattern = pattern.trim().trim_start_matches("www.").to_lowercase();
    host == pattern || host.ends_with(&format!(".{}", pattern))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_host_strips_www() {
        assert_eq!(url_host("https://www.Example.com/a").as_deref(), Some("example.com"));
        assert_eq!(url_host("not a url"), None);
    }

    #[test]
    fn test_host_matches_subdomains() {
        assert!(host_matches("example.com", "example.com"));
        assert!(host_matches("news.example.com", "www.example.com"));
        assert!(!host_matches("badexample.com", "example.com"));
    }
}

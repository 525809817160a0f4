//! Scripted collaborators for tests.
//!
//! Compiled for unit tests and behind the `test-support` feature so
//! integration tests can drive the pipeline without network access.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use tokio::sync::Mutex;

use crate::extractors::{host_matches, url_host, ExtractionError, Extractor, SourceDocument};
use crate::http_client::{FetchError, SourceFetcher};
use crate::models::{Fingerprint, Item};
use crate::publisher::{PublishError, PublishReceipt, PublishRequest, Publisher};
use crate::repository::{FingerprintStore, StorageError};

/// Extractor returning canned items.
#[derive(Debug, Clone, Default)]
pub struct StaticExtractor {
    key: String,
    hosts: Vec<String>,
    items: Vec<Item>,
    items_by_url: HashMap<String, Vec<Item>>,
    codes: Vec<Item>,
    lookback_days: u32,
    failure: Option<String>,
}

impl StaticExtractor {
    pub fn new(key: &str) -> Self {
        Self {
            key: key.to_string(),
            ..Self::default()
        }
    }

    /// Auto-detect URLs on `host`.
    pub fn handling(mut self, host: &str) -> Self {
        self.hosts.push(host.to_string());
        self
    }

    /// Items returned for every document.
    pub fn with_items(mut self, items: Vec<Item>) -> Self {
        self.items = items;
        self
    }

    /// Items returned for one source URL only.
    pub fn with_items_for(mut self, url: &str, items: Vec<Item>) -> Self {
        self.items_by_url.insert(url.to_string(), items);
        self
    }

    /// Promo codes; also turns on promo code support.
    pub fn with_codes(mut self, codes: Vec<Item>) -> Self {
        self.codes = codes;
        self
    }

    pub fn with_lookback(mut self, days: u32) -> Self {
        self.lookback_days = days;
        self
    }

    /// Fail every extraction with a malformed-content error.
    pub fn failing(mut self, reason: &str) -> Self {
        self.failure = Some(reason.to_string());
        self
    }
}

#[async_trait]
impl Extractor for StaticExtractor {
    fn key(&self) -> &str {
        &self.key
    }

    fn can_handle(&self, url: &str) -> bool {
        url_host(url).is_some_and(|host| self.hosts.iter().any(|h| host_matches(&host, h)))
    }

    async fn extract(
        &self,
        document: &SourceDocument,
        _run_date: NaiveDate,
    ) -> Result<Vec<Item>, ExtractionError> {
        if let Some(reason) = &self.failure {
            return Err(ExtractionError::Malformed(reason.clone()));
        }
        Ok(self
            .items_by_url
            .get(&document.url)
            .unwrap_or(&self.items)
            .clone())
    }

    fn supports_promo_codes(&self) -> bool {
        !self.codes.is_empty()
    }

    async fn extract_promo_codes(
        &self,
        _document: &SourceDocument,
        _run_date: NaiveDate,
    ) -> Result<Vec<Item>, ExtractionError> {
        Ok(self.codes.clone())
    }

    fn lookback_days(&self) -> u32 {
        self.lookback_days
    }
}

/// Fetcher serving canned pages. Unknown URLs answer HTTP 404.
#[derive(Debug, Default)]
pub struct StaticFetcher {
    pages: HashMap<String, String>,
    statuses: HashMap<String, u16>,
    stalled: HashSet<String>,
}

impl StaticFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(mut self, url: &str, body: &str) -> Self {
        self.pages.insert(url.to_string(), body.to_string());
        self
    }

    /// Answer `url` with an HTTP error status.
    pub fn status(mut self, url: &str, status: u16) -> Self {
        self.statuses.insert(url.to_string(), status);
        self
    }

    /// Never answer `url`.
    pub fn stalled(mut self, url: &str) -> Self {
        self.stalled.insert(url.to_string());
        self
    }
}

#[async_trait]
impl SourceFetcher for StaticFetcher {
    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        if self.stalled.contains(url) {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        if let Some(status) = self.statuses.get(url) {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: *status,
            });
        }
        self.pages
            .get(url)
            .cloned()
            .ok_or_else(|| FetchError::Status {
                url: url.to_string(),
                status: 404,
            })
    }
}

/// Publisher recording requests, failing for chosen targets or post ids.
#[derive(Debug, Default)]
pub struct ScriptedPublisher {
    published: Mutex<Vec<PublishRequest>>,
    failing_targets: HashSet<String>,
    failing_posts: HashSet<i64>,
}

impl ScriptedPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_target(mut self, target: &str) -> Self {
        self.failing_targets.insert(target.to_string());
        self
    }

    pub fn failing_post(mut self, post_id: i64) -> Self {
        self.failing_posts.insert(post_id);
        self
    }

    /// Successful requests, in arrival order.
    pub async fn published(&self) -> Vec<PublishRequest> {
        self.published.lock().await.clone()
    }

    pub async fn published_to(&self, target: &str) -> Vec<PublishRequest> {
        self.published()
            .await
            .into_iter()
            .filter(|r| r.target == target)
            .collect()
    }
}

#[async_trait]
impl Publisher for ScriptedPublisher {
    async fn publish(&self, request: &PublishRequest) -> Result<PublishReceipt, PublishError> {
        if self.failing_targets.contains(&request.target)
            || self.failing_posts.contains(&request.post_id)
        {
            return Err(PublishError::Rejected {
                target: request.target.clone(),
                status: 500,
                message: "scripted failure".to_string(),
            });
        }
        self.published.lock().await.push(request.clone());
        Ok(PublishReceipt {
            target: request.target.clone(),
            post_id: request.post_id,
            items_published: request.items.len(),
            link: None,
        })
    }
}

/// Fingerprint store that is always down.
#[derive(Debug, Default)]
pub struct UnavailableFingerprints;

#[async_trait]
impl FingerprintStore for UnavailableFingerprints {
    async fn get_known(
        &self,
        _post_ref: &str,
        _date: NaiveDate,
        _target: &str,
    ) -> Result<HashSet<Fingerprint>, StorageError> {
        Err(StorageError::Unavailable("fingerprint store offline".into()))
    }

    async fn upsert(
        &self,
        _post_ref: &str,
        _date: NaiveDate,
        _target: &str,
        _fingerprints: &[Fingerprint],
    ) -> Result<usize, StorageError> {
        Err(StorageError::Unavailable("fingerprint store offline".into()))
    }
}

//! Per-post configuration: where to harvest from and where to publish to.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default retention of published sections, in days.
pub const DEFAULT_DAYS_TO_KEEP: u32 = 7;

/// Default timezone for run-date computation.
pub const DEFAULT_TIMEZONE: &str = "UTC";

/// Which item kinds a post harvests and publishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMode {
    #[default]
    Links,
    PromoCodes,
    Both,
}

impl ExtractionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Links => "links",
            Self::PromoCodes => "promo_codes",
            Self::Both => "both",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "links" => Some(Self::Links),
            "promo_codes" | "codes" => Some(Self::PromoCodes),
            "both" => Some(Self::Both),
            _ => None,
        }
    }

    pub fn wants_links(&self) -> bool {
        matches!(self, Self::Links | Self::Both)
    }

    pub fn wants_promo_codes(&self) -> bool {
        matches!(self, Self::PromoCodes | Self::Both)
    }
}

/// One scraped URL and the extractor that should read it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceConfig {
    pub url: String,
    /// Registry key; absent means auto-detect, then the default extractor.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extractor: Option<String>,
}

impl SourceConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            extractor: None,
        }
    }

    pub fn with_extractor(mut self, key: impl Into<String>) -> Self {
        self.extractor = Some(key.into());
        self
    }
}

/// Errors raised when a post config document is malformed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigValidationError {
    #[error("post config needs a content slug or a legacy post id")]
    MissingIdentity,
    #[error("content slug must not be empty")]
    EmptySlug,
    #[error("unknown timezone '{0}'")]
    UnknownTimezone(String),
    #[error("source #{index} has an invalid url '{url}'")]
    InvalidSourceUrl { index: usize, url: String },
    #[error("target '{0}' maps to a non-positive post id")]
    InvalidTargetPostId(String),
    #[error("legacy post id {0} must be positive")]
    InvalidPostId(i64),
}

/// Aggregate root for one logical piece of published content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostConfig {
    /// Stable human-assigned identifier (preferred key).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_slug: Option<String>,
    /// Legacy single-post numeric id (fallback key and fallback target id).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_id: Option<i64>,
    #[serde(default)]
    pub source_urls: Vec<SourceConfig>,
    /// Concrete post id of this content on each target site.
    #[serde(default)]
    pub site_target_post_ids: BTreeMap<String, i64>,
    #[serde(default)]
    pub extraction_mode: ExtractionMode,
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default = "default_days_to_keep")]
    pub days_to_keep: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub button_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section_title: Option<String>,
    /// Set by the pipeline after a successful publish; nothing else is mutated by a run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,
}

fn default_timezone() -> String {
    DEFAULT_TIMEZONE.to_string()
}

fn default_days_to_keep() -> u32 {
    DEFAULT_DAYS_TO_KEEP
}

impl PostConfig {
    /// Create a config keyed by content slug.
    pub fn with_slug(slug: impl Into<String>) -> Self {
        Self {
            content_slug: Some(slug.into()),
            ..Self::empty()
        }
    }

    /// Create a config keyed by a legacy post id.
    pub fn with_post_id(post_id: i64) -> Self {
        Self {
            post_id: Some(post_id),
            ..Self::empty()
        }
    }

    fn empty() -> Self {
        Self {
            content_slug: None,
            post_id: None,
            source_urls: Vec::new(),
            site_target_post_ids: BTreeMap::new(),
            extraction_mode: ExtractionMode::default(),
            timezone: default_timezone(),
            days_to_keep: default_days_to_keep(),
            button_title: None,
            section_title: None,
            last_updated: None,
        }
    }

    /// Stable key used for fingerprints and batch bookkeeping: slug, else legacy id.
    pub fn storage_key(&self) -> String {
        match (&self.content_slug, self.post_id) {
            (Some(slug), _) => slug.clone(),
            (None, Some(id)) => id.to_string(),
            (None, None) => String::new(),
        }
    }

    /// Whether `post_ref` names this config (slug first, then legacy id).
    pub fn matches_ref(&self, post_ref: &str) -> bool {
        if self.content_slug.as_deref() == Some(post_ref) {
            return true;
        }
        match (self.post_id, post_ref.parse::<i64>()) {
            (Some(id), Ok(wanted)) => id == wanted,
            _ => false,
        }
    }

    pub fn tz(&self) -> Result<Tz, ConfigValidationError> {
        self.timezone
            .parse::<Tz>()
            .map_err(|_| ConfigValidationError::UnknownTimezone(self.timezone.clone()))
    }

    /// Today's date in the post's timezone.
    pub fn run_date(&self, now: DateTime<Utc>) -> NaiveDate {
        match self.tz() {
            Ok(tz) => now.with_timezone(&tz).date_naive(),
            Err(_) => now.date_naive(),
        }
    }

    /// Reject documents that cannot drive a pipeline run.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if let Some(slug) = &self.content_slug {
            if slug.trim().is_empty() {
                return Err(ConfigValidationError::EmptySlug);
            }
        } else if self.post_id.is_none() {
            return Err(ConfigValidationError::MissingIdentity);
        }
        if let Some(id) = self.post_id.filter(|id| *id <= 0) {
            return Err(ConfigValidationError::InvalidPostId(id));
        }

        self.tz()?;

        for (index, source) in self.source_urls.iter().enumerate() {
            let parsed = url::Url::parse(&source.url);
            let ok = parsed.is_ok_and(|u| matches!(u.scheme(), "http" | "https"));
            if !ok {
                return Err(ConfigValidationError::InvalidSourceUrl {
                    index,
                    url: source.url.clone(),
                });
            }
        }

        for (target, id) in &self.site_target_post_ids {
            if *id <= 0 {
                return Err(ConfigValidationError::InvalidTargetPostId(target.clone()));
            }
        }

        Ok(())
    }
}

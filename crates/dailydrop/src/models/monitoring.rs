//! Source monitoring events produced by each pipeline run.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Outcome of harvesting one source URL during one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceMonitoringEvent {
    pub post_ref: String,
    pub source_url: String,
    /// Registry key of the extractor that read the page.
    pub extractor: String,
    pub date: NaiveDate,
    pub items_found: usize,
    pub confidence: f32,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

impl SourceMonitoringEvent {
    /// A successful extraction.
    pub fn success(
        post_ref: &str,
        source_url: &str,
        extractor: &str,
        date: NaiveDate,
        items_found: usize,
        confidence: f32,
    ) -> Self {
        Self {
            post_ref: post_ref.to_string(),
            source_url: source_url.to_string(),
            extractor: extractor.to_string(),
            date,
            items_found,
            confidence,
            success: true,
            error: None,
            recorded_at: Utc::now(),
        }
    }

    /// A failed fetch or extraction.
    pub fn failure(
        post_ref: &str,
        source_url: &str,
        extractor: &str,
        date: NaiveDate,
        error: &str,
    ) -> Self {
        Self {
            post_ref: post_ref.to_string(),
            source_url: source_url.to_string(),
            extractor: extractor.to_string(),
            date,
            items_found: 0,
            confidence: 0.0,
            success: false,
            error: Some(error.to_string()),
            recorded_at: Utc::now(),
        }
    }
}

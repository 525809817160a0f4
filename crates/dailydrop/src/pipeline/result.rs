//! Structured outcome of one pipeline run.

use chrono::NaiveDate;
use serde::{Serialize, Serializer};
use thiserror::Error;

use crate::extractors::{ExtractionError, ResolvedBy};
use crate::http_client::FetchError;
use crate::models::{Item, PostRunStatus};
use crate::publisher::PublishError;
use crate::target::TargetError;

/// Why one source contributed nothing.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Extraction(#[from] ExtractionError),
}

/// Why one target was not updated.
#[derive(Debug, Error)]
pub enum TargetFailure {
    #[error(transparent)]
    Unresolved(#[from] TargetError),
    #[error(transparent)]
    Publish(#[from] PublishError),
    #[error("every source failed; nothing to publish")]
    NoSourceSucceeded,
}

fn display<E: std::fmt::Display, S: Serializer>(
    error: &Option<E>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match error {
        Some(e) => serializer.serialize_some(&e.to_string()),
        None => serializer.serialize_none(),
    }
}

#[derive(Debug, Serialize)]
pub struct SourceResult {
    pub url: String,
    /// Registry key of the extractor used.
    pub extractor: String,
    pub resolved_by: ResolvedBy,
    pub items: Vec<Item>,
    #[serde(serialize_with = "display", skip_serializing_if = "Option::is_none")]
    pub error: Option<SourceError>,
}

impl SourceResult {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetStatus {
    Success,
    NoChanges,
    Failed,
}

#[derive(Debug, Serialize)]
pub struct TargetOutcome {
    pub target: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub post_id: Option<i64>,
    pub status: TargetStatus,
    /// Items published (and persisted) for this target.
    pub added: usize,
    /// Candidates before deduplication.
    pub candidates: usize,
    pub message: String,
    #[serde(serialize_with = "display", skip_serializing_if = "Option::is_none")]
    pub error: Option<TargetFailure>,
}

impl TargetOutcome {
    pub(crate) fn failed(target: &str, post_id: Option<i64>, error: TargetFailure) -> Self {
        Self {
            target: target.to_string(),
            post_id,
            status: TargetStatus::Failed,
            added: 0,
            candidates: 0,
            message: error.to_string(),
            error: Some(error),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PipelineResult {
    pub post_ref: String,
    pub run_date: NaiveDate,
    /// Lookback applied to every target in this run.
    pub lookback_days: u32,
    pub sources: Vec<SourceResult>,
    pub targets: Vec<TargetOutcome>,
}

impl PipelineResult {
    /// Any target `Success` wins, else any `Failed`, else `NoChanges`.
    pub fn status(&self) -> PostRunStatus {
        if self
            .targets
            .iter()
            .any(|t| t.status == TargetStatus::Success)
        {
            PostRunStatus::Success
        } else if self
            .targets
            .iter()
            .any(|t| t.status == TargetStatus::Failed)
        {
            PostRunStatus::Failed
        } else {
            PostRunStatus::NoChanges
        }
    }

    pub fn source_errors(&self) -> impl Iterator<Item = &SourceResult> {
        self.sources.iter().filter(|s| !s.is_ok())
    }

    pub fn target(&self, key: &str) -> Option<&TargetOutcome> {
        self.targets.iter().find(|t| t.target == key)
    }

    pub fn items_added(&self) -> usize {
        self.targets.iter().map(|t| t.added).sum()
    }

    /// One-line summary, e.g. "this: Added 2 links; casino: No new items".
    pub fn summary(&self) -> String {
        match self.targets.as_slice() {
            [] => "No targets".to_string(),
            [only] => only.message.clone(),
            many => many
                .iter()
                .map(|t| format!("{}: {}", t.target, t.message))
                .collect::<Vec<_>>()
                .join("; "),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::parse_iso_date;

    fn outcome(target: &str, status: TargetStatus) -> TargetOutcome {
        TargetOutcome {
            target: target.into(),
            post_id: Some(1),
            status,
            added: usize::from(status == TargetStatus::Success),
            candidates: 1,
            message: status_message(status).into(),
            error: None,
        }
    }

    fn status_message(status: TargetStatus) -> &'static str {
        match status {
            TargetStatus::Success => "Added 1 link",
            TargetStatus::NoChanges => "No new items",
            TargetStatus::Failed => "boom",
        }
    }

    fn result(targets: Vec<TargetOutcome>) -> PipelineResult {
        PipelineResult {
            post_ref: "p".into(),
            run_date: parse_iso_date("2025-10-26").unwrap(),
            lookback_days: 0,
            sources: Vec::new(),
            targets,
        }
    }

    #[test]
    fn test_status_aggregation() {
        use TargetStatus::*;
        assert_eq!(
            result(vec![outcome("a", Failed), outcome("b", Success)]).status(),
            PostRunStatus::Success
        );
        assert_eq!(
            result(vec![outcome("a", Failed), outcome("b", NoChanges)]).status(),
            PostRunStatus::Failed
        );
        assert_eq!(
            result(vec![outcome("a", NoChanges)]).status(),
            PostRunStatus::NoChanges
        );
    }

    #[test]
    fn test_summary() {
        let single = result(vec![outcome("this", TargetStatus::Success)]);
        assert_eq!(single.summary(), "Added 1 link");
        let many = result(vec![
            outcome("this", TargetStatus::Success),
            outcome("casino", TargetStatus::NoChanges),
        ]);
        assert_eq!(many.summary(), "this: Added 1 link; casino: No new items");
        assert_eq!(many.items_added(), 1);
    }

    #[test]
    fn test_json_renders_errors_as_text() {
        let mut failed = outcome("casino", TargetStatus::Failed);
        failed.error = Some(TargetFailure::NoSourceSucceeded);
        let json = serde_json::to_value(result(vec![failed])).unwrap();
        assert_eq!(
            json["targets"][0]["error"],
            "every source failed; nothing to publish"
        );
        assert_eq!(json["targets"][0]["status"], "failed");
    }
}

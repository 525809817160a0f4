//! Progress events emitted while a pipeline run advances.

use chrono::NaiveDate;

use crate::models::PostRunStatus;

/// Events sent over the run's `mpsc` channel.
///
/// The batch orchestrator turns these into log lines and progress percent.
#[derive(Debug, Clone)]
pub enum PipelineEvent {
    Started {
        post_ref: String,
        run_date: NaiveDate,
        sources: usize,
        targets: Vec<String>,
    },
    SourceFetched {
        url: String,
        bytes: usize,
    },
    SourceExtracted {
        url: String,
        extractor: String,
        items: usize,
    },
    SourceFailed {
        url: String,
        error: String,
    },
    TargetDeduped {
        target: String,
        candidates: usize,
        new_items: usize,
    },
    TargetPublished {
        target: String,
        post_id: i64,
        summary: String,
    },
    TargetUnchanged {
        target: String,
    },
    TargetFailed {
        target: String,
        error: String,
    },
    Finished {
        status: PostRunStatus,
        summary: String,
    },
}

impl PipelineEvent {
    /// Human-readable log line.
    pub fn describe(&self) -> String {
        match self {
            Self::Started {
                post_ref,
                run_date,
                sources,
                targets,
            } => format!(
                "Starting {} for {}: {} source(s) -> {}",
                post_ref,
                run_date,
                sources,
                targets.join(", ")
            ),
            Self::SourceFetched { url, bytes } => format!("Fetched {} ({} bytes)", url, bytes),
            Self::SourceExtracted {
                url,
                extractor,
                items,
            } => format!("Extracted {} item(s) from {} with {}", items, url, extractor),
            Self::SourceFailed { url, error } => format!("Source {} failed: {}", url, error),
            Self::TargetDeduped {
                target,
                candidates,
                new_items,
            } => format!(
                "[{}] {} new of {} candidate item(s)",
                target, new_items, candidates
            ),
            Self::TargetPublished {
                target,
                post_id,
                summary,
            } => format!("[{}] {} to post {}", target, summary, post_id),
            Self::TargetUnchanged { target } => format!("[{}] No new items", target),
            Self::TargetFailed { target, error } => format!("[{}] Failed: {}", target, error),
            Self::Finished { status, summary } => {
                format!("Finished ({}): {}", status.as_str(), summary)
            }
        }
    }

    /// Whether this event closes out one source.
    pub fn is_source_result(&self) -> bool {
        matches!(self, Self::SourceExtracted { .. } | Self::SourceFailed { .. })
    }

    /// Whether this event closes out one target.
    pub fn is_target_result(&self) -> bool {
        matches!(
            self,
            Self::TargetPublished { .. } | Self::TargetUnchanged { .. } | Self::TargetFailed { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe() {
        let event = PipelineEvent::TargetPublished {
            target: "casino".into(),
            post_id: 89,
            summary: "Added 2 links".into(),
        };
        assert_eq!(event.describe(), "[casino] Added 2 links to post 89");
        assert!(event.is_target_result());
        assert!(!event.is_source_result());

        let event = PipelineEvent::SourceFailed {
            url: "https://x/a".into(),
            error: "HTTP 503 from https://x/a".into(),
        };
        assert_eq!(
            event.describe(),
            "Source https://x/a failed: HTTP 503 from https://x/a"
        );
    }
}

//! Run state models for batch tracking.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle of one post inside a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PostRunStatus {
    Queued,
    Running,
    Success,
    Failed,
    NoChanges,
}

impl PostRunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Success => "success",
            Self::Failed => "failed",
            Self::NoChanges => "no_changes",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "queued" => Some(Self::Queued),
            "running" => Some(Self::Running),
            "success" => Some(Self::Success),
            "failed" => Some(Self::Failed),
            "no_changes" => Some(Self::NoChanges),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Failed | Self::NoChanges)
    }
}

/// Aggregate status of a whole batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    Queued,
    Running,
    Success,
    PartialSuccess,
    Failed,
}

impl BatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Success => "success",
            Self::PartialSuccess => "partial_success",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::PartialSuccess | Self::Failed)
    }
}

/// Live state of one post inside a batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostRunState {
    pub post_ref: String,
    pub status: PostRunStatus,
    pub progress_percent: u8,
    pub message: String,
    pub log_lines: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl PostRunState {
    pub fn queued(post_ref: &str) -> Self {
        Self {
            post_ref: post_ref.to_string(),
            status: PostRunStatus::Queued,
            progress_percent: 0,
            message: "Queued".to_string(),
            log_lines: Vec::new(),
            started_at: None,
            finished_at: None,
        }
    }
}

/// Per-status post counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchCounts {
    pub queued: usize,
    pub running: usize,
    /// Posts that finished with `Success` or `NoChanges`.
    pub succeeded: usize,
    pub failed: usize,
    /// Subset of `succeeded` that had nothing new.
    pub no_changes: usize,
}

impl BatchCounts {
    pub fn tally<'a>(statuses: impl IntoIterator<Item = &'a PostRunStatus>) -> Self {
        let mut counts = Self::default();
        for status in statuses {
            match status {
                PostRunStatus::Queued => counts.queued += 1,
                PostRunStatus::Running => counts.running += 1,
                PostRunStatus::Success => counts.succeeded += 1,
                PostRunStatus::NoChanges => {
                    counts.succeeded += 1;
                    counts.no_changes += 1;
                }
                PostRunStatus::Failed => counts.failed += 1,
            }
        }
        counts
    }

    pub fn total(&self) -> usize {
        self.queued + self.running + self.succeeded + self.failed
    }

    /// Pure aggregation of post states into a batch status.
    pub fn status(&self) -> BatchStatus {
        let total = self.total();
        if total == 0 || self.queued == total {
            BatchStatus::Queued
        } else if self.queued + self.running > 0 {
            BatchStatus::Running
        } else if self.failed == total {
            BatchStatus::Failed
        } else if self.failed > 0 {
            BatchStatus::PartialSuccess
        } else {
            BatchStatus::Success
        }
    }
}

/// Point-in-time snapshot of a batch run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchRun {
    pub request_id: uuid::Uuid,
    pub post_ids: Vec<String>,
    /// Target key or "all".
    pub target: String,
    pub initiator: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    pub status: BatchStatus,
    pub counts: BatchCounts,
    /// Post states in submission order.
    pub posts: Vec<PostRunState>,
}

impl BatchRun {
    pub fn post(&self, post_ref: &str) -> Option<&PostRunState> {
        self.posts.iter().find(|p| p.post_ref == post_ref)
    }
}

//! Helper utilities for CLI commands.

use anyhow::Context;
use chrono::NaiveDate;
use console::{style, StyledObject};

use dailydrop::config::{Config, Settings};
use dailydrop::context::AppContext;
use dailydrop::models::{parse_iso_date, BatchStatus, PostRunStatus};

/// Open stores and wire the pipeline.
pub async fn open_context(settings: Settings, config: Config) -> anyhow::Result<AppContext> {
    let data_dir = settings.data_dir.clone();
    AppContext::new(settings, config)
        .await
        .with_context(|| format!("failed to open dailydrop data in {}", data_dir.display()))
}

/// Parse an optional `YYYY-MM-DD` argument.
pub fn parse_date_arg(value: Option<&str>) -> anyhow::Result<Option<NaiveDate>> {
    value
        .map(|v| parse_iso_date(v).with_context(|| format!("invalid date '{}', expected YYYY-MM-DD", v)))
        .transpose()
}

/// Truncate a string to a maximum length, adding "..." if truncated.
pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

pub fn post_status_label(status: PostRunStatus) -> StyledObject<&'static str> {
    match status {
        PostRunStatus::Success => style("success").green(),
        PostRunStatus::NoChanges => style("no changes").dim(),
        PostRunStatus::Failed => style("failed").red(),
        PostRunStatus::Running => style("running").cyan(),
        PostRunStatus::Queued => style("queued").dim(),
    }
}

pub fn batch_status_label(status: BatchStatus) -> StyledObject<&'static str> {
    match status {
        BatchStatus::Success => style("success").green(),
        BatchStatus::PartialSuccess => style("partial success").yellow(),
        BatchStatus::Failed => style("failed").red(),
        BatchStatus::Running => style("running").cyan(),
        BatchStatus::Queued => style("queued").dim(),
    }
}

/// Status icon used at the start of result lines.
pub fn post_status_icon(status: PostRunStatus) -> StyledObject<&'static str> {
    match status {
        PostRunStatus::Success => style("✓").green(),
        PostRunStatus::NoChanges => style("=").dim(),
        PostRunStatus::Failed => style("✗").red(),
        PostRunStatus::Running | PostRunStatus::Queued => style("→").cyan(),
    }
}

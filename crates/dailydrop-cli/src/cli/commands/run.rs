//! Single-post run command.

use std::time::Duration;

use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::mpsc;

use dailydrop::config::{Config, Settings};
use dailydrop::pipeline::{PipelineEvent, PipelineResult, TargetStatus};
use dailydrop::target::TargetSelector;

use super::helpers::{open_context, parse_date_arg, post_status_icon, post_status_label, truncate};

/// Run the pipeline for one post, streaming events under a spinner.
pub async fn cmd_run(
    settings: Settings,
    config: Config,
    post_ref: &str,
    target: &str,
    date: Option<&str>,
    json: bool,
) -> anyhow::Result<()> {
    let run_date = parse_date_arg(date)?;
    let selector = TargetSelector::parse(target);
    let ctx = open_context(settings, config).await?;

    let spinner = if json {
        ProgressBar::hidden()
    } else {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.cyan} {wide_msg}")?,
        );
        bar.set_message(format!("Running {}", post_ref));
        bar.enable_steady_tick(Duration::from_millis(100));
        bar
    };

    let (tx, mut rx) = mpsc::channel::<PipelineEvent>(64);
    let printer = {
        let spinner = spinner.clone();
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                if event.is_source_result() || event.is_target_result() {
                    spinner.println(format!("  {}", event.describe()));
                }
                spinner.set_message(truncate(&event.describe(), 70));
            }
        })
    };

    let result = ctx
        .pipeline()
        .run_with_events(post_ref, &selector, run_date, &tx)
        .await;
    drop(tx);
    let _ = printer.await;
    spinner.finish_and_clear();

    let result = result?;
    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_result(&result);
    }
    Ok(())
}

fn print_result(result: &PipelineResult) {
    let status = result.status();
    println!(
        "\n{} {} for {} ({})",
        post_status_icon(status),
        style(&result.post_ref).bold(),
        result.run_date,
        post_status_label(status)
    );

    let failed_sources = result.source_errors().count();
    println!(
        "  Sources: {} ok, {} failed (lookback {}d)",
        result.sources.len() - failed_sources,
        failed_sources,
        result.lookback_days
    );

    for outcome in &result.targets {
        let icon = match outcome.status {
            TargetStatus::Success => style("✓").green(),
            TargetStatus::NoChanges => style("=").dim(),
            TargetStatus::Failed => style("✗").red(),
        };
        let post_id = outcome
            .post_id
            .map(|id| format!("post {}", id))
            .unwrap_or_else(|| "unresolved".to_string());
        println!(
            "  {} [{}] {} ({}, {} candidate(s))",
            icon, outcome.target, outcome.message, post_id, outcome.candidates
        );
    }
}

//! Batch command: submit many posts and follow them to completion.

use std::collections::HashSet;
use std::time::Duration;

use console::style;
use tracing::debug;
use uuid::Uuid;

use dailydrop::batch::{BatchManager, SubmitOutcome};
use dailydrop::config::{Config, Settings};
use dailydrop::models::{BatchRun, PostRunStatus};
use dailydrop::target::TargetSelector;

use super::helpers::{batch_status_label, open_context, parse_date_arg, post_status_icon};
use crate::cli::progress::BatchProgress;

const POLL_INTERVAL: Duration = Duration::from_millis(250);

pub struct BatchArgs {
    pub post_refs: Vec<String>,
    pub all: bool,
    pub target: String,
    pub date: Option<String>,
    pub workers: Option<usize>,
    pub sync: bool,
    pub tail: usize,
    pub json: bool,
}

/// Submit a batch; follow it with live progress unless `--sync` or `--json`.
pub async fn cmd_batch(settings: Settings, config: Config, args: BatchArgs) -> anyhow::Result<()> {
    let run_date = parse_date_arg(args.date.as_deref())?;
    let selector = TargetSelector::parse(&args.target);
    let ctx = open_context(settings, config).await?;

    let mut post_refs = args.post_refs;
    if args.all {
        for post in ctx.stores.configs.list_configs().await? {
            post_refs.push(post.storage_key());
        }
    }
    if post_refs.is_empty() {
        println!(
            "{} No posts given. Pass post refs or use --all.",
            style("!").yellow()
        );
        return Ok(());
    }

    let manager = ctx.batch_manager(args.workers);
    let blocking = args.sync || args.json;
    debug!(
        "Submitting {} post(s) to '{}' (sync: {})",
        post_refs.len(),
        selector.as_str(),
        blocking
    );
    let outcome = manager
        .submit_for_date(post_refs, &selector, "cli", run_date, blocking)
        .await?;

    let run = match outcome {
        SubmitOutcome::Completed(run) => run,
        SubmitOutcome::Queued(request_id) => {
            println!(
                "{} Batch {} queued ({} worker(s))",
                style("→").cyan(),
                request_id,
                manager.options().workers
            );
            follow(&manager, request_id).await?
        }
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&run)?);
        return Ok(());
    }
    print_summary(&manager, &run, args.tail).await;
    Ok(())
}

/// Poll the batch until every post is terminal, drawing progress bars.
async fn follow(manager: &BatchManager, request_id: Uuid) -> anyhow::Result<BatchRun> {
    let Some(initial) = manager.status(request_id).await else {
        anyhow::bail!("batch {} disappeared", request_id);
    };
    let progress = BatchProgress::new(&initial)?;
    let mut reported = HashSet::new();

    let run = loop {
        let Some(run) = manager.status(request_id).await else {
            anyhow::bail!("batch {} disappeared", request_id);
        };
        progress.update(&run);

        for post in &run.posts {
            if post.status.is_terminal() && reported.insert(post.post_ref.clone()) {
                progress.println(&format!(
                    "  {} {}: {}",
                    post_status_icon(post.status),
                    post.post_ref,
                    post.message
                ));
            }
        }

        if run.finished_at.is_some() {
            break run;
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    };

    progress.finish();
    Ok(run)
}

async fn print_summary(manager: &BatchManager, run: &BatchRun, tail: usize) {
    let elapsed = run
        .finished_at
        .map(|end| (end - run.created_at).num_milliseconds() as f64 / 1000.0)
        .unwrap_or_default();

    let icon = if run.counts.failed > 0 {
        style("!").yellow()
    } else {
        style("✓").green()
    };
    println!(
        "\n{} Batch {} {} in {:.1}s",
        icon,
        run.request_id,
        batch_status_label(run.status),
        elapsed
    );
    println!(
        "  Posts: {} | Succeeded: {} ({} unchanged) | Failed: {}",
        run.posts.len(),
        run.counts.succeeded,
        run.counts.no_changes,
        run.counts.failed
    );

    for post in run.posts.iter().filter(|p| p.status == PostRunStatus::Failed) {
        println!(
            "\n{} {}: {}",
            style("✗").red(),
            style(&post.post_ref).bold(),
            post.message
        );
        let lines = manager
            .logs(run.request_id, &post.post_ref, tail)
            .await
            .unwrap_or_default();
        for line in lines {
            println!("    {}", style(line).dim());
        }
    }
}

//! Fingerprint inspection command.

use chrono::Utc;
use console::style;

use dailydrop::config::{Config, Settings};

use super::helpers::{open_context, parse_date_arg};

/// Show the fingerprints recorded for a post and target across a date window.
pub async fn cmd_fingerprints(
    settings: Settings,
    config: Config,
    post_ref: &str,
    target: &str,
    date: Option<&str>,
    lookback: u32,
) -> anyhow::Result<()> {
    let ctx = open_context(settings, config).await?;
    let Some(post) = ctx.stores.configs.get_config(post_ref).await? else {
        println!("{} Post '{}' not found", style("✗").red(), post_ref);
        return Ok(());
    };

    let run_date = match parse_date_arg(date)? {
        Some(d) => d,
        None => post.run_date(Utc::now()),
    };
    let key = post.storage_key();
    let known = ctx
        .pipeline()
        .dedup()
        .known_fingerprints(&key, target, run_date, lookback)
        .await?;

    println!(
        "\n{} {} / {} on {} (+{}d lookback)",
        style("Fingerprints").bold(),
        key,
        target,
        run_date,
        lookback
    );
    println!("{}", "-".repeat(60));

    if known.is_empty() {
        println!("  {}", style("(none)").dim());
        return Ok(());
    }

    let mut sorted: Vec<String> = known.into_iter().map(|f| f.into_string()).collect();
    sorted.sort();
    for fingerprint in &sorted {
        println!("  {}", fingerprint);
    }
    println!("\n{} fingerprint(s)", sorted.len());

    Ok(())
}

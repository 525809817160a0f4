//! Post config management commands.

use std::path::Path;

use anyhow::Context;
use console::style;

use dailydrop::config::{Config, Settings};
use dailydrop::context::AppContext;
use dailydrop::models::PostConfig;

use super::helpers::{open_context, truncate};

/// Save each config, reporting rejected documents without stopping.
pub async fn import_posts(ctx: &AppContext, posts: Vec<PostConfig>) -> anyhow::Result<usize> {
    let mut imported = 0;
    for post in posts {
        let key = post.storage_key();
        match ctx.stores.configs.save_config(&post).await {
            Ok(()) => {
                imported += 1;
                println!("  {} Imported post: {}", style("✓").green(), key);
            }
            Err(e) => println!("  {} Skipped post '{}': {}", style("✗").red(), key, e),
        }
    }
    Ok(imported)
}

/// List stored post configs.
pub async fn cmd_post_list(settings: Settings, config: Config) -> anyhow::Result<()> {
    let ctx = open_context(settings, config).await?;
    let posts = ctx.stores.configs.list_configs().await?;

    if posts.is_empty() {
        println!(
            "{} No posts stored. Run 'dailydrop post import' first.",
            style("!").yellow()
        );
        return Ok(());
    }

    println!("\n{}", style("Posts").bold());
    println!("{}", "-".repeat(78));
    println!(
        "{:<20} {:<8} {:<8} {:<24} Last Updated",
        "Key", "Sources", "Mode", "Targets"
    );
    println!("{}", "-".repeat(78));

    for post in posts {
        let targets: Vec<String> = post
            .site_target_post_ids
            .iter()
            .map(|(k, id)| format!("{}={}", k, id))
            .collect();
        let last_updated = post
            .last_updated
            .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "Never".to_string());

        println!(
            "{:<20} {:<8} {:<8} {:<24} {}",
            truncate(&post.storage_key(), 19),
            post.source_urls.len(),
            post.extraction_mode.as_str(),
            truncate(&targets.join(","), 23),
            last_updated
        );
    }

    Ok(())
}

/// Print one post config as JSON.
pub async fn cmd_post_show(settings: Settings, config: Config, post_ref: &str) -> anyhow::Result<()> {
    let ctx = open_context(settings, config).await?;
    match ctx.stores.configs.get_config(post_ref).await? {
        Some(post) => println!("{}", serde_json::to_string_pretty(&post)?),
        None => println!("{} Post '{}' not found", style("✗").red(), post_ref),
    }
    Ok(())
}

/// Import post configs from `file`, or from the `[[posts]]` of the loaded config.
pub async fn cmd_post_import(
    settings: Settings,
    config: Config,
    file: Option<&Path>,
) -> anyhow::Result<()> {
    let posts = match file {
        Some(path) => {
            // Command-line paths are relative to the shell, not the config file.
            let path = config.resolve_path(&path.to_string_lossy(), &std::env::current_dir()?);
            println!("{} Reading posts from {}", style("→").cyan(), path.display());
            Config::load_posts(&path)
                .await
                .with_context(|| format!("failed to import posts from {}", path.display()))?
        }
        None => config.posts.clone(),
    };

    if posts.is_empty() {
        println!("{} No posts to import", style("!").yellow());
        return Ok(());
    }

    let total = posts.len();
    let ctx = open_context(settings, config).await?;
    let imported = import_posts(&ctx, posts).await?;
    println!(
        "{} Imported {}/{} post(s)",
        style("✓").green(),
        imported,
        total
    );
    Ok(())
}

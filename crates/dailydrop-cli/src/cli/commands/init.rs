//! Initialize command.

use console::style;

use dailydrop::config::{Config, Settings};

use super::helpers::open_context;
use super::post::import_posts;

/// Initialize the data directory and database, then import configured posts.
pub async fn cmd_init(settings: Settings, config: Config) -> anyhow::Result<()> {
    settings.ensure_directories()?;

    println!("{} Creating schema...", style("→").cyan());
    let posts = config.posts.clone();
    let ctx = open_context(settings, config).await?;

    if posts.is_empty() {
        println!(
            "{} No posts configured in dailydrop.toml",
            style("!").yellow()
        );
        println!("  Add [[posts]] entries or run 'dailydrop post import --file <path>'");
    } else {
        import_posts(&ctx, posts).await?;
    }

    let location = if ctx.settings.uses_memory_store() {
        "memory".to_string()
    } else {
        ctx.settings.database_path().display().to_string()
    };
    println!("{} Initialized dailydrop in {}", style("✓").green(), location);

    Ok(())
}

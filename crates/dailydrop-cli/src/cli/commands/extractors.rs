//! Extractor registry listing.

use console::style;

use dailydrop::config::{Config, Settings};
use dailydrop::context::build_registry;
use dailydrop::llm::LlmClient;

/// List registered extractors in auto-detection order, default last.
pub async fn cmd_extractors(_settings: Settings, config: Config) -> anyhow::Result<()> {
    let registry = build_registry(&config)?;
    let default_key = registry.default_extractor().key().to_string();

    println!("\n{}", style("Extractors").bold());
    println!("{}", "-".repeat(60));
    println!(
        "{:<20} {:<12} {:<10} {:<10} Role",
        "Key", "Promo Codes", "Lookback", "Confidence"
    );
    println!("{}", "-".repeat(60));

    for key in registry.keys() {
        let Some(extractor) = registry.get(key) else {
            continue;
        };
        let role = if key == default_key {
            style("default").cyan()
        } else {
            style("configured").dim()
        };
        println!(
            "{:<20} {:<12} {:<10} {:<10.2} {}",
            key,
            if extractor.supports_promo_codes() { "yes" } else { "no" },
            format!("{}d", extractor.lookback_days()),
            extractor.confidence(),
            role
        );
    }

    let llm = LlmClient::new(config.llm.clone())?;
    if llm.is_available().await {
        println!(
            "\n{} LLM reachable at {} (model {})",
            style("✓").green(),
            llm.config().base_url(),
            llm.config().model
        );
    } else {
        println!(
            "\n{} Default extractor unavailable: {}",
            style("!").yellow(),
            llm.config().availability_hint()
        );
    }

    Ok(())
}

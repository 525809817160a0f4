//! Prompts for AI-backed extraction.

/// Prompt for extracting reward links and promo codes from page text.
///
/// Placeholders: `{run_date}`, `{url}`, `{kinds}`, `{content}`.
pub const EXTRACT_ITEMS_PROMPT: &str = r#"You are reading a web page that publishes daily reward links and promo codes for a mobile game.

Extract the {kinds} published on or shortly before {run_date}. Ignore navigation, ads, and older archive entries.

Page URL: {url}

Page Content:
{content}

Respond with ONLY a JSON object of this exact shape, no prose:
{"items": [{"title": "...", "url": "...", "code": "...", "description": "...", "date": "YYYY-MM-DD"}]}

Use "url" for links and "code" for promo codes; omit fields you do not know. Use absolute URLs."#;

//! Default extractor backed by a local LLM.

use async_trait::async_trait;
use chrono::{Days, NaiveDate};
use scraper::{Html, Selector};

use super::{ExtractionError, Extractor, SourceDocument};
use crate::llm::{LlmClient, LlmConfig, LlmError, RawLlmItem};
use crate::models::{parse_iso_date, Item, ISO_DATE_FORMAT};

/// Registry key of the AI extractor.
pub const LLM_EXTRACTOR_KEY: &str = "ai";

/// Pages read by the model often still list the previous day's items.
const LLM_LOOKBACK_DAYS: u32 = 1;

pub struct LlmExtractor {
    client: LlmClient,
}

impl LlmExtractor {
    pub fn new(config: LlmConfig) -> Result<Self, ExtractionError> {
        let client = LlmClient::new(config).map_err(|e| ExtractionError::Backend(e.to_string()))?;
        Ok(Self { client })
    }

    async fn ask(
        &self,
        document: &SourceDocument,
        run_date: NaiveDate,
        kinds: &str,
    ) -> Result<Vec<RawLlmItem>, ExtractionError> {
        let text = page_text(&document.body);
        let date = run_date.format(ISO_DATE_FORMAT).to_string();
        self.client
            .extract_items(&text, &document.url, &date, kinds)
            .await
            .map_err(|e| match e {
                LlmError::Disabled => {
                    ExtractionError::Unavailable(self.client.config().availability_hint())
                }
                LlmError::Connection(msg) => ExtractionError::Unavailable(msg),
                LlmError::Api(msg) => ExtractionError::Backend(msg),
                LlmError::Parse(msg) => ExtractionError::Malformed(msg),
            })
    }
}

#[async_trait]
impl Extractor for LlmExtractor {
    fn key(&self) -> &str {
        LLM_EXTRACTOR_KEY
    }

    /// Never auto-detected; only reached as the fallback or by explicit key.
    fn can_handle(&self, _url: &str) -> bool {
        false
    }

    async fn extract(
        &self,
        document: &SourceDocument,
        run_date: NaiveDate,
    ) -> Result<Vec<Item>, ExtractionError> {
        let raw = self.ask(document, run_date, "reward links").await?;
        Ok(links_from_raw(&raw, &document.url, run_date))
    }

    fn supports_promo_codes(&self) -> bool {
        true
    }

    async fn extract_promo_codes(
        &self,
        document: &SourceDocument,
        run_date: NaiveDate,
    ) -> Result<Vec<Item>, ExtractionError> {
        let raw = self.ask(document, run_date, "promo codes").await?;
        Ok(codes_from_raw(&raw, run_date))
    }

    fn lookback_days(&self) -> u32 {
        LLM_LOOKBACK_DAYS
    }

    fn confidence(&self) -> f32 {
        0.6
    }
}

/// Resolve an entry's date; missing or unparseable dates fall back to the run date.
/// Dates outside the lookback window are rejected.
fn entry_date(raw: &RawLlmItem, run_date: NaiveDate) -> Option<NaiveDate> {
    let date = raw
        .date
        .as_deref()
        .and_then(parse_iso_date)
        .unwrap_or(run_date);
    let earliest = run_date
        .checked_sub_days(Days::new(LLM_LOOKBACK_DAYS as u64))
        .unwrap_or(run_date);
    (earliest..=run_date).contains(&date).then_some(date)
}

fn clean(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn links_from_raw(raw: &[RawLlmItem], base_url: &str, run_date: NaiveDate) -> Vec<Item> {
    let base = url::Url::parse(base_url).ok();
    raw.iter()
        .filter_map(|entry| {
            let href = clean(&entry.url)?;
            let absolute = match &base {
                Some(base) => base.join(&href).ok()?.to_string(),
                None => url::Url::parse(&href).ok()?.to_string(),
            };
            let date = entry_date(entry, run_date)?;
            let mut item = Item::link(absolute, clean(&entry.title), date);
            if let Some(description) = clean(&entry.description) {
                item = item.with_description(description);
            }
            Some(item)
        })
        .collect()
}

fn codes_from_raw(raw: &[RawLlmItem], run_date: NaiveDate) -> Vec<Item> {
    raw.iter()
        .filter_map(|entry| {
            let code = clean(&entry.code)?;
            let date = entry_date(entry, run_date)?;
            let mut item = Item::promo_code(code, clean(&entry.title), date);
            if let Some(description) = clean(&entry.description) {
                item = item.with_description(description);
            }
            Some(item)
        })
        .collect()
}

/// Visible text of the page followed by an index of its anchors.
///
/// The index keeps hrefs available to the model, which plain text drops.
fn page_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let mut out = String::new();

    if let Ok(body) = Selector::parse("body") {
        for node in document.select(&body) {
            for chunk in node.text() {
                let chunk = chunk.trim();
                if !chunk.is_empty() {
                    out.push_str(chunk);
                    out.push('\n');
                }
            }
        }
    }

    if let Ok(anchors) = Selector::parse("a[href]") {
        out.push_str("\nLinks:\n");
        for anchor in document.select(&anchors) {
            if let Some(href) = anchor.value().attr("href") {
                let label = anchor.text().collect::<String>();
                out.push_str(&format!("- {} <{}>\n", label.trim(), href));
            }
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(s: &str) -> NaiveDate {
        parse_iso_date(s).unwrap()
    }

    fn raw(url: Option<&str>, code: Option<&str>, date: Option<&str>) -> RawLlmItem {
        RawLlmItem {
            title: Some(" Free spins ".into()),
            url: url.map(str::to_string),
            code: code.map(str::to_string),
            description: None,
            date: date.map(str::to_string),
        }
    }

    #[test]
    fn test_links_resolve_and_default_date() {
        let items = links_from_raw(
            &[
                raw(Some("/reward/1"), None, None),
                raw(Some("https://y/2"), None, Some("2025-10-25")),
                raw(None, Some("CODE"), None),
            ],
            "https://x.com/daily",
            day("2025-10-26"),
        );
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].identity(), "https://x.com/reward/1");
        assert_eq!(items[0].published_date(), day("2025-10-26"));
        assert_eq!(items[0].title(), Some("Free spins"));
        assert_eq!(items[1].published_date(), day("2025-10-25"));
    }

    #[test]
    fn test_dates_outside_window_are_dropped() {
        let items = codes_from_raw(
            &[
                raw(None, Some("OLD"), Some("2025-10-20")),
                raw(None, Some("FUTURE"), Some("2025-10-27")),
                raw(None, Some("today"), Some("not a date")),
            ],
            day("2025-10-26"),
        );
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].identity(), "today");
    }

    #[test]
    fn test_page_text_keeps_hrefs() {
        let text = page_text(r#"<html><body><p>Daily rewards</p><a href="/r/1">Claim</a></body></html>"#);
        assert!(text.contains("Daily rewards"));
        assert!(text.contains("- Claim </r/1>"));
    }

    #[tokio::test]
    async fn test_disabled_backend_is_unavailable() {
        let extractor = LlmExtractor::new(LlmConfig::default()).unwrap();
        let doc = SourceDocument::new("https://x.com", "<p>hi</p>");
        let err = extractor.extract(&doc, day("2025-10-26")).await;
        assert!(matches!(err, Err(ExtractionError::Unavailable(_))));
        assert!(!extractor.can_handle("https://x.com"));
    }
}

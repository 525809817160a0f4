//! Rule-driven HTML extractor built from `[[extractors]]` config entries.

use async_trait::async_trait;
use chrono::{Days, NaiveDate};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use url::Url;

use super::dates::parse_heading_date;
use super::{host_matches, url_host, ExtractionError, Extractor, SourceDocument};
use crate::models::Item;

const HEADING_TAGS: [&str; 6] = ["h1", "h2", "h3", "h4", "h5", "h6"];

/// Extraction rules for one family of source pages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractorConfig {
    /// Registry key
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Hosts this extractor auto-detects (subdomains included).
    #[serde(default)]
    pub hosts: Vec<String>,
    #[serde(default = "default_link_selector")]
    pub link_selector: String,
    /// Regex the resolved absolute href must match.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link_pattern: Option<String>,
    /// Date items from the nearest preceding h1-h6 heading instead of the run date.
    #[serde(default)]
    pub dated_sections: bool,
    #[serde(default)]
    pub lookback_days: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_selector: Option<String>,
    /// Regex applied to code element text; group 1 wins over the whole match.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_pattern: Option<String>,
}

fn default_link_selector() -> String {
    "a[href]".to_string()
}

impl ExtractorConfig {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            description: None,
            hosts: Vec::new(),
            link_selector: default_link_selector(),
            link_pattern: None,
            dated_sections: false,
            lookback_days: 0,
            code_selector: None,
            code_pattern: None,
        }
    }
}

pub struct ConfigurableExtractor {
    config: ExtractorConfig,
    link_selector: Selector,
    link_pattern: Option<Regex>,
    code_selector: Option<Selector>,
    code_pattern: Option<Regex>,
}

fn parse_selector(selector: &str) -> Result<Selector, ExtractionError> {
    Selector::parse(selector)
        .map_err(|e| ExtractionError::InvalidConfig(format!("selector '{}': {}", selector, e)))
}

fn parse_regex(pattern: &str) -> Result<Regex, ExtractionError> {
    Regex::new(pattern)
        .map_err(|e| ExtractionError::InvalidConfig(format!("pattern '{}': {}", pattern, e)))
}

impl ConfigurableExtractor {
    /// Compile selectors and patterns up front so bad rules fail at startup.
    pub fn from_config(config: ExtractorConfig) -> Result<Self, ExtractionError> {
        if config.key.trim().is_empty() {
            return Err(ExtractionError::InvalidConfig(
                "extractor key must not be empty".to_string(),
            ));
        }
        let link_selector = parse_selector(&config.link_selector)?;
        let link_pattern = config.link_pattern.as_deref().map(parse_regex).transpose()?;
        let code_selector = config
            .code_selector
            .as_deref()
            .map(parse_selector)
            .transpose()?;
        let code_pattern = config.code_pattern.as_deref().map(parse_regex).transpose()?;

        Ok(Self {
            config,
            link_selector,
            link_pattern,
            code_selector,
            code_pattern,
        })
    }

    pub fn config(&self) -> &ExtractorConfig {
        &self.config
    }

    fn window_start(&self, run_date: NaiveDate) -> NaiveDate {
        run_date
            .checked_sub_days(Days::new(self.config.lookback_days as u64))
            .unwrap_or(run_date)
    }

    /// Elements matching `selector` in document order, paired with their dates.
    ///
    /// With dated sections, an element takes the date of the last heading
    /// before it; elements before any dated heading and elements outside the
    /// lookback window are dropped.
    fn dated_matches<'a>(
        &self,
        document: &'a Html,
        selector: &Selector,
        run_date: NaiveDate,
    ) -> Vec<(ElementRef<'a>, NaiveDate)> {
        if !self.config.dated_sections {
            return document.select(selector).map(|el| (el, run_date)).collect();
        }

        let earliest = self.window_start(run_date);
        let mut current: Option<NaiveDate> = None;
        let mut out = Vec::new();

        for node in document.root_element().descendants() {
            let Some(element) = ElementRef::wrap(node) else {
                continue;
            };
            if HEADING_TAGS.contains(&element.value().name()) {
                let text = collapse_whitespace(&element.text().collect::<String>());
                if let Some(date) = parse_heading_date(&text, run_date) {
                    current = Some(date);
                }
                continue;
            }
            if !selector.matches(&element) {
                continue;
            }
            if let Some(date) = current {
                if date >= earliest && date <= run_date {
                    out.push((element, date));
                }
            }
        }

        out
    }

    fn links(&self, document: &SourceDocument, run_date: NaiveDate) -> Vec<Item> {
        let html = Html::parse_document(&document.body);
        let base = Url::parse(&document.url).ok();

        self.dated_matches(&html, &self.link_selector, run_date)
            .into_iter()
            .filter_map(|(element, date)| {
                let href = element.value().attr("href")?.trim();
                if href.is_empty()
                    || href.starts_with('#')
                    || href.starts_with("javascript:")
                    || href.starts_with("mailto:")
                    || href.starts_with("tel:")
                {
                    return None;
                }
                let absolute = match &base {
                    Some(base) => base.join(href).ok()?,
                    None => Url::parse(href).ok()?,
                }
                .to_string();
                if let Some(pattern) = &self.link_pattern {
                    if !pattern.is_match(&absolute) {
                        return None;
                    }
                }
                let title = collapse_whitespace(&element.text().collect::<String>());
                let title = (!title.is_empty()).then_some(title);
                Some(Item::link(absolute, title, date))
            })
            .collect()
    }

    fn codes(&self, selector: &Selector, document: &SourceDocument, run_date: NaiveDate) -> Vec<Item> {
        let html = Html::parse_document(&document.body);
        let mut items = Vec::new();

        for (element, date) in self.dated_matches(&html, selector, run_date) {
            let text = collapse_whitespace(&element.text().collect::<String>());
            let title = element
                .value()
                .attr("title")
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(str::to_string);

            match &self.code_pattern {
                Some(pattern) => {
                    for caps in pattern.captures_iter(&text) {
                        let code = caps.get(1).or_else(|| caps.get(0));
                        if let Some(code) = code.map(|m| m.as_str().trim()) {
                            if !code.is_empty() {
                                items.push(Item::promo_code(code, title.clone(), date));
                            }
                        }
                    }
                }
                None if !text.is_empty() => items.push(Item::promo_code(&text, title, date)),
                None => {}
            }
        }

        items
    }
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn ensure_content(document: &SourceDocument) -> Result<(), ExtractionError> {
    if document.body.trim().is_empty() {
        return Err(ExtractionError::Malformed(format!(
            "empty document from {}",
            document.url
        )));
    }
    Ok(())
}

#[async_trait]
impl Extractor for ConfigurableExtractor {
    fn key(&self) -> &str {
        &self.config.key
    }

    fn can_handle(&self, url: &str) -> bool {
        match url_host(url) {
            Some(host) => self.config.hosts.iter().any(|p| host_matches(&host, p)),
            None => false,
        }
    }

    async fn extract(
        &self,
        document: &SourceDocument,
        run_date: NaiveDate,
    ) -> Result<Vec<Item>, ExtractionError> {
        ensure_content(document)?;
        Ok(self.links(document, run_date))
    }

    fn supports_promo_codes(&self) -> bool {
        self.code_selector.is_some()
    }

    async fn extract_promo_codes(
        &self,
        document: &SourceDocument,
        run_date: NaiveDate,
    ) -> Result<Vec<Item>, ExtractionError> {
        let Some(selector) = &self.code_selector else {
            return Ok(Vec::new());
        };
        ensure_content(document)?;
        Ok(self.codes(selector, document, run_date))
    }

    fn lookback_days(&self) -> u32 {
        self.config.lookback_days
    }
}

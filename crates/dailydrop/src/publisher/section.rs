//! Dated content sections inside a post body.
//!
//! A section looks like:
//!
//! ```text
//! <!-- dailydrop:section 2025-10-26 -->
//! <h2 class="dailydrop-title">Links for October 26, 2025</h2>
//! <ul class="dailydrop-items">
//! <li>...</li>
//! </ul>
//! <!-- /dailydrop:section -->
//! ```
//!
//! Everything outside the markers is left untouched.

use std::sync::LazyLock;

use chrono::{Days, NaiveDate};
use regex::Regex;

use crate::models::{parse_iso_date, Item, ISO_DATE_FORMAT};

pub const SECTION_CLOSE: &str = "<!-- /dailydrop:section -->";

/// Label used on link buttons when neither an override nor a title exists.
pub const DEFAULT_BUTTON_LABEL: &str = "Collect";

const LIST_CLOSE: &str = "</ul>";

static SECTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<!-- dailydrop:section (\d{4}-\d{2}-\d{2}) -->.*?<!-- /dailydrop:section -->\n?")
        .unwrap()
});

/// Escape HTML special characters for safe rendering.
pub fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

pub fn section_open(date: NaiveDate) -> String {
    format!("<!-- dailydrop:section {} -->", date.format(ISO_DATE_FORMAT))
}

/// What to write into a post body.
#[derive(Debug, Clone, Copy)]
pub struct SectionUpdate<'a> {
    pub run_date: NaiveDate,
    pub title: &'a str,
    pub items: &'a [Item],
    pub button_title: Option<&'a str>,
    pub days_to_keep: u32,
}

fn render_item(item: &Item, button_title: Option<&str>) -> String {
    let description = item
        .description()
        .map(|d| format!(" <span class=\"dailydrop-description\">{}</span>", html_escape(d)))
        .unwrap_or_default();
    match item {
        Item::Link(link) => {
            let label = button_title
                .or(link.title.as_deref())
                .filter(|l| !l.trim().is_empty())
                .unwrap_or(DEFAULT_BUTTON_LABEL);
            format!(
                "<li><a class=\"dailydrop-button\" href=\"{}\" target=\"_blank\" rel=\"nofollow noopener\">{}</a>{}</li>\n",
                html_escape(&link.url),
                html_escape(label),
                description
            )
        }
        Item::PromoCode(code) => {
            let title = code
                .title
                .as_deref()
                .map(|t| format!(" {}", html_escape(t)))
                .unwrap_or_default();
            format!(
                "<li><code class=\"dailydrop-code\">{}</code>{}{}</li>\n",
                html_escape(&code.code),
                title,
                description
            )
        }
    }
}

/// `<li>` lines for `items`, in order.
pub fn render_items(items: &[Item], button_title: Option<&str>) -> String {
    items.iter().map(|i| render_item(i, button_title)).collect()
}

/// A complete new section.
pub fn render_section(update: &SectionUpdate<'_>) -> String {
    format!(
        "{}\n<h2 class=\"dailydrop-title\">{}</h2>\n<ul class=\"dailydrop-items\">\n{}{}\n{}\n",
        section_open(update.run_date),
        html_escape(update.title),
        render_items(update.items, update.button_title),
        LIST_CLOSE,
        SECTION_CLOSE
    )
}

fn append_into(section: &str, rendered: &str) -> String {
    let at = section
        .rfind(LIST_CLOSE)
        .or_else(|| section.rfind(SECTION_CLOSE))
        .unwrap_or(section.len());
    let mut out = String::with_capacity(section.len() + rendered.len());
    out.push_str(&section[..at]);
    out.push_str(rendered);
    out.push_str(&section[at..]);
    out
}

/// Dates of the sections present in `content`, in document order.
pub fn section_dates(content: &str) -> Vec<NaiveDate> {
    SECTION_RE
        .captures_iter(content)
        .filter_map(|caps| parse_iso_date(&caps[1]))
        .collect()
}

/// Write `update` into `content`.
///
/// Items join the run date's section when one exists, otherwise a new
/// section goes on top. Sections dated more than `days_to_keep` days before
/// the run date are removed.
pub fn apply(content: &str, update: &SectionUpdate<'_>) -> String {
    let cutoff = match update.days_to_keep {
        0 => None,
        days => update.run_date.checked_sub_days(Days::new(days as u64)),
    };
    let has_current = section_dates(content).contains(&update.run_date);
    let rendered = render_items(update.items, update.button_title);

    let mut out = String::with_capacity(content.len() + rendered.len() + 256);
    if !has_current {
        out.push_str(&render_section(update));
    }

    let mut cursor = 0;
    for caps in SECTION_RE.captures_iter(content) {
        let Some(whole) = caps.get(0) else { continue };
        out.push_str(&content[cursor..whole.start()]);
        cursor = whole.end();

        match parse_iso_date(&caps[1]) {
            Some(date) if cutoff.is_some_and(|c| date < c) => {}
            Some(date) if date == update.run_date => {
                out.push_str(&append_into(whole.as_str(), &rendered));
            }
            _ => out.push_str(whole.as_str()),
        }
    }
    out.push_str(&content[cursor..]);
    out
}

//! Harvested item models and their fingerprints.

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Separator between identity and date in the fingerprint wire format.
pub const FINGERPRINT_SEPARATOR: &str = "|||";

/// Date format used for every `YYYY-MM-DD` value on the wire and in storage.
pub const ISO_DATE_FORMAT: &str = "%Y-%m-%d";

/// Kind of harvested item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    Link,
    PromoCode,
}

impl ItemKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Link => "link",
            Self::PromoCode => "promo_code",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "link" => Some(Self::Link),
            "promo_code" => Some(Self::PromoCode),
            _ => None,
        }
    }

    /// Plural label used in summaries ("Added 3 links").
    pub fn plural(&self) -> &'static str {
        match self {
            Self::Link => "links",
            Self::PromoCode => "promo codes",
        }
    }
}

/// A reward link harvested from a source page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkItem {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// The date the item belongs to, independent of the extraction run date.
    pub published_date: NaiveDate,
}

/// A promo code harvested from a source page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromoCodeItem {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// The date the item belongs to, independent of the extraction run date.
    pub published_date: NaiveDate,
}

/// A harvested item: either a link or a promo code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Item {
    Link(LinkItem),
    PromoCode(PromoCodeItem),
}

impl Item {
    /// Build a link item.
    pub fn link(url: impl Into<String>, title: Option<String>, published_date: NaiveDate) -> Self {
        Self::Link(LinkItem {
            title,
            url: url.into(),
            description: None,
            published_date,
        })
    }

    /// Build a promo code item. Surrounding whitespace is trimmed from the code.
    pub fn promo_code(
        code: impl AsRef<str>,
        title: Option<String>,
        published_date: NaiveDate,
    ) -> Self {
        Self::PromoCode(PromoCodeItem {
            title,
            code: code.as_ref().trim().to_string(),
            description: None,
            published_date,
        })
    }

    /// Attach a description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        let description = Some(description.into());
        match &mut self {
            Self::Link(link) => link.description = description,
            Self::PromoCode(code) => code.description = description,
        }
        self
    }

    pub fn kind(&self) -> ItemKind {
        match self {
            Self::Link(_) => ItemKind::Link,
            Self::PromoCode(_) => ItemKind::PromoCode,
        }
    }

    pub fn title(&self) -> Option<&str> {
        match self {
            Self::Link(link) => link.title.as_deref(),
            Self::PromoCode(code) => code.title.as_deref(),
        }
    }

    pub fn description(&self) -> Option<&str> {
        match self {
            Self::Link(link) => link.description.as_deref(),
            Self::PromoCode(code) => code.description.as_deref(),
        }
    }

    pub fn published_date(&self) -> NaiveDate {
        match self {
            Self::Link(link) => link.published_date,
            Self::PromoCode(code) => code.published_date,
        }
    }

    /// The raw identity: the URL for links, the code for promo codes.
    pub fn identity(&self) -> &str {
        match self {
            Self::Link(link) => &link.url,
            Self::PromoCode(code) => &code.code,
        }
    }

    /// Deterministic identity of this item tied to its published date.
    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::from(self)
    }
}

/// Deduplication key: `"<identity>|||<YYYY-MM-DD>"`.
///
/// Identity is the exact URL string for links and the upper-cased code for
/// promo codes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn new(identity: &str, date: NaiveDate) -> Self {
        Self(format!(
            "{}{}{}",
            identity,
            FINGERPRINT_SEPARATOR,
            date.format(ISO_DATE_FORMAT)
        ))
    }

    /// Wrap a fingerprint read back from storage.
    pub fn from_stored(raw: String) -> Self {
        Self(raw)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl From<&Item> for Fingerprint {
    fn from(item: &Item) -> Self {
        match item {
            Item::Link(link) => Self::new(&link.url, link.published_date),
            Item::PromoCode(code) => Self::new(&code.code.to_uppercase(), code.published_date),
        }
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Parse a `YYYY-MM-DD` string.
pub fn parse_iso_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), ISO_DATE_FORMAT).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(s: &str) -> NaiveDate {
        parse_iso_date(s).unwrap()
    }

    #[test]
    fn test_link_fingerprint_uses_exact_url() {
        let item = Item::link("https://x/a?ref=Top", None, day("2025-10-26"));
        assert_eq!(item.fingerprint().as_str(), "https://x/a?ref=Top|||2025-10-26");
    }

    #[test]
    fn test_promo_code_fingerprint_is_upper_cased() {
        let item = Item::promo_code(" spring25 ", Some("Spring".into()), day("2025-10-26"));
        assert_eq!(item.identity(), "spring25");
        assert_eq!(item.fingerprint().as_str(), "SPRING25|||2025-10-26");
    }

    #[test]
    fn test_fingerprint_is_deterministic() {
        let a = Item::link("https://x/a", Some("one".into()), day("2025-10-26"));
        let b = Item::link("https://x/a", Some("two".into()), day("2025-10-26"))
            .with_description("different metadata");
        assert_eq!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn test_fingerprint_changes_with_date() {
        let a = Item::link("https://x/a", None, day("2025-10-26"));
        let b = Item::link("https://x/a", None, day("2025-10-25"));
        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn test_item_serde_shape() {
        let item = Item::link("https://x/a", None, day("2025-10-26"));
        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json["kind"], "link");
        assert_eq!(json["published_date"], "2025-10-26");
    }
}

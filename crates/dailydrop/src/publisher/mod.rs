//! Publishing net-new items to content-management targets.
//!
//! The pipeline only sees [`Publisher`]. [`WordPressPublisher`] implements
//! "replace a named content section" over the WordPress REST API, using the
//! pure section editing in [`section`].

pub mod section;
mod wordpress;

pub use wordpress::{TargetSiteConfig, WordPressPublisher};

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Serialize;
use thiserror::Error;

use crate::models::{Item, ItemKind};

/// Display format for dates in section titles ("October 26, 2025").
pub const TITLE_DATE_FORMAT: &str = "%B %-d, %Y";

/// One write of items to one target post.
#[derive(Debug, Clone)]
pub struct PublishRequest {
    pub target: String,
    pub post_id: i64,
    pub items: Vec<Item>,
    pub section_title: String,
    pub run_date: NaiveDate,
    /// Retention of dated sections; 0 keeps everything.
    pub days_to_keep: u32,
    pub button_title: Option<String>,
}

/// Acknowledgement of a successful publish.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublishReceipt {
    pub target: String,
    pub post_id: i64,
    pub items_published: usize,
    /// Public link of the updated post, when the target reports one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
}

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("no target site configured for '{0}'")]
    UnknownTarget(String),
    #[error("credentials for target '{target}' missing: set {variable}")]
    MissingCredentials { target: String, variable: String },
    #[error("target '{target}' rejected credentials (HTTP {status})")]
    Unauthorized { target: String, status: u16 },
    #[error("post {post_id} not found on target '{target}'")]
    NotFound { target: String, post_id: i64 },
    #[error("target '{target}' rejected the write (HTTP {status}): {message}")]
    Rejected {
        target: String,
        status: u16,
        message: String,
    },
    #[error("request to target '{target}' failed: {message}")]
    Request { target: String, message: String },
    #[error("unexpected response from target '{target}': {message}")]
    InvalidResponse { target: String, message: String },
}

/// Content-management collaborator.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, request: &PublishRequest) -> Result<PublishReceipt, PublishError>;
}

/// "Links for October 26, 2025", "Promo Codes for ...", or "Rewards for ..." when mixed.
pub fn default_section_title(items: &[Item], run_date: NaiveDate) -> String {
    let has_links = items.iter().any(|i| i.kind() == ItemKind::Link);
    let has_codes = items.iter().any(|i| i.kind() == ItemKind::PromoCode);
    let noun = match (has_links, has_codes) {
        (true, true) => "Rewards",
        (false, true) => "Promo Codes",
        _ => "Links",
    };
    format!("{} for {}", noun, run_date.format(TITLE_DATE_FORMAT))
}

/// Human summary of a publish, e.g. "Added 3 links".
pub fn summarize_added(items: &[Item]) -> String {
    let links = items.iter().filter(|i| i.kind() == ItemKind::Link).count();
    let codes = items.len() - links;
    match (links, codes) {
        (0, 0) => "Nothing new".to_string(),
        (n, 0) => format!("Added {} {}", n, plural(n, ItemKind::Link)),
        (0, n) => format!("Added {} {}", n, plural(n, ItemKind::PromoCode)),
        (l, c) => format!(
            "Added {} {} and {} {}",
            l,
            plural(l, ItemKind::Link),
            c,
            plural(c, ItemKind::PromoCode)
        ),
    }
}

fn plural(n: usize, kind: ItemKind) -> &'static str {
    match (n, kind) {
        (1, ItemKind::Link) => "link",
        (1, ItemKind::PromoCode) => "promo code",
        _ => kind.plural(),
    }
}

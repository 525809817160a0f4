//! Data models.

mod item;
mod monitoring;
mod post_config;
mod run_state;

pub use item::{
    parse_iso_date, Fingerprint, Item, ItemKind, LinkItem, PromoCodeItem, FINGERPRINT_SEPARATOR,
    ISO_DATE_FORMAT,
};
pub use monitoring::SourceMonitoringEvent;
pub use post_config::{
    ConfigValidationError, ExtractionMode, PostConfig, SourceConfig, DEFAULT_DAYS_TO_KEEP,
    DEFAULT_TIMEZONE,
};
pub use run_state::{BatchCounts, BatchRun, BatchStatus, PostRunState, PostRunStatus};

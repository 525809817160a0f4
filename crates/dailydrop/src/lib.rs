//! dailydrop - daily link and promo code harvesting pipeline.
//!
//! Core library: harvests "new for today" items from source pages, drops
//! everything already published, and pushes only net-new items to one or
//! more content-management targets.

// Model types use `from_str` methods that return Option<Self>,
// not Result<Self, Error> as std::str::FromStr requires.
#![allow(clippy::should_implement_trait)]

pub mod batch;
pub mod config;
pub mod context;
pub mod dedup;
pub mod extractors;
pub mod http_client;
pub mod llm;
pub mod models;
pub mod pipeline;
pub mod publisher;
pub mod rate_limit;
pub mod repository;
pub mod schema;
pub mod target;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;

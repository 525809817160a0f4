//! Storage contracts and their implementations.
//!
//! The pipeline depends only on the traits defined here. Two backends exist:
//! [`MemoryStore`] for tests and throwaway runs, and [`SqliteStore`] backed
//! by Diesel for the CLI.

mod memory;
pub mod pool;
mod sqlite;

pub use memory::MemoryStore;
pub use pool::{SqliteConn, SqlitePool};
pub use sqlite::SqliteStore;

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use thiserror::Error;

use crate::models::{ConfigValidationError, Fingerprint, PostConfig, SourceMonitoringEvent};

/// Storage failures. These are the only errors allowed to abort a whole post run.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),
    #[error("storage unavailable: {0}")]
    Unavailable(String),
    #[error("could not encode or decode stored document: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("stored config '{key}' is invalid: {reason}")]
    InvalidDocument {
        key: String,
        reason: ConfigValidationError,
    },
    #[error("post config '{0}' not found")]
    NotFound(String),
}

/// Post configuration lookup and persistence.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Find a config by content slug first, then by legacy numeric id.
    async fn get_config(&self, post_ref: &str) -> Result<Option<PostConfig>, StorageError>;

    /// Insert or replace a config. Rejects configs that fail validation.
    async fn save_config(&self, config: &PostConfig) -> Result<(), StorageError>;

    async fn list_configs(&self) -> Result<Vec<PostConfig>, StorageError>;

    /// Record a successful publish time.
    async fn touch(&self, post_ref: &str, at: DateTime<Utc>) -> Result<(), StorageError>;
}

/// Published-fingerprint sets keyed by `(post_ref, date, target)`.
#[async_trait]
pub trait FingerprintStore: Send + Sync {
    async fn get_known(
        &self,
        post_ref: &str,
        date: NaiveDate,
        target: &str,
    ) -> Result<HashSet<Fingerprint>, StorageError>;

    /// Union `fingerprints` into the stored set, atomically per key.
    /// Returns how many were not already present.
    async fn upsert(
        &self,
        post_ref: &str,
        date: NaiveDate,
        target: &str,
        fingerprints: &[Fingerprint],
    ) -> Result<usize, StorageError>;
}

/// Receives per-source extraction outcomes.
#[async_trait]
pub trait MonitoringSink: Send + Sync {
    async fn record(&self, event: &SourceMonitoringEvent) -> Result<(), StorageError>;
}

/// Validate a config at the store boundary.
pub(crate) fn validated(config: &PostConfig) -> Result<(), StorageError> {
    config
        .validate()
        .map_err(|reason| StorageError::InvalidDocument {
            key: config.storage_key(),
            reason,
        })
}

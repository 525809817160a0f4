//! Runtime settings.

use std::path::PathBuf;
use std::time::Duration;

use super::{DEFAULT_DATABASE_FILENAME, MEMORY_DATABASE};
use crate::http_client::USER_AGENT;

/// Upper bound on concurrent pipelines in one batch.
pub const MAX_BATCH_WORKERS: usize = 16;

/// Application settings.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Base data directory.
    pub data_dir: PathBuf,
    /// Database filename inside `data_dir`.
    pub database_filename: String,
    /// Database URL (overrides data_dir/database_filename if set).
    /// `memory` selects the in-process store.
    pub database_url: Option<String>,
    /// User agent for source fetches.
    pub user_agent: String,
    /// Per-source fetch timeout in seconds.
    pub request_timeout: u64,
    /// Delay between requests to the same domain in milliseconds.
    pub request_delay_ms: u64,
    /// Concurrent source fetches within one pipeline run.
    pub source_concurrency: usize,
    /// Concurrent pipelines in one batch.
    pub batch_workers: usize,
    /// Log lines kept per post in a batch.
    pub log_capacity: usize,
    /// Seconds a finished batch stays queryable.
    pub batch_retention_secs: u64,
    /// Finished batches kept at most.
    pub max_finished_batches: usize,
}

impl Default for Settings {
    fn default() -> Self {
        // Default to ~/Documents/dailydrop/
        // Falls back gracefully: Documents dir -> Home dir -> Current dir
        let data_dir = dirs::document_dir()
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("dailydrop");

        Self {
            data_dir,
            database_filename: DEFAULT_DATABASE_FILENAME.to_string(),
            database_url: None,
            user_agent: USER_AGENT.to_string(),
            request_timeout: 30,
            request_delay_ms: 250,
            source_concurrency: 4,
            batch_workers: 4,
            log_capacity: 500,
            batch_retention_secs: 3600,
            max_finished_batches: 50,
        }
    }
}

impl Settings {
    /// Create settings with a custom data directory.
    pub fn with_data_dir(data_dir: PathBuf) -> Self {
        Self {
            data_dir,
            ..Default::default()
        }
    }

    /// Get the database URL, constructing from path if not explicitly set.
    pub fn database_url(&self) -> String {
        if let Some(ref url) = self.database_url {
            url.clone()
        } else {
            format!("sqlite:{}", self.database_path().display())
        }
    }

    /// Whether the in-memory store was requested.
    pub fn uses_memory_store(&self) -> bool {
        self.database_url
            .as_deref()
            .is_some_and(|url| url.eq_ignore_ascii_case(MEMORY_DATABASE))
    }

    /// Get the full path to the database (for file-based databases).
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(&self.database_filename)
    }

    /// Check if the database appears to be initialized.
    pub fn database_exists(&self) -> bool {
        self.database_url.is_some() || self.database_path().exists()
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout.max(1))
    }

    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay_ms)
    }

    pub fn batch_retention(&self) -> Duration {
        Duration::from_secs(self.batch_retention_secs)
    }

    /// Batch worker count clamped to `1..=MAX_BATCH_WORKERS`.
    pub fn batch_workers(&self) -> usize {
        self.batch_workers.clamp(1, MAX_BATCH_WORKERS)
    }

    /// Ensure the data directory exists.
    pub fn ensure_directories(&self) -> std::io::Result<()> {
        if self.uses_memory_store() {
            return Ok(());
        }
        std::fs::create_dir_all(&self.data_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_database_url_defaults_to_file() {
        let settings = Settings::with_data_dir(PathBuf::from("/tmp/dd"));
        assert_eq!(settings.database_url(), "sqlite:/tmp/dd/dailydrop.db");
        assert!(!settings.uses_memory_store());
    }

    #[test]
    fn test_memory_store_selection() {
        let settings = Settings {
            database_url: Some("memory".into()),
            ..Default::default()
        };
        assert!(settings.uses_memory_store());
        assert!(settings.database_exists());
    }

    #[test]
    fn test_workers_clamped() {
        let mut settings = Settings::default();
        settings.batch_workers = 0;
        assert_eq!(settings.batch_workers(), 1);
        settings.batch_workers = 64;
        assert_eq!(settings.batch_workers(), MAX_BATCH_WORKERS);
    }
}

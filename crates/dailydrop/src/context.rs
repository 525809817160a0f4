//! Application wiring: stores, extractor registry, fetcher, publisher, pipeline.
//!
//! Create one context per command or service, then hand out the pipeline
//! or a batch manager from it.

use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use crate::batch::{BatchManager, BatchOptions};
use crate::config::{Config, Settings};
use crate::extractors::{
    ConfigurableExtractor, ExtractionError, ExtractorRegistry, LlmExtractor, RegistryError,
};
use crate::http_client::{FetchError, HttpFetcher};
use crate::pipeline::{Pipeline, PipelineOptions};
use crate::publisher::{PublishError, WordPressPublisher};
use crate::rate_limit::{DomainRateLimiter, RateLimitConfig};
use crate::repository::{
    ConfigStore, FingerprintStore, MemoryStore, MonitoringSink, SqlitePool, SqliteStore,
    StorageError,
};

#[derive(Debug, Error)]
pub enum ContextError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Extractor(#[from] ExtractionError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Publish(#[from] PublishError),
}

/// The three store contracts, backed by one implementation.
#[derive(Clone)]
pub struct Stores {
    pub configs: Arc<dyn ConfigStore>,
    pub fingerprints: Arc<dyn FingerprintStore>,
    pub monitoring: Arc<dyn MonitoringSink>,
    sqlite: Option<SqliteStore>,
}

impl Stores {
    pub fn memory() -> Self {
        let store = Arc::new(MemoryStore::new());
        Self {
            configs: store.clone(),
            fingerprints: store.clone(),
            monitoring: store,
            sqlite: None,
        }
    }

    pub fn sqlite(store: SqliteStore) -> Self {
        let shared = Arc::new(store.clone());
        Self {
            configs: shared.clone(),
            fingerprints: shared.clone(),
            monitoring: shared,
            sqlite: Some(store),
        }
    }

    /// Open the store `settings` selects; SQLite schemas are created if missing.
    pub async fn open(settings: &Settings) -> Result<Self, StorageError> {
        if settings.uses_memory_store() {
            debug!("Using in-memory store");
            return Ok(Self::memory());
        }
        let store = SqliteStore::new(SqlitePool::new(&settings.database_url()));
        store.init_schema().await?;
        Ok(Self::sqlite(store))
    }

    /// The SQLite backend, when one is in use.
    pub fn sqlite_store(&self) -> Option<&SqliteStore> {
        self.sqlite.as_ref()
    }
}

/// Build the registry: configured extractors in file order, AI extractor as default.
pub fn build_registry(config: &Config) -> Result<ExtractorRegistry, ContextError> {
    let default = Arc::new(LlmExtractor::new(config.llm.clone())?);
    let mut builder = ExtractorRegistry::builder(default);
    for extractor in &config.extractors {
        let extractor = ConfigurableExtractor::from_config(extractor.clone())?;
        builder.register(Arc::new(extractor))?;
    }
    Ok(builder.build())
}

pub struct AppContext {
    pub settings: Settings,
    pub config: Config,
    pub stores: Stores,
    pipeline: Pipeline,
}

impl AppContext {
    pub async fn new(settings: Settings, config: Config) -> Result<Self, ContextError> {
        let stores = Stores::open(&settings).await?;
        Self::with_stores(settings, config, stores)
    }

    /// Wire the pipeline against already-open stores.
    pub fn with_stores(
        settings: Settings,
        config: Config,
        stores: Stores,
    ) -> Result<Self, ContextError> {
        let registry = Arc::new(build_registry(&config)?);
        let limiter = DomainRateLimiter::new(RateLimitConfig::with_base_delay(
            settings.request_delay(),
        ));
        let fetcher = HttpFetcher::new(&settings.user_agent, settings.request_timeout(), limiter)?;
        let publisher = WordPressPublisher::new(config.targets.clone(), settings.request_timeout())?;

        let pipeline = Pipeline::new(
            stores.configs.clone(),
            stores.fingerprints.clone(),
            registry,
            Arc::new(fetcher),
            Arc::new(publisher),
            PipelineOptions {
                fetch_timeout: settings.request_timeout(),
                source_concurrency: settings.source_concurrency.max(1),
            },
        )
        .with_monitoring(stores.monitoring.clone());

        Ok(Self {
            settings,
            config,
            stores,
            pipeline,
        })
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    pub fn registry(&self) -> &ExtractorRegistry {
        self.pipeline.registry()
    }

    /// Batch manager sized from settings; `workers` overrides the configured count.
    pub fn batch_manager(&self, workers: Option<usize>) -> BatchManager {
        let workers = workers.unwrap_or_else(|| self.settings.batch_workers());
        BatchManager::new(
            self.pipeline.clone(),
            BatchOptions {
                workers: workers.clamp(1, crate::config::MAX_BATCH_WORKERS),
                log_capacity: self.settings.log_capacity,
                retention: self.settings.batch_retention(),
                max_finished: self.settings.max_finished_batches,
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractors::{ExtractorConfig, LLM_EXTRACTOR_KEY};

    #[test]
    fn test_registry_order() {
        let mut config = Config::default();
        config.extractors.push(ExtractorConfig::new("gamehub"));
        config.extractors.push(ExtractorConfig::new("rewards"));
        let registry = build_registry(&config).unwrap();
        assert_eq!(registry.keys(), vec!["gamehub", "rewards", LLM_EXTRACTOR_KEY]);
    }

    #[test]
    fn test_duplicate_extractor_rejected() {
        let mut config = Config::default();
        config.extractors.push(ExtractorConfig::new("gamehub"));
        config.extractors.push(ExtractorConfig::new("gamehub"));
        assert!(matches!(
            build_registry(&config),
            Err(ContextError::Registry(RegistryError::DuplicateKey(_)))
        ));
    }

    #[test]
    fn test_invalid_extractor_rejected() {
        let mut config = Config::default();
        let mut extractor = ExtractorConfig::new("broken");
        extractor.link_pattern = Some("(".into());
        config.extractors.push(extractor);
        assert!(matches!(
            build_registry(&config),
            Err(ContextError::Extractor(ExtractionError::InvalidConfig(_)))
        ));
    }

    #[tokio::test]
    async fn test_memory_context() {
        let settings = Settings {
            database_url: Some("memory".into()),
            ..Default::default()
        };
        let ctx = AppContext::new(settings, Config::default()).await.unwrap();
        assert!(ctx.stores.sqlite_store().is_none());
        let manager = ctx.batch_manager(Some(99));
        assert_eq!(manager.options().workers, 16);
        assert_eq!(manager.options().max_finished, 50);
        assert!(ctx.stores.configs.list_configs().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_sqlite_context_creates_schema() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::with_data_dir(dir.path().to_path_buf());
        let ctx = AppContext::new(settings, Config::default()).await.unwrap();
        assert!(ctx.stores.sqlite_store().is_some());
        assert!(dir.path().join("dailydrop.db").exists());
    }
}

//! In-memory store for single-process operation and tests.
//!
//! State is not persisted across restarts.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use tokio::sync::RwLock;

use super::{validated, ConfigStore, FingerprintStore, MonitoringSink, StorageError};
use crate::models::{Fingerprint, PostConfig, SourceMonitoringEvent};

type FingerprintKey = (String, NaiveDate, String);

#[derive(Default)]
struct State {
    /// Keyed by storage key; ordered for stable listings.
    configs: BTreeMap<String, PostConfig>,
    fingerprints: HashMap<FingerprintKey, HashSet<Fingerprint>>,
    monitoring: Vec<SourceMonitoringEvent>,
}

/// Implements every store contract behind one lock.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<RwLock<State>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Recorded monitoring events, oldest first.
    pub async fn monitoring_events(&self) -> Vec<SourceMonitoringEvent> {
        self.state.read().await.monitoring.clone()
    }
}

fn find<'a>(configs: &'a BTreeMap<String, PostConfig>, post_ref: &str) -> Option<&'a PostConfig> {
    configs
        .values()
        .find(|c| c.content_slug.as_deref() == Some(post_ref))
        .or_else(|| configs.values().find(|c| c.matches_ref(post_ref)))
}

#[async_trait]
impl ConfigStore for MemoryStore {
    async fn get_config(&self, post_ref: &str) -> Result<Option<PostConfig>, StorageError> {
        let state = self.state.read().await;
        Ok(find(&state.configs, post_ref).cloned())
    }

    async fn save_config(&self, config: &PostConfig) -> Result<(), StorageError> {
        validated(config)?;
        let key = config.storage_key();
        let mut state = self.state.write().await;
        if let Some(legacy_key) = config.post_id.map(|id| id.to_string()) {
            if legacy_key != key {
                state.configs.remove(&legacy_key);
            }
        }
        state.configs.insert(key, config.clone());
        Ok(())
    }

    async fn list_configs(&self) -> Result<Vec<PostConfig>, StorageError> {
        Ok(self.state.read().await.configs.values().cloned().collect())
    }

    async fn touch(&self, post_ref: &str, at: DateTime<Utc>) -> Result<(), StorageError> {
        let mut state = self.state.write().await;
        let key = find(&state.configs, post_ref)
            .map(PostConfig::storage_key)
            .ok_or_else(|| StorageError::NotFound(post_ref.to_string()))?;
        if let Some(config) = state.configs.get_mut(&key) {
            config.last_updated = Some(at);
        }
        Ok(())
    }
}

#[async_trait]
impl FingerprintStore for MemoryStore {
    async fn get_known(
        &self,
        post_ref: &str,
        date: NaiveDate,
        target: &str,
    ) -> Result<HashSet<Fingerprint>, StorageError> {
        let state = self.state.read().await;
        let key = (post_ref.to_string(), date, target.to_string());
        Ok(state.fingerprints.get(&key).cloned().unwrap_or_default())
    }

    async fn upsert(
        &self,
        post_ref: &str,
        date: NaiveDate,
        target: &str,
        fingerprints: &[Fingerprint],
    ) -> Result<usize, StorageError> {
        // The write lock is held for the whole union.
        let mut state = self.state.write().await;
        let set = state
            .fingerprints
            .entry((post_ref.to_string(), date, target.to_string()))
            .or_default();
        Ok(fingerprints
            .iter()
            .filter(|fp| set.insert((*fp).clone()))
            .count())
    }
}

#[async_trait]
impl MonitoringSink for MemoryStore {
    async fn record(&self, event: &SourceMonitoringEvent) -> Result<(), StorageError> {
        self.state.write().await.monitoring.push(event.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{parse_iso_date, SourceConfig};

    fn day(s: &str) -> NaiveDate {
        parse_iso_date(s).unwrap()
    }

    fn fp(s: &str) -> Fingerprint {
        Fingerprint::new(s, day("2025-10-26"))
    }

    #[tokio::test]
    async fn test_lookup_by_slug_then_legacy_id() {
        let store = MemoryStore::new();
        let mut legacy = PostConfig::with_post_id(105);
        legacy.source_urls.push(SourceConfig::new("https://x/a"));
        let mut slugged = PostConfig::with_slug("spins");
        slugged.post_id = Some(7);
        store.save_config(&legacy).await.unwrap();
        store.save_config(&slugged).await.unwrap();

        let found = store.get_config("spins").await.unwrap().unwrap();
        assert_eq!(found.post_id, Some(7));
        let found = store.get_config("105").await.unwrap().unwrap();
        assert_eq!(found.content_slug, None);
        let found = store.get_config("7").await.unwrap().unwrap();
        assert_eq!(found.content_slug.as_deref(), Some("spins"));
        assert!(store.get_config("missing").await.unwrap().is_none());
        assert_eq!(store.list_configs().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_slug_supersedes_legacy_entry() {
        let store = MemoryStore::new();
        store.save_config(&PostConfig::with_post_id(105)).await.unwrap();

        let mut upgraded = PostConfig::with_slug("spins");
        upgraded.post_id = Some(105);
        store.save_config(&upgraded).await.unwrap();

        assert_eq!(store.list_configs().await.unwrap(), vec![upgraded.clone()]);
        assert_eq!(store.get_config("105").await.unwrap(), Some(upgraded));
    }

    #[tokio::test]
    async fn test_save_rejects_invalid() {
        let store = MemoryStore::new();
        let mut config = PostConfig::with_slug("x");
        config.timezone = "Nowhere/Land".into();
        assert!(matches!(
            store.save_config(&config).await,
            Err(StorageError::InvalidDocument { .. })
        ));
    }

    #[tokio::test]
    async fn test_upsert_is_a_union() {
        let store = MemoryStore::new();
        let date = day("2025-10-26");
        let added = store.upsert("p", date, "this", &[fp("a"), fp("b")]).await.unwrap();
        assert_eq!(added, 2);
        let added = store.upsert("p", date, "this", &[fp("b"), fp("c")]).await.unwrap();
        assert_eq!(added, 1);

        assert_eq!(store.get_known("p", date, "this").await.unwrap().len(), 3);
        assert!(store.get_known("p", date, "casino").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_upserts_lose_nothing() {
        let store = MemoryStore::new();
        let date = day("2025-10-26");
        let tasks: Vec<_> = (0..16)
            .map(|i| {
                let store = store.clone();
                tokio::spawn(async move {
                    store.upsert("p", date, "this", &[fp(&format!("u{}", i))]).await
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }
        assert_eq!(store.get_known("p", date, "this").await.unwrap().len(), 16);
    }

    #[tokio::test]
    async fn test_touch_sets_last_updated() {
        let store = MemoryStore::new();
        store.save_config(&PostConfig::with_slug("s")).await.unwrap();
        let now = Utc::now();
        store.touch("s", now).await.unwrap();
        let config = store.get_config("s").await.unwrap().unwrap();
        assert_eq!(config.last_updated, Some(now));
        assert!(matches!(
            store.touch("nope", now).await,
            Err(StorageError::NotFound(_))
        ));
    }
}

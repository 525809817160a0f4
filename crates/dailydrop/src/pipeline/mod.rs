//! Per-post pipeline: fetch sources, extract, dedupe, publish, persist.
//!
//! Per-source and per-target failures are recovered locally and reported
//! inside [`PipelineResult`]. Only storage failures (and a missing or
//! invalid config) abort the run as a [`PipelineError`].

mod events;
mod result;

pub use events::PipelineEvent;
pub use result::{
    PipelineResult, SourceError, SourceResult, TargetFailure, TargetOutcome, TargetStatus,
};

use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, Utc};
use futures::future::join_all;
use futures::stream::{self, StreamExt};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::dedup::DedupEngine;
use crate::extractors::{ExtractorRegistry, SourceDocument};
use crate::http_client::{fetch_with_timeout, SourceFetcher};
use crate::models::{
    ConfigValidationError, ExtractionMode, Item, PostConfig, SourceConfig, SourceMonitoringEvent,
};
use crate::publisher::{default_section_title, summarize_added, PublishRequest, Publisher};
use crate::repository::{ConfigStore, FingerprintStore, MonitoringSink, StorageError};
use crate::target::{resolve_post_id, target_keys, TargetSelector};

/// Whole-post failures.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("post config '{0}' not found")]
    PostNotFound(String),
    #[error("post config '{post_ref}' is invalid: {reason}")]
    InvalidConfig {
        post_ref: String,
        reason: ConfigValidationError,
    },
    #[error("post config '{0}' has no source urls")]
    NoSources(String),
}

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Upper bound on a single source fetch.
    pub fetch_timeout: Duration,
    /// Concurrent source fetches per run.
    pub source_concurrency: usize,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            fetch_timeout: Duration::from_secs(30),
            source_concurrency: 4,
        }
    }
}

/// Runs the harvest-dedupe-publish cycle for one post at a time.
#[derive(Clone)]
pub struct Pipeline {
    configs: Arc<dyn ConfigStore>,
    dedup: DedupEngine,
    registry: Arc<ExtractorRegistry>,
    fetcher: Arc<dyn SourceFetcher>,
    publisher: Arc<dyn Publisher>,
    monitoring: Option<Arc<dyn MonitoringSink>>,
    options: PipelineOptions,
}

/// One source's contribution plus the lookback its extractor declares.
struct Harvest {
    result: SourceResult,
    lookback_days: u32,
}

async fn emit(events: &mpsc::Sender<PipelineEvent>, event: PipelineEvent) {
    let _ = events.send(event).await;
}

impl Pipeline {
    pub fn new(
        configs: Arc<dyn ConfigStore>,
        fingerprints: Arc<dyn FingerprintStore>,
        registry: Arc<ExtractorRegistry>,
        fetcher: Arc<dyn SourceFetcher>,
        publisher: Arc<dyn Publisher>,
        options: PipelineOptions,
    ) -> Self {
        Self {
            configs,
            dedup: DedupEngine::new(fingerprints),
            registry,
            fetcher,
            publisher,
            monitoring: None,
            options,
        }
    }

    /// Report per-source extraction outcomes to `sink`.
    pub fn with_monitoring(mut self, sink: Arc<dyn MonitoringSink>) -> Self {
        self.monitoring = Some(sink);
        self
    }

    pub fn registry(&self) -> &ExtractorRegistry {
        &self.registry
    }

    pub fn configs(&self) -> &Arc<dyn ConfigStore> {
        &self.configs
    }

    pub fn dedup(&self) -> &DedupEngine {
        &self.dedup
    }

    /// Run one post without observing progress.
    pub async fn run(
        &self,
        post_ref: &str,
        target: &TargetSelector,
        run_date: Option<NaiveDate>,
    ) -> Result<PipelineResult, PipelineError> {
        let (tx, _) = mpsc::channel(1);
        self.run_with_events(post_ref, target, run_date, &tx).await
    }

    /// Run one post, streaming progress to `events`.
    ///
    /// `run_date` defaults to today in the post's timezone.
    pub async fn run_with_events(
        &self,
        post_ref: &str,
        target: &TargetSelector,
        run_date: Option<NaiveDate>,
        events: &mpsc::Sender<PipelineEvent>,
    ) -> Result<PipelineResult, PipelineError> {
        let config = self
            .configs
            .get_config(post_ref)
            .await?
            .ok_or_else(|| PipelineError::PostNotFound(post_ref.to_string()))?;
        config
            .validate()
            .map_err(|reason| PipelineError::InvalidConfig {
                post_ref: post_ref.to_string(),
                reason,
            })?;
        if config.source_urls.is_empty() {
            return Err(PipelineError::NoSources(post_ref.to_string()));
        }

        let storage_key = config.storage_key();
        let run_date = run_date.unwrap_or_else(|| config.run_date(Utc::now()));
        let targets = target_keys(&config, target);

        info!(
            "Running {} for {} ({} sources, targets: {})",
            storage_key,
            run_date,
            config.source_urls.len(),
            targets.join(", ")
        );
        emit(
            events,
            PipelineEvent::Started {
                post_ref: storage_key.clone(),
                run_date,
                sources: config.source_urls.len(),
                targets: targets.clone(),
            },
        )
        .await;

        // Fetch and extract; `buffered` keeps source order. The futures are
        // collected first so the run future stays `Send` for spawned batches.
        let pending: Vec<_> = config
            .source_urls
            .iter()
            .map(|source| {
                self.harvest(&storage_key, source, run_date, config.extraction_mode, events)
            })
            .collect();
        let harvests: Vec<Harvest> = stream::iter(pending)
            .buffered(self.options.source_concurrency.max(1))
            .collect()
            .await;

        let lookback_days = harvests.iter().map(|h| h.lookback_days).max().unwrap_or(0);
        let sources: Vec<SourceResult> = harvests.into_iter().map(|h| h.result).collect();
        let any_source_ok = sources.iter().any(SourceResult::is_ok);
        let items: Vec<Item> = sources.iter().flat_map(|s| s.items.iter().cloned()).collect();

        let outcomes = if any_source_ok {
            let runs: Vec<_> = targets
                .iter()
                .map(|target| {
                    self.publish_target(&config, &storage_key, target, run_date, lookback_days, &items, events)
                })
                .collect();
            join_all(runs)
                .await
                .into_iter()
                .collect::<Result<Vec<_>, StorageError>>()?
        } else {
            warn!("Every source failed for {}; skipping publication", storage_key);
            let mut outcomes = Vec::with_capacity(targets.len());
            for target in &targets {
                let outcome = TargetOutcome::failed(target, None, TargetFailure::NoSourceSucceeded);
                emit(
                    events,
                    PipelineEvent::TargetFailed {
                        target: target.clone(),
                        error: outcome.message.clone(),
                    },
                )
                .await;
                outcomes.push(outcome);
            }
            outcomes
        };

        let result = PipelineResult {
            post_ref: storage_key,
            run_date,
            lookback_days,
            sources,
            targets: outcomes,
        };

        if result
            .targets
            .iter()
            .any(|t| t.status == TargetStatus::Success)
        {
            self.configs.touch(&result.post_ref, Utc::now()).await?;
        }

        let status = result.status();
        info!("{} finished: {} ({})", result.post_ref, status.as_str(), result.summary());
        emit(
            events,
            PipelineEvent::Finished {
                status,
                summary: result.summary(),
            },
        )
        .await;

        Ok(result)
    }

    async fn harvest(
        &self,
        post_ref: &str,
        source: &SourceConfig,
        run_date: NaiveDate,
        mode: ExtractionMode,
        events: &mpsc::Sender<PipelineEvent>,
    ) -> Harvest {
        let resolution = self.registry.resolve(&source.url, source.extractor.as_deref());
        let extractor = resolution.extractor;
        let key = extractor.key().to_string();
        debug!(
            "{} -> extractor {} ({})",
            source.url,
            key,
            resolution.resolved_by.as_str()
        );

        let outcome = async {
            let body =
                fetch_with_timeout(self.fetcher.as_ref(), &source.url, self.options.fetch_timeout)
                    .await?;
            emit(
                events,
                PipelineEvent::SourceFetched {
                    url: source.url.clone(),
                    bytes: body.len(),
                },
            )
            .await;

            let document = SourceDocument::new(&source.url, body);
            let mut items = Vec::new();
            if mode.wants_links() {
                items.extend(extractor.extract(&document, run_date).await?);
            }
            if mode.wants_promo_codes() && extractor.supports_promo_codes() {
                items.extend(extractor.extract_promo_codes(&document, run_date).await?);
            }
            Ok::<_, SourceError>(items)
        }
        .await;

        let (items, error, event, monitoring) = match outcome {
            Ok(items) => {
                let event = PipelineEvent::SourceExtracted {
                    url: source.url.clone(),
                    extractor: key.clone(),
                    items: items.len(),
                };
                let monitoring = SourceMonitoringEvent::success(
                    post_ref,
                    &source.url,
                    &key,
                    run_date,
                    items.len(),
                    extractor.confidence(),
                );
                (items, None, event, monitoring)
            }
            Err(e) => {
                warn!("Source {} failed for {}: {}", source.url, post_ref, e);
                let event = PipelineEvent::SourceFailed {
                    url: source.url.clone(),
                    error: e.to_string(),
                };
                let monitoring = SourceMonitoringEvent::failure(
                    post_ref,
                    &source.url,
                    &key,
                    run_date,
                    &e.to_string(),
                );
                (Vec::new(), Some(e), event, monitoring)
            }
        };
        emit(events, event).await;

        if let Some(sink) = &self.monitoring {
            if let Err(e) = sink.record(&monitoring).await {
                warn!("Failed to record source monitoring for {}: {}", source.url, e);
            }
        }

        Harvest {
            result: SourceResult {
                url: source.url.clone(),
                extractor: key,
                resolved_by: resolution.resolved_by,
                items,
                error,
            },
            lookback_days: extractor.lookback_days(),
        }
    }

    /// Dedupe, publish, then persist for one target. Storage errors propagate.
    #[allow(clippy::too_many_arguments)]
    async fn publish_target(
        &self,
        config: &PostConfig,
        post_ref: &str,
        target: &str,
        run_date: NaiveDate,
        lookback_days: u32,
        items: &[Item],
        events: &mpsc::Sender<PipelineEvent>,
    ) -> Result<TargetOutcome, StorageError> {
        let post_id = match resolve_post_id(config, target) {
            Ok(id) => id,
            Err(e) => {
                warn!("{}", e);
                emit(
                    events,
                    PipelineEvent::TargetFailed {
                        target: target.to_string(),
                        error: e.to_string(),
                    },
                )
                .await;
                return Ok(TargetOutcome::failed(target, None, e.into()));
            }
        };

        let known = self
            .dedup
            .known_fingerprints(post_ref, target, run_date, lookback_days)
            .await?;
        let new_items = self.dedup.filter(items.to_vec(), &known);
        emit(
            events,
            PipelineEvent::TargetDeduped {
                target: target.to_string(),
                candidates: items.len(),
                new_items: new_items.len(),
            },
        )
        .await;

        if new_items.is_empty() {
            emit(
                events,
                PipelineEvent::TargetUnchanged {
                    target: target.to_string(),
                },
            )
            .await;
            return Ok(TargetOutcome {
                target: target.to_string(),
                post_id: Some(post_id),
                status: TargetStatus::NoChanges,
                added: 0,
                candidates: items.len(),
                message: "No new items".to_string(),
                error: None,
            });
        }

        let section_title = config
            .section_title
            .clone()
            .unwrap_or_else(|| default_section_title(&new_items, run_date));
        let request = PublishRequest {
            target: target.to_string(),
            post_id,
            items: new_items,
            section_title,
            run_date,
            days_to_keep: config.days_to_keep,
            button_title: config.button_title.clone(),
        };

        match self.publisher.publish(&request).await {
            Ok(receipt) => {
                // Only after the publish succeeded.
                self.dedup
                    .persist(post_ref, target, run_date, &request.items)
                    .await?;
                let summary = summarize_added(&request.items);
                emit(
                    events,
                    PipelineEvent::TargetPublished {
                        target: target.to_string(),
                        post_id,
                        summary: summary.clone(),
                    },
                )
                .await;
                Ok(TargetOutcome {
                    target: target.to_string(),
                    post_id: Some(post_id),
                    status: TargetStatus::Success,
                    added: receipt.items_published,
                    candidates: items.len(),
                    message: summary,
                    error: None,
                })
            }
            Err(e) => {
                warn!("Publishing {} to {} failed: {}", post_ref, target, e);
                emit(
                    events,
                    PipelineEvent::TargetFailed {
                        target: target.to_string(),
                        error: e.to_string(),
                    },
                )
                .await;
                let mut outcome = TargetOutcome::failed(target, Some(post_id), e.into());
                outcome.candidates = items.len();
                Ok(outcome)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::parse_iso_date;
    use crate::repository::MemoryStore;
    use crate::testing::{ScriptedPublisher, StaticExtractor, StaticFetcher};

    fn day(s: &str) -> NaiveDate {
        parse_iso_date(s).unwrap()
    }

    struct Harness {
        store: Arc<MemoryStore>,
        publisher: Arc<ScriptedPublisher>,
        pipeline: Pipeline,
    }

    async fn harness(fetcher: StaticFetcher, extractor: StaticExtractor) -> Harness {
        let store = Arc::new(MemoryStore::new());
        let publisher = Arc::new(ScriptedPublisher::new());
        let registry = ExtractorRegistry::builder(Arc::new(extractor)).build();
        let pipeline = Pipeline::new(
            store.clone(),
            store.clone(),
            Arc::new(registry),
            Arc::new(fetcher),
            publisher.clone(),
            PipelineOptions::default(),
        )
        .with_monitoring(store.clone());

        let mut config = PostConfig::with_post_id(105);
        config.source_urls.push(SourceConfig::new("https://x/daily"));
        config.site_target_post_ids.insert("this".into(), 105);
        config.site_target_post_ids.insert("casino".into(), 89);
        store.save_config(&config).await.unwrap();

        Harness {
            store,
            publisher,
            pipeline,
        }
    }

    #[tokio::test]
    async fn test_missing_post() {
        let h = harness(StaticFetcher::new(), StaticExtractor::new("ai")).await;
        let err = h
            .pipeline
            .run("nope", &TargetSelector::default(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::PostNotFound(_)));
    }

    #[tokio::test]
    async fn test_publishes_then_persists() {
        let date = day("2025-10-26");
        let extractor = StaticExtractor::new("ai").with_items(vec![
            Item::link("https://x/a", None, date),
            Item::link("https://x/b", None, date),
        ]);
        let h = harness(StaticFetcher::new().page("https://x/daily", "<html/>"), extractor).await;

        let result = h
            .pipeline
            .run("105", &TargetSelector::default(), Some(date))
            .await
            .unwrap();
        assert_eq!(result.status(), crate::models::PostRunStatus::Success);
        assert_eq!(result.target("this").unwrap().added, 2);
        assert_eq!(h.publisher.published().await.len(), 1);
        assert_eq!(h.store.get_known("105", date, "this").await.unwrap().len(), 2);
        assert!(h.store.get_config("105").await.unwrap().unwrap().last_updated.is_some());

        let events = h.store.monitoring_events().await;
        assert_eq!(events.len(), 1);
        assert!(events[0].success);
        assert_eq!(events[0].items_found, 2);
    }

    #[tokio::test]
    async fn test_all_sources_failed_publishes_nothing() {
        let date = day("2025-10-26");
        let extractor =
            StaticExtractor::new("ai").with_items(vec![Item::link("https://x/a", None, date)]);
        let h = harness(StaticFetcher::new(), extractor).await;

        let result = h
            .pipeline
            .run("105", &TargetSelector::All, Some(date))
            .await
            .unwrap();
        assert_eq!(result.status(), crate::models::PostRunStatus::Failed);
        assert_eq!(result.targets.len(), 2);
        assert!(result
            .targets
            .iter()
            .all(|t| matches!(t.error, Some(TargetFailure::NoSourceSucceeded))));
        assert!(h.publisher.published().await.is_empty());
        assert!(!h.store.monitoring_events().await[0].success);
    }

    #[tokio::test]
    async fn test_unresolved_target_is_isolated() {
        let date = day("2025-10-26");
        let extractor =
            StaticExtractor::new("ai").with_items(vec![Item::link("https://x/a", None, date)]);
        let h = harness(StaticFetcher::new().page("https://x/daily", "ok"), extractor).await;
        let mut config = PostConfig::with_slug("slugged");
        config.source_urls.push(SourceConfig::new("https://x/daily"));
        config.site_target_post_ids.insert("casino".into(), 89);
        h.store.save_config(&config).await.unwrap();

        let result = h
            .pipeline
            .run("slugged", &TargetSelector::All, Some(date))
            .await
            .unwrap();
        assert!(matches!(
            result.target("this").unwrap().error,
            Some(TargetFailure::Unresolved(_))
        ));
        assert_eq!(result.target("casino").unwrap().status, TargetStatus::Success);
        assert_eq!(result.status(), crate::models::PostRunStatus::Success);
    }

    #[tokio::test]
    async fn test_events_stream() {
        let date = day("2025-10-26");
        let extractor =
            StaticExtractor::new("ai").with_items(vec![Item::link("https://x/a", None, date)]);
        let h = harness(StaticFetcher::new().page("https://x/daily", "ok"), extractor).await;

        let (tx, mut rx) = mpsc::channel(64);
        h.pipeline
            .run_with_events("105", &TargetSelector::default(), Some(date), &tx)
            .await
            .unwrap();
        drop(tx);

        let mut lines = Vec::new();
        while let Some(event) = rx.recv().await {
            lines.push(event.describe());
        }
        assert!(lines[0].starts_with("Starting 105 for 2025-10-26"));
        assert!(lines.iter().any(|l| l == "[this] Added 1 link to post 105"));
        assert!(lines.last().unwrap().starts_with("Finished (success)"));
    }
}

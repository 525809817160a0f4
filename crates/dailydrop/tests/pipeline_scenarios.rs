//! End-to-end pipeline scenarios against in-memory stores and scripted
//! collaborators.

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;

use dailydrop::batch::{BatchManager, BatchOptions, SubmitOutcome};
use dailydrop::extractors::{Extractor, ExtractorRegistry};
use dailydrop::models::{
    parse_iso_date, BatchStatus, ExtractionMode, Item, ItemKind, PostConfig, PostRunStatus,
    SourceConfig,
};
use dailydrop::pipeline::{
    Pipeline, PipelineError, PipelineOptions, SourceError, TargetFailure, TargetStatus,
};
use dailydrop::http_client::FetchError;
use dailydrop::repository::{ConfigStore, FingerprintStore, MemoryStore, SqliteStore};
use dailydrop::target::TargetSelector;
use dailydrop::testing::{ScriptedPublisher, StaticExtractor, StaticFetcher, UnavailableFingerprints};

const DAILY: &str = "https://x/daily";

fn day(s: &str) -> NaiveDate {
    parse_iso_date(s).unwrap()
}

fn link(url: &str, date: &str) -> Item {
    Item::link(url, None, day(date))
}

fn registry(default: StaticExtractor, others: Vec<StaticExtractor>) -> Arc<ExtractorRegistry> {
    let mut builder = ExtractorRegistry::builder(Arc::new(default));
    for extractor in others {
        let extractor: Arc<dyn Extractor> = Arc::new(extractor);
        builder.register(extractor).unwrap();
    }
    Arc::new(builder.build())
}

fn pipeline(
    store: &Arc<MemoryStore>,
    registry: Arc<ExtractorRegistry>,
    fetcher: StaticFetcher,
    publisher: &Arc<ScriptedPublisher>,
) -> Pipeline {
    Pipeline::new(
        store.clone(),
        store.clone(),
        registry,
        Arc::new(fetcher),
        publisher.clone(),
        PipelineOptions::default(),
    )
}

/// `{postID: 105, siteTargetPostIDs: {"this": 105, "casino": 89}}` with one source.
fn post_105() -> PostConfig {
    let mut config = PostConfig::with_post_id(105);
    config.source_urls.push(SourceConfig::new(DAILY));
    config.site_target_post_ids.insert("this".into(), 105);
    config.site_target_post_ids.insert("casino".into(), 89);
    config
}

async fn store_with(configs: &[PostConfig]) -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    for config in configs {
        store.save_config(config).await.unwrap();
    }
    store
}

#[tokio::test]
async fn test_second_run_is_a_no_op_for_every_target() {
    let store = store_with(&[post_105()]).await;
    let publisher = Arc::new(ScriptedPublisher::new());
    let extractor = StaticExtractor::new("ai").with_items(vec![
        link("https://x/a", "2025-10-26"),
        link("https://x/b", "2025-10-26"),
    ]);
    let pipeline = pipeline(
        &store,
        registry(extractor, Vec::new()),
        StaticFetcher::new().page(DAILY, "<html></html>"),
        &publisher,
    );
    let date = day("2025-10-26");

    let first = pipeline
        .run("105", &TargetSelector::All, Some(date))
        .await
        .unwrap();
    assert_eq!(first.status(), PostRunStatus::Success);
    for (target, post_id) in [("this", 105), ("casino", 89)] {
        let outcome = first.target(target).unwrap();
        assert_eq!(outcome.status, TargetStatus::Success);
        assert_eq!(outcome.added, 2);
        assert_eq!(outcome.post_id, Some(post_id));
        assert_eq!(store.get_known("105", date, target).await.unwrap().len(), 2);
    }
    let requests = publisher.published().await;
    assert_eq!(requests.len(), 2);
    assert!(requests.iter().all(|r| r.items.len() == 2));
    assert_eq!(publisher.published_to("casino").await[0].post_id, 89);

    let second = pipeline
        .run("105", &TargetSelector::All, Some(date))
        .await
        .unwrap();
    assert_eq!(second.status(), PostRunStatus::NoChanges);
    assert!(second
        .targets
        .iter()
        .all(|t| t.status == TargetStatus::NoChanges && t.added == 0));
    assert_eq!(publisher.published().await.len(), 2);
}

#[tokio::test]
async fn test_pipeline_run_can_be_spawned() {
    let store = store_with(&[post_105()]).await;
    let publisher = Arc::new(ScriptedPublisher::new());
    let pipeline = pipeline(
        &store,
        registry(
            StaticExtractor::new("ai").with_items(vec![link("https://x/a", "2025-10-26")]),
            Vec::new(),
        ),
        StaticFetcher::new().page(DAILY, "ok"),
        &publisher,
    );

    let handle = tokio::spawn(async move {
        pipeline
            .run("105", &TargetSelector::default(), Some(day("2025-10-26")))
            .await
    });
    let result = handle.await.unwrap().unwrap();
    assert_eq!(result.status(), PostRunStatus::Success);
    assert_eq!(publisher.published().await.len(), 1);
}

#[tokio::test]
async fn test_lookback_filters_echoed_items_once() {
    let store = store_with(&[post_105()]).await;
    let publisher = Arc::new(ScriptedPublisher::new());

    // Day one publishes `a`.
    let day_one = pipeline(
        &store,
        registry(
            StaticExtractor::new("ai")
                .with_lookback(1)
                .with_items(vec![link("https://x/a", "2025-10-25")]),
            Vec::new(),
        ),
        StaticFetcher::new().page(DAILY, "ok"),
        &publisher,
    );
    day_one
        .run("105", &TargetSelector::default(), Some(day("2025-10-25")))
        .await
        .unwrap();

    // Day two echoes `a`, adds an unseen item dated yesterday and one dated today.
    let day_two = pipeline(
        &store,
        registry(
            StaticExtractor::new("ai").with_lookback(1).with_items(vec![
                link("https://x/a", "2025-10-25"),
                link("https://x/c", "2025-10-25"),
                link("https://x/b", "2025-10-26"),
            ]),
            Vec::new(),
        ),
        StaticFetcher::new().page(DAILY, "ok"),
        &publisher,
    );
    let result = day_two
        .run("105", &TargetSelector::default(), Some(day("2025-10-26")))
        .await
        .unwrap();
    assert_eq!(result.lookback_days, 1);
    assert_eq!(result.target("this").unwrap().added, 2);
    let published = publisher.published().await;
    let urls: Vec<&str> = published[1].items.iter().map(|i| i.identity()).collect();
    assert_eq!(urls, vec!["https://x/c", "https://x/b"]);

    // Day three still echoes `c`; it was seen on day two.
    let day_three = pipeline(
        &store,
        registry(
            StaticExtractor::new("ai")
                .with_lookback(1)
                .with_items(vec![link("https://x/c", "2025-10-25")]),
            Vec::new(),
        ),
        StaticFetcher::new().page(DAILY, "ok"),
        &publisher,
    );
    let result = day_three
        .run("105", &TargetSelector::default(), Some(day("2025-10-27")))
        .await
        .unwrap();
    assert_eq!(result.status(), PostRunStatus::NoChanges);
}

#[tokio::test]
async fn test_zero_lookback_does_not_see_yesterday() {
    let store = store_with(&[post_105()]).await;
    let publisher = Arc::new(ScriptedPublisher::new());
    let extractor = StaticExtractor::new("ai").with_items(vec![link("https://x/a", "2025-10-25")]);
    let pipeline = pipeline(
        &store,
        registry(extractor, Vec::new()),
        StaticFetcher::new().page(DAILY, "ok"),
        &publisher,
    );

    pipeline
        .run("105", &TargetSelector::default(), Some(day("2025-10-25")))
        .await
        .unwrap();
    let result = pipeline
        .run("105", &TargetSelector::default(), Some(day("2025-10-26")))
        .await
        .unwrap();
    assert_eq!(result.lookback_days, 0);
    assert_eq!(result.status(), PostRunStatus::Success);
}

#[tokio::test]
async fn test_lookback_is_the_maximum_across_extractors() {
    let mut config = post_105();
    config
        .source_urls
        .push(SourceConfig::new("https://echo.example/list").with_extractor("echo"));
    let store = store_with(&[config]).await;
    let publisher = Arc::new(ScriptedPublisher::new());
    let pipeline = pipeline(
        &store,
        registry(
            StaticExtractor::new("ai"),
            vec![StaticExtractor::new("echo").with_lookback(2)],
        ),
        StaticFetcher::new()
            .page(DAILY, "ok")
            .page("https://echo.example/list", "ok"),
        &publisher,
    );

    let result = pipeline
        .run("105", &TargetSelector::default(), Some(day("2025-10-26")))
        .await
        .unwrap();
    assert_eq!(result.lookback_days, 2);
    assert_eq!(result.sources[1].extractor, "echo");
}

#[tokio::test]
async fn test_failed_source_is_isolated() {
    let source_a = "https://a.example/daily";
    let source_b = "https://b.example/daily";
    let mut config = PostConfig::with_slug("spins");
    config.post_id = Some(105);
    config.source_urls.push(SourceConfig::new(source_a));
    config.source_urls.push(SourceConfig::new(source_b));
    let store = store_with(&[config]).await;
    let publisher = Arc::new(ScriptedPublisher::new());

    let extractor = StaticExtractor::new("ai")
        .with_items_for(source_a, vec![link("https://x/from-a", "2025-10-26")])
        .with_items_for(source_b, vec![link("https://x/from-b", "2025-10-26")]);
    let pipeline = pipeline(
        &store,
        registry(extractor, Vec::new()),
        StaticFetcher::new().status(source_a, 503).page(source_b, "ok"),
        &publisher,
    );

    let result = pipeline
        .run("spins", &TargetSelector::default(), Some(day("2025-10-26")))
        .await
        .unwrap();
    assert_eq!(result.status(), PostRunStatus::Success);

    let errors: Vec<&str> = result.source_errors().map(|s| s.url.as_str()).collect();
    assert_eq!(errors, vec![source_a]);
    assert!(matches!(
        result.sources[0].error,
        Some(SourceError::Fetch(FetchError::Status { status: 503, .. }))
    ));

    let published = publisher.published().await;
    assert_eq!(published.len(), 1);
    let urls: Vec<&str> = published[0].items.iter().map(|i| i.identity()).collect();
    assert_eq!(urls, vec!["https://x/from-b"]);
}

#[tokio::test]
async fn test_extraction_error_is_a_source_failure() {
    let mut config = post_105();
    config
        .source_urls
        .push(SourceConfig::new("https://broken.example/").with_extractor("broken"));
    let store = store_with(&[config]).await;
    let publisher = Arc::new(ScriptedPublisher::new());
    let pipeline = pipeline(
        &store,
        registry(
            StaticExtractor::new("ai").with_items_for(DAILY, vec![link("https://x/a", "2025-10-26")]),
            vec![StaticExtractor::new("broken").failing("no list found")],
        ),
        StaticFetcher::new()
            .page(DAILY, "ok")
            .page("https://broken.example/", "ok"),
        &publisher,
    );

    let result = pipeline
        .run("105", &TargetSelector::default(), Some(day("2025-10-26")))
        .await
        .unwrap();
    assert!(matches!(
        result.sources[1].error,
        Some(SourceError::Extraction(_))
    ));
    assert_eq!(result.target("this").unwrap().added, 1);
}

#[tokio::test(start_paused = true)]
async fn test_stalled_fetch_times_out_as_source_failure() {
    let mut config = post_105();
    config
        .source_urls
        .push(SourceConfig::new("https://slow.example/"));
    let store = store_with(&[config]).await;
    let publisher = Arc::new(ScriptedPublisher::new());
    let pipeline = Pipeline::new(
        store.clone(),
        store.clone(),
        registry(
            StaticExtractor::new("ai").with_items_for(DAILY, vec![link("https://x/a", "2025-10-26")]),
            Vec::new(),
        ),
        Arc::new(
            StaticFetcher::new()
                .page(DAILY, "ok")
                .stalled("https://slow.example/"),
        ),
        publisher.clone(),
        PipelineOptions {
            fetch_timeout: Duration::from_secs(5),
            source_concurrency: 2,
        },
    );

    let result = pipeline
        .run("105", &TargetSelector::default(), Some(day("2025-10-26")))
        .await
        .unwrap();
    assert!(matches!(
        result.sources[1].error,
        Some(SourceError::Fetch(FetchError::Timeout { .. }))
    ));
    assert_eq!(result.status(), PostRunStatus::Success);
}

#[tokio::test]
async fn test_failed_target_does_not_persist() {
    let mut config = post_105();
    config.site_target_post_ids.insert("minecraft".into(), 12);
    let store = store_with(&[config]).await;
    let failing = Arc::new(ScriptedPublisher::new().failing_target("minecraft"));
    let extractor = StaticExtractor::new("ai").with_items(vec![link("https://x/a", "2025-10-26")]);
    let date = day("2025-10-26");

    let result = pipeline(
        &store,
        registry(extractor.clone(), Vec::new()),
        StaticFetcher::new().page(DAILY, "ok"),
        &failing,
    )
    .run("105", &TargetSelector::All, Some(date))
    .await
    .unwrap();

    let minecraft = result.target("minecraft").unwrap();
    assert_eq!(minecraft.status, TargetStatus::Failed);
    assert!(matches!(minecraft.error, Some(TargetFailure::Publish(_))));
    assert_eq!(result.target("casino").unwrap().status, TargetStatus::Success);
    assert_eq!(store.get_known("105", date, "casino").await.unwrap().len(), 1);
    assert!(store.get_known("105", date, "minecraft").await.unwrap().is_empty());

    // The next run retries the same item for the failed target only.
    let healthy = Arc::new(ScriptedPublisher::new());
    let retry = pipeline(
        &store,
        registry(extractor, Vec::new()),
        StaticFetcher::new().page(DAILY, "ok"),
        &healthy,
    )
    .run("105", &TargetSelector::All, Some(date))
    .await
    .unwrap();
    assert_eq!(retry.target("minecraft").unwrap().added, 1);
    assert_eq!(retry.target("casino").unwrap().status, TargetStatus::NoChanges);
    assert_eq!(healthy.published().await.len(), 1);
}

#[tokio::test]
async fn test_storage_outage_aborts_the_post() {
    let store = store_with(&[post_105()]).await;
    let publisher = Arc::new(ScriptedPublisher::new());
    let pipeline = Pipeline::new(
        store.clone(),
        Arc::new(UnavailableFingerprints),
        registry(
            StaticExtractor::new("ai").with_items(vec![link("https://x/a", "2025-10-26")]),
            Vec::new(),
        ),
        Arc::new(StaticFetcher::new().page(DAILY, "ok")),
        publisher.clone(),
        PipelineOptions::default(),
    );

    let err = pipeline
        .run("105", &TargetSelector::default(), Some(day("2025-10-26")))
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::Storage(_)));
    assert!(publisher.published().await.is_empty());
}

#[tokio::test]
async fn test_extraction_mode_selects_item_kinds() {
    let mut both = post_105();
    both.extraction_mode = ExtractionMode::Both;
    let mut codes_only = PostConfig::with_slug("codes");
    codes_only.post_id = Some(7);
    codes_only.extraction_mode = ExtractionMode::PromoCodes;
    codes_only.source_urls.push(SourceConfig::new(DAILY));
    let store = store_with(&[both, codes_only]).await;
    let publisher = Arc::new(ScriptedPublisher::new());
    let extractor = StaticExtractor::new("ai")
        .with_items(vec![link("https://x/a", "2025-10-26")])
        .with_codes(vec![Item::promo_code("spin25", None, day("2025-10-26"))]);
    let pipeline = pipeline(
        &store,
        registry(extractor, Vec::new()),
        StaticFetcher::new().page(DAILY, "ok"),
        &publisher,
    );

    let result = pipeline
        .run("105", &TargetSelector::default(), Some(day("2025-10-26")))
        .await
        .unwrap();
    assert_eq!(
        result.target("this").unwrap().message,
        "Added 1 link and 1 promo code"
    );

    let result = pipeline
        .run("codes", &TargetSelector::default(), Some(day("2025-10-26")))
        .await
        .unwrap();
    assert_eq!(result.target("this").unwrap().added, 1);
    let published = publisher.published().await;
    assert_eq!(published[1].post_id, 7);
    assert!(published[1].items.iter().all(|i| i.kind() == ItemKind::PromoCode));
    assert_eq!(published[1].section_title, "Promo Codes for October 26, 2025");
}

#[tokio::test]
async fn test_post_without_sources_is_rejected() {
    let store = store_with(&[PostConfig::with_slug("empty")]).await;
    let publisher = Arc::new(ScriptedPublisher::new());
    let pipeline = pipeline(
        &store,
        registry(StaticExtractor::new("ai"), Vec::new()),
        StaticFetcher::new(),
        &publisher,
    );
    let err = pipeline
        .run("empty", &TargetSelector::default(), None)
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::NoSources(_)));
}

#[tokio::test]
async fn test_batch_counts_isolate_a_failing_post() {
    let mut configs = Vec::new();
    for id in [1, 2, 3] {
        let mut config = PostConfig::with_post_id(id);
        config.source_urls.push(SourceConfig::new(DAILY));
        configs.push(config);
    }
    let store = store_with(&configs).await;
    let publisher = Arc::new(ScriptedPublisher::new().failing_post(2));
    let extractor = StaticExtractor::new("ai").with_items(vec![link("https://x/a", "2025-10-26")]);
    let pipeline = pipeline(
        &store,
        registry(extractor, Vec::new()),
        StaticFetcher::new().page(DAILY, "ok"),
        &publisher,
    );
    let manager = BatchManager::new(
        pipeline,
        BatchOptions {
            workers: 3,
            log_capacity: 100,
            ..BatchOptions::default()
        },
    );

    let outcome = manager
        .submit_for_date(
            vec!["1".into(), "2".into(), "3".into()],
            &TargetSelector::default(),
            "scheduler",
            Some(day("2025-10-26")),
            false,
        )
        .await
        .unwrap();
    let SubmitOutcome::Queued(request_id) = outcome else {
        panic!("asynchronous submission should return a request id");
    };

    let run = manager.wait(request_id).await.unwrap();
    assert_eq!(run.counts.succeeded, 2);
    assert_eq!(run.counts.failed, 1);
    assert_eq!(run.status, BatchStatus::PartialSuccess);
    assert_eq!(run.post("2").unwrap().status, PostRunStatus::Failed);
    for post in ["1", "3"] {
        assert!(matches!(
            run.post(post).unwrap().status,
            PostRunStatus::Success | PostRunStatus::NoChanges
        ));
    }

    let logs = manager.logs(request_id, "2", 0).await.unwrap();
    assert!(logs.iter().any(|l| l.contains("[this] Failed")));
    assert_eq!(manager.status(request_id).await.unwrap().initiator, "scheduler");
}

#[tokio::test]
async fn test_sqlite_store_keeps_runs_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let sqlite = Arc::new(SqliteStore::from_path(&dir.path().join("dailydrop.db")));
    sqlite.init_schema().await.unwrap();
    sqlite.save_config(&post_105()).await.unwrap();

    let publisher = Arc::new(ScriptedPublisher::new());
    let pipeline = Pipeline::new(
        sqlite.clone(),
        sqlite.clone(),
        registry(
            StaticExtractor::new("ai").with_items(vec![
                link("https://x/a", "2025-10-26"),
                link("https://x/b", "2025-10-26"),
            ]),
            Vec::new(),
        ),
        Arc::new(StaticFetcher::new().page(DAILY, "ok")),
        publisher.clone(),
        PipelineOptions::default(),
    )
    .with_monitoring(sqlite.clone());
    let date = day("2025-10-26");

    let first = pipeline.run("105", &TargetSelector::All, Some(date)).await.unwrap();
    assert_eq!(first.items_added(), 4);
    let second = pipeline.run("105", &TargetSelector::All, Some(date)).await.unwrap();
    assert_eq!(second.status(), PostRunStatus::NoChanges);
    assert_eq!(sqlite.get_known("105", date, "casino").await.unwrap().len(), 2);
    assert_eq!(sqlite.recent_monitoring(10).await.unwrap().len(), 2);
}

//! Batch orchestrator: many pipelines under a bounded worker pool.
//!
//! Each post in a batch is owned by exactly one task, which is the only
//! writer of that post's state. Status and log polling take read locks and
//! may run concurrently with workers.

use std::cmp::Reverse;
use std::collections::{HashMap, HashSet, VecDeque};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use futures::FutureExt;
use thiserror::Error;
use tokio::sync::{mpsc, watch, RwLock, Semaphore};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::models::{BatchCounts, BatchRun, PostRunState, PostRunStatus};
use crate::pipeline::{Pipeline, PipelineEvent};
use crate::target::TargetSelector;

/// Progress checkpoints reported while a post runs.
const PROGRESS_STARTED: u8 = 5;
const PROGRESS_SOURCES_DONE: u8 = 60;
const PROGRESS_DEDUPED: u8 = 70;
const PROGRESS_TARGETS_DONE: u8 = 95;
const PROGRESS_COMPLETE: u8 = 100;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BatchError {
    #[error("a batch needs at least one post")]
    Empty,
}

#[derive(Debug, Clone)]
pub struct BatchOptions {
    /// Concurrent pipelines across every batch of this manager.
    pub workers: usize,
    /// Log lines kept per post; older lines are dropped.
    pub log_capacity: usize,
    /// Finished batches older than this are evicted on the next submit.
    pub retention: Duration,
    /// Finished batches kept at most; the oldest go first.
    pub max_finished: usize,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            workers: 4,
            log_capacity: 500,
            retention: Duration::from_secs(3600),
            max_finished: 50,
        }
    }
}

/// Result of [`BatchManager::submit`].
#[derive(Debug, Clone)]
pub enum SubmitOutcome {
    /// Scheduled; poll [`BatchManager::status`] with this id.
    Queued(Uuid),
    /// Synchronous submission: every post is terminal.
    Completed(BatchRun),
}

impl SubmitOutcome {
    pub fn request_id(&self) -> Uuid {
        match self {
            Self::Queued(id) => *id,
            Self::Completed(run) => run.request_id,
        }
    }
}

struct SlotState {
    run: PostRunState,
    logs: VecDeque<String>,
}

/// One post's state inside a batch.
struct PostSlot {
    post_ref: String,
    log_capacity: usize,
    state: RwLock<SlotState>,
}

impl PostSlot {
    fn new(post_ref: &str, log_capacity: usize) -> Self {
        Self {
            post_ref: post_ref.to_string(),
            log_capacity: log_capacity.max(1),
            state: RwLock::new(SlotState {
                run: PostRunState::queued(post_ref),
                logs: VecDeque::new(),
            }),
        }
    }

    fn push_log(&self, state: &mut SlotState, line: String) {
        if state.logs.len() >= self.log_capacity {
            state.logs.pop_front();
        }
        state
            .logs
            .push_back(format!("[{}] {}", Utc::now().format("%H:%M:%S"), line));
    }

    async fn start(&self) {
        let mut state = self.state.write().await;
        state.run.status = PostRunStatus::Running;
        state.run.progress_percent = PROGRESS_STARTED;
        state.run.message = "Running".to_string();
        state.run.started_at = Some(Utc::now());
        self.push_log(&mut state, format!("Worker picked up {}", self.post_ref));
    }

    async fn record(&self, event: &PipelineEvent, progress: &mut ProgressTracker) {
        let line = event.describe();
        let mut state = self.state.write().await;
        if let Some(percent) = progress.observe(event) {
            state.run.progress_percent = state.run.progress_percent.max(percent);
        }
        if !matches!(event, PipelineEvent::Finished { .. }) {
            state.run.message = line.clone();
        }
        self.push_log(&mut state, line);
    }

    async fn finish(&self, status: PostRunStatus, message: String) {
        let mut state = self.state.write().await;
        state.run.status = status;
        state.run.progress_percent = PROGRESS_COMPLETE;
        state.run.finished_at = Some(Utc::now());
        self.push_log(&mut state, format!("{}: {}", status.as_str(), message));
        state.run.message = message;
    }

    async fn snapshot(&self) -> PostRunState {
        let state = self.state.read().await;
        let mut run = state.run.clone();
        run.log_lines = state.logs.iter().cloned().collect();
        run
    }

    async fn tail(&self, tail: usize) -> Vec<String> {
        let state = self.state.read().await;
        let skip = match tail {
            0 => 0,
            n => state.logs.len().saturating_sub(n),
        };
        state.logs.iter().skip(skip).cloned().collect()
    }
}

/// Maps pipeline events onto the progress checkpoints.
#[derive(Debug, Default)]
struct ProgressTracker {
    sources: usize,
    targets: usize,
    sources_done: usize,
    targets_done: usize,
}

fn scaled(from: u8, to: u8, done: usize, total: usize) -> u8 {
    if total == 0 {
        return to;
    }
    let span = (to - from) as usize;
    from + (span * done.min(total) / total) as u8
}

impl ProgressTracker {
    fn observe(&mut self, event: &PipelineEvent) -> Option<u8> {
        match event {
            PipelineEvent::Started {
                sources, targets, ..
            } => {
                self.sources = *sources;
                self.targets = targets.len();
                Some(PROGRESS_STARTED)
            }
            e if e.is_source_result() => {
                self.sources_done += 1;
                Some(scaled(
                    PROGRESS_STARTED,
                    PROGRESS_SOURCES_DONE,
                    self.sources_done,
                    self.sources,
                ))
            }
            PipelineEvent::TargetDeduped { .. } => Some(PROGRESS_DEDUPED),
            e if e.is_target_result() => {
                self.targets_done += 1;
                Some(scaled(
                    PROGRESS_DEDUPED,
                    PROGRESS_TARGETS_DONE,
                    self.targets_done,
                    self.targets,
                ))
            }
            _ => None,
        }
    }
}

/// One submitted batch.
struct Batch {
    request_id: Uuid,
    post_ids: Vec<String>,
    target: String,
    initiator: String,
    created_at: DateTime<Utc>,
    posts: Vec<Arc<PostSlot>>,
    finished_at: RwLock<Option<DateTime<Utc>>>,
    done: watch::Sender<bool>,
}

impl Batch {
    fn slot(&self, post_ref: &str) -> Option<&Arc<PostSlot>> {
        self.posts.iter().find(|s| s.post_ref == post_ref)
    }

    async fn snapshot(&self) -> BatchRun {
        let mut posts = Vec::with_capacity(self.posts.len());
        for slot in &self.posts {
            posts.push(slot.snapshot().await);
        }
        let counts = BatchCounts::tally(posts.iter().map(|p| &p.status));
        BatchRun {
            request_id: self.request_id,
            post_ids: self.post_ids.clone(),
            target: self.target.clone(),
            initiator: self.initiator.clone(),
            created_at: self.created_at,
            finished_at: *self.finished_at.read().await,
            status: counts.status(),
            counts,
            posts,
        }
    }
}

async fn run_post(
    pipeline: Pipeline,
    slot: Arc<PostSlot>,
    selector: TargetSelector,
    run_date: Option<NaiveDate>,
) {
    slot.start().await;

    let post_ref = slot.post_ref.clone();
    let (tx, mut rx) = mpsc::channel::<PipelineEvent>(64);
    let run = async move {
        let outcome =
            AssertUnwindSafe(pipeline.run_with_events(&post_ref, &selector, run_date, &tx))
                .catch_unwind()
                .await;
        drop(tx);
        outcome
    };
    let consume = async {
        let mut progress = ProgressTracker::default();
        while let Some(event) = rx.recv().await {
            slot.record(&event, &mut progress).await;
        }
    };
    let (outcome, ()) = tokio::join!(run, consume);

    match outcome {
        Ok(Ok(result)) => slot.finish(result.status(), result.summary()).await,
        Ok(Err(e)) => {
            error!("Pipeline for {} failed: {}", slot.post_ref, e);
            slot.finish(PostRunStatus::Failed, e.to_string()).await
        }
        Err(_) => {
            error!("Pipeline for {} panicked", slot.post_ref);
            slot.finish(PostRunStatus::Failed, "pipeline panicked".to_string())
                .await
        }
    }
}

/// Runs pipelines for lists of posts and tracks their live state.
#[derive(Clone)]
pub struct BatchManager {
    pipeline: Pipeline,
    options: BatchOptions,
    workers: Arc<Semaphore>,
    batches: Arc<RwLock<HashMap<Uuid, Arc<Batch>>>>,
}

impl BatchManager {
    pub fn new(pipeline: Pipeline, options: BatchOptions) -> Self {
        let workers = Arc::new(Semaphore::new(options.workers.max(1)));
        Self {
            pipeline,
            options,
            workers,
            batches: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn options(&self) -> &BatchOptions {
        &self.options
    }

    /// Schedule `post_refs` for today's run date.
    pub async fn submit(
        &self,
        post_refs: Vec<String>,
        target: &TargetSelector,
        initiator: &str,
        sync: bool,
    ) -> Result<SubmitOutcome, BatchError> {
        self.submit_for_date(post_refs, target, initiator, None, sync)
            .await
    }

    /// Schedule `post_refs`; returns at once unless `sync` is set.
    ///
    /// Refs naming the same post (slug and legacy id) collapse to their
    /// first occurrence, so one batch never runs a post twice.
    pub async fn submit_for_date(
        &self,
        post_refs: Vec<String>,
        target: &TargetSelector,
        initiator: &str,
        run_date: Option<NaiveDate>,
        sync: bool,
    ) -> Result<SubmitOutcome, BatchError> {
        let post_ids = self.distinct_posts(post_refs).await;
        if post_ids.is_empty() {
            return Err(BatchError::Empty);
        }
        self.evict_finished().await;

        let (done, _) = watch::channel(false);
        let batch = Arc::new(Batch {
            request_id: Uuid::new_v4(),
            posts: post_ids
                .iter()
                .map(|r| Arc::new(PostSlot::new(r, self.options.log_capacity)))
                .collect(),
            post_ids,
            target: target.as_str().to_string(),
            initiator: initiator.to_string(),
            created_at: Utc::now(),
            finished_at: RwLock::new(None),
            done,
        });
        let request_id = batch.request_id;
        self.batches
            .write()
            .await
            .insert(request_id, batch.clone());
        info!(
            "Batch {} queued by {}: {} post(s) -> {}",
            request_id,
            initiator,
            batch.posts.len(),
            batch.target
        );

        let driver = self.drive(batch.clone(), target.clone(), run_date);
        if sync {
            if let Err(e) = driver.await {
                error!("Batch {} driver ended abnormally: {}", request_id, e);
            }
            Ok(SubmitOutcome::Completed(batch.snapshot().await))
        } else {
            Ok(SubmitOutcome::Queued(request_id))
        }
    }

    /// Trim refs and drop those resolving to an already listed post.
    /// Unknown refs are kept by their text so they fail visibly.
    async fn distinct_posts(&self, post_refs: Vec<String>) -> Vec<String> {
        let configs = self.pipeline.configs();
        let mut seen = HashSet::new();
        let mut post_ids = Vec::with_capacity(post_refs.len());
        for post_ref in post_refs {
            let post_ref = post_ref.trim().to_string();
            if post_ref.is_empty() {
                continue;
            }
            let key = match configs.get_config(&post_ref).await {
                Ok(Some(config)) => config.storage_key(),
                Ok(None) => post_ref.clone(),
                Err(e) => {
                    warn!("Could not resolve {} before batching: {}", post_ref, e);
                    post_ref.clone()
                }
            };
            if seen.insert(key) {
                post_ids.push(post_ref);
            } else {
                debug!("Skipping {}: already in this batch", post_ref);
            }
        }
        post_ids
    }

    /// Drop finished batches past the retention window or beyond `max_finished`.
    async fn evict_finished(&self) -> usize {
        let now = Utc::now();
        let mut batches = self.batches.write().await;

        let mut finished = Vec::new();
        for (id, batch) in batches.iter() {
            if let Some(at) = *batch.finished_at.read().await {
                finished.push((*id, at));
            }
        }
        finished.sort_by_key(|(_, at)| Reverse(*at));

        let expired: Vec<Uuid> = finished
            .iter()
            .enumerate()
            .filter(|(rank, (_, at))| {
                *rank >= self.options.max_finished
                    || (now - *at)
                        .to_std()
                        .is_ok_and(|age| age >= self.options.retention)
            })
            .map(|(_, (id, _))| *id)
            .collect();
        for id in &expired {
            batches.remove(id);
        }
        if !expired.is_empty() {
            debug!("Evicted {} finished batch(es)", expired.len());
        }
        expired.len()
    }

    /// Start workers in submission order; resolves once every post is terminal.
    fn drive(
        &self,
        batch: Arc<Batch>,
        selector: TargetSelector,
        run_date: Option<NaiveDate>,
    ) -> tokio::task::JoinHandle<()> {
        let workers = self.workers.clone();
        let pipeline = self.pipeline.clone();
        tokio::spawn(async move {
            let mut handles = Vec::with_capacity(batch.posts.len());
            for slot in batch.posts.iter().cloned() {
                let Ok(permit) = workers.clone().acquire_owned().await else {
                    slot.finish(PostRunStatus::Failed, "worker pool closed".to_string())
                        .await;
                    continue;
                };
                let pipeline = pipeline.clone();
                let selector = selector.clone();
                handles.push(tokio::spawn(async move {
                    let _permit = permit;
                    run_post(pipeline, slot, selector, run_date).await;
                }));
            }
            for handle in handles {
                if let Err(e) = handle.await {
                    error!("Batch worker ended abnormally: {}", e);
                }
            }

            *batch.finished_at.write().await = Some(Utc::now());
            let run = batch.snapshot().await;
            info!(
                "Batch {} finished: {} ({} succeeded, {} failed)",
                batch.request_id,
                run.status.as_str(),
                run.counts.succeeded,
                run.counts.failed
            );
            batch.done.send_replace(true);
        })
    }

    /// Snapshot of one batch.
    pub async fn status(&self, request_id: Uuid) -> Option<BatchRun> {
        let batch = self.batches.read().await.get(&request_id).cloned()?;
        Some(batch.snapshot().await)
    }

    /// Last `tail` log lines of one post (`0` = all).
    pub async fn logs(&self, request_id: Uuid, post_ref: &str, tail: usize) -> Option<Vec<String>> {
        let batch = self.batches.read().await.get(&request_id).cloned()?;
        let slot = batch.slot(post_ref)?;
        Some(slot.tail(tail).await)
    }

    /// Every known batch, newest first.
    pub async fn list(&self) -> Vec<BatchRun> {
        let batches: Vec<Arc<Batch>> = self.batches.read().await.values().cloned().collect();
        let mut runs = Vec::with_capacity(batches.len());
        for batch in batches {
            runs.push(batch.snapshot().await);
        }
        runs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        runs
    }

    /// Wait until every post of the batch is terminal.
    pub async fn wait(&self, request_id: Uuid) -> Option<BatchRun> {
        let batch = self.batches.read().await.get(&request_id).cloned()?;
        let mut done = batch.done.subscribe();
        let _ = done.wait_for(|finished| *finished).await;
        Some(batch.snapshot().await)
    }
}

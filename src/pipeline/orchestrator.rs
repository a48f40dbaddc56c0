//! Pipeline orchestrator
//!
//! Owns one queue and one fixed worker pool per stage. A job advances only
//! when a stage worker finishes its batch and hands the output to the next
//! stage's queue:
//!
//! ```text
//! submit ──> crawl queue ──> clean queue ──> format queue ──> report
//!            Crawling         Cleaning        Formatting       Done
//! ```
//!
//! Every transition goes through [`JobState::can_transition_to`]. A job that
//! was cancelled or failed in the meantime rejects the transition, which is
//! how late stage results get discarded.
//!
//! Only live jobs stay in the job table. A job leaves it on its terminal
//! transition; the last few finished reports are kept for `status` lookups.

use crate::clean::clean_batch;
use crate::config::Config;
use crate::crawler::{run_crawl, CrawlContext, ExtractionService};
use crate::listing::{RawListing, ValidatedListing};
use crate::output::{build_report, render_markdown, ArtifactKind, ArtifactWriter, SortKey};
use crate::pipeline::{CrawlJob, JobId, JobReport, JobRequest};
use crate::queue::{InMemoryQueue, Redelivery, Stage, StagePayload, StageTask, TaskQueue};
use crate::state::{FailureReason, JobState};
use crate::storage::{SqliteStorage, Storage};
use crate::PipelineError;
use chrono::Utc;
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// The three stage queues
#[derive(Clone)]
pub struct StageQueues {
    pub crawl: Arc<dyn TaskQueue>,
    pub clean: Arc<dyn TaskQueue>,
    pub format: Arc<dyn TaskQueue>,
}

impl StageQueues {
    /// In-process queues delivering each task at most `max_attempts` times
    pub fn in_memory(max_attempts: u32) -> Self {
        Self {
            crawl: Arc::new(InMemoryQueue::new(Stage::Crawl, max_attempts)),
            clean: Arc::new(InMemoryQueue::new(Stage::Clean, max_attempts)),
            format: Arc::new(InMemoryQueue::new(Stage::Format, max_attempts)),
        }
    }

    pub fn get(&self, stage: Stage) -> &Arc<dyn TaskQueue> {
        match stage {
            Stage::Crawl => &self.crawl,
            Stage::Clean => &self.clean,
            Stage::Format => &self.format,
        }
    }
}

/// Caller's view of a submitted job
#[derive(Debug, Clone)]
pub struct JobHandle {
    job_id: JobId,
    status: watch::Receiver<JobReport>,
}

impl JobHandle {
    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    /// Latest snapshot
    pub fn current(&self) -> JobReport {
        self.status.borrow().clone()
    }

    /// Waits until the job reaches a terminal state
    pub async fn wait(mut self) -> JobReport {
        loop {
            {
                let report = self.status.borrow_and_update();
                if report.state.is_terminal() {
                    return report.clone();
                }
            }

            if self.status.changed().await.is_err() {
                return self.status.borrow().clone();
            }
        }
    }
}

/// Finished reports kept after their job leaves the job table
const RECENT_REPORTS: usize = 64;

struct JobEntry {
    cancel: CancellationToken,
    status: watch::Sender<JobReport>,
}

/// State shared by the orchestrator and every stage worker
struct Shared {
    queues: StageQueues,
    crawl: Arc<CrawlContext>,
    artifacts: ArtifactWriter,
    storage: Option<Mutex<SqliteStorage>>,
    sort_key: SortKey,
    config_hash: String,
    jobs: Mutex<HashMap<JobId, JobEntry>>,

    /// Most recent last; lock only while holding `jobs`
    recent: Mutex<VecDeque<JobReport>>,
}

/// Runs jobs through the crawl, clean and format stages
pub struct Orchestrator {
    shared: Arc<Shared>,
    crawl_workers: JoinSet<()>,
    clean_workers: JoinSet<()>,
    format_workers: JoinSet<()>,
}

impl Orchestrator {
    /// Starts the worker pools on in-memory queues
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(
        config: &Config,
        extractor: Arc<dyn ExtractionService>,
        config_hash: &str,
    ) -> Result<Self, PipelineError> {
        let queues = StageQueues::in_memory(config.pipeline.queue_max_attempts);
        Self::with_queues(config, extractor, config_hash, queues)
    }

    /// Starts the worker pools on the given queues
    pub fn with_queues(
        config: &Config,
        extractor: Arc<dyn ExtractionService>,
        config_hash: &str,
        queues: StageQueues,
    ) -> Result<Self, PipelineError> {
        let crawl = Arc::new(CrawlContext::from_config(config, extractor)?);
        let artifacts = ArtifactWriter::new(&config.output.directory)?;

        let storage = match &config.output.database_path {
            Some(path) => {
                tracing::info!("Recording job history in {}", path);
                Some(Mutex::new(SqliteStorage::new(Path::new(path))?))
            }
            None => None,
        };

        let shared = Arc::new(Shared {
            queues,
            crawl,
            artifacts,
            storage,
            sort_key: config.output.sort,
            config_hash: config_hash.to_string(),
            jobs: Mutex::new(HashMap::new()),
            recent: Mutex::new(VecDeque::new()),
        });

        let pipeline = &config.pipeline;
        let spawn_pool = |stage: Stage, count: usize| {
            let mut workers = JoinSet::new();
            for worker in 0..count.max(1) {
                workers.spawn(run_worker(Arc::clone(&shared), stage, worker));
            }
            workers
        };

        let crawl_workers = spawn_pool(Stage::Crawl, pipeline.crawl_workers);
        let clean_workers = spawn_pool(Stage::Clean, pipeline.clean_workers);
        let format_workers = spawn_pool(Stage::Format, pipeline.format_workers);

        tracing::info!(
            "Pipeline started: {} crawl, {} clean, {} format workers",
            crawl_workers.len(),
            clean_workers.len(),
            format_workers.len()
        );

        Ok(Self {
            shared,
            crawl_workers,
            clean_workers,
            format_workers,
        })
    }

    /// Validates a request and queues its crawl task
    pub async fn submit(&self, request: JobRequest) -> Result<JobHandle, PipelineError> {
        let job = CrawlJob::from_request(request)?;
        let job_id = job.job_id;

        let (status_tx, status_rx) = watch::channel(JobReport::new(job_id, Utc::now()));
        self.shared.lock_jobs().insert(
            job_id,
            JobEntry {
                cancel: CancellationToken::new(),
                status: status_tx,
            },
        );

        self.shared.with_storage(job_id, |storage| {
            storage.create_job(&job, &self.shared.config_hash)
        });

        tracing::info!(
            "Job {}: submitted with {} seed(s), max depth {}, max pages {}",
            job_id,
            job.seeds.len(),
            job.max_depth,
            job.max_pages
        );

        if let Err(e) = self.shared.queues.crawl.produce(StageTask::crawl(job)).await {
            self.shared.lock_jobs().remove(&job_id);
            return Err(e.into());
        }

        Ok(JobHandle {
            job_id,
            status: status_rx,
        })
    }

    /// Cancels a job that has not reached a terminal state
    ///
    /// Returns `false` if the job had already finished.
    pub fn cancel(&self, job_id: JobId) -> Result<bool, PipelineError> {
        let token = {
            let jobs = self.shared.lock_jobs();
            match jobs.get(&job_id) {
                Some(entry) => entry.cancel.clone(),
                None if self.shared.recent_report(job_id).is_some() => return Ok(false),
                None => return Err(PipelineError::UnknownJob(job_id)),
            }
        };

        match self.shared.transition(job_id, JobState::Cancelled, None) {
            Ok(()) => {
                token.cancel();
                Ok(true)
            }
            Err(PipelineError::InvalidTransition { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Latest snapshot of a live or recently finished job
    pub fn status(&self, job_id: JobId) -> Option<JobReport> {
        let jobs = self.shared.lock_jobs();
        match jobs.get(&job_id) {
            Some(entry) => Some(entry.status.borrow().clone()),
            None => self.shared.recent_report(job_id),
        }
    }

    /// A new handle on a live or recently finished job
    pub fn handle(&self, job_id: JobId) -> Option<JobHandle> {
        let jobs = self.shared.lock_jobs();
        let status = match jobs.get(&job_id) {
            Some(entry) => entry.status.subscribe(),
            None => watch::channel(self.shared.recent_report(job_id)?).1,
        };
        Some(JobHandle { job_id, status })
    }

    /// Number of jobs that have not reached a terminal state
    pub fn live_jobs(&self) -> usize {
        self.shared.lock_jobs().len()
    }

    /// Stops accepting jobs and drains the stages in order
    ///
    /// Queued tasks are still processed: the crawl pool drains first, then
    /// clean, then format.
    pub async fn shutdown(self) {
        let pools = [
            (Stage::Crawl, self.crawl_workers),
            (Stage::Clean, self.clean_workers),
            (Stage::Format, self.format_workers),
        ];

        for (stage, mut workers) in pools {
            self.shared.queues.get(stage).close();
            while let Some(joined) = workers.join_next().await {
                if let Err(e) = joined {
                    tracing::error!("{} worker ended abnormally: {}", stage, e);
                }
            }
            tracing::debug!("{} pool stopped", stage);
        }

        tracing::info!("Pipeline shut down");
    }
}

async fn run_worker(shared: Arc<Shared>, stage: Stage, worker: usize) {
    let queue = Arc::clone(shared.queues.get(stage));
    tracing::debug!("{} worker {} started", stage, worker);

    while let Some(task) = queue.consume().await {
        shared.handle(queue.as_ref(), task).await;
    }

    tracing::debug!("{} worker {} stopped", stage, worker);
}

impl Shared {
    fn lock_jobs(&self) -> MutexGuard<'_, HashMap<JobId, JobEntry>> {
        self.jobs.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_recent(&self) -> MutexGuard<'_, VecDeque<JobReport>> {
        self.recent.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Callers must hold the `jobs` lock
    fn recent_report(&self, job_id: JobId) -> Option<JobReport> {
        self.lock_recent()
            .iter()
            .rev()
            .find(|report| report.job_id == job_id)
            .cloned()
    }

    /// Cancellation token of a job that can still make progress
    fn live_token(&self, job_id: JobId) -> Option<CancellationToken> {
        let jobs = self.lock_jobs();
        let entry = jobs.get(&job_id)?;
        let terminal = entry.status.borrow().state.is_terminal();
        (!terminal && !entry.cancel.is_cancelled()).then(|| entry.cancel.clone())
    }

    fn is_terminal(&self, job_id: JobId) -> bool {
        self.lock_jobs()
            .get(&job_id)
            .map_or(true, |entry| entry.status.borrow().state.is_terminal())
    }

    fn update(&self, job_id: JobId, apply: impl FnOnce(&mut JobReport)) {
        if let Some(entry) = self.lock_jobs().get(&job_id) {
            entry.status.send_modify(apply);
        }
    }

    /// Runs `op` against the job store, if one is configured
    ///
    /// Job history is best effort; failures are logged and never affect the job.
    fn with_storage<F>(&self, job_id: JobId, op: F)
    where
        F: FnOnce(&mut SqliteStorage) -> crate::storage::StorageResult<()>,
    {
        let Some(storage) = &self.storage else {
            return;
        };
        let mut storage = storage.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Err(e) = op(&mut *storage) {
            tracing::warn!("Job {}: failed to update job history: {}", job_id, e);
        }
    }

    /// Moves a job to `to`
    ///
    /// Re-entering the current non-terminal state is a no-op so redelivered
    /// tasks can call this again.
    fn transition(
        &self,
        job_id: JobId,
        to: JobState,
        failure: Option<FailureReason>,
    ) -> Result<(), PipelineError> {
        let (from, finished) = {
            let mut jobs = self.lock_jobs();
            let entry = jobs.get(&job_id).ok_or(PipelineError::UnknownJob(job_id))?;

            let from = entry.status.borrow().state;
            if from == to && !to.is_terminal() {
                return Ok(());
            }
            if !from.can_transition_to(to) {
                return Err(PipelineError::InvalidTransition { job_id, from, to });
            }

            entry.status.send_modify(|report| {
                report.state = to;
                report.history.push(to);
                report.failure = failure;
                if to.is_terminal() {
                    report.finished_at = Some(Utc::now());
                }
            });

            let finished = to.is_terminal().then(|| entry.status.borrow().clone());
            if let Some(report) = &finished {
                jobs.remove(&job_id);
                let mut recent = self.lock_recent();
                if recent.len() == RECENT_REPORTS {
                    recent.pop_front();
                }
                recent.push_back(report.clone());
            }
            (from, finished)
        };

        tracing::info!("Job {}: {} -> {}", job_id, from, to);
        self.with_storage(job_id, |storage| storage.record_transition(job_id, from, to));

        if let Some(report) = finished {
            tracing::info!("Job {}: {}", job_id, report.summary());
            self.with_storage(job_id, |storage| storage.finish_job(&report));
        }

        Ok(())
    }

    fn fail(&self, job_id: JobId, reason: FailureReason) -> Result<(), PipelineError> {
        tracing::warn!("Job {}: failed: {}", job_id, reason);
        self.transition(job_id, JobState::Failed, Some(reason))
    }

    async fn handle(&self, queue: &dyn TaskQueue, task: StageTask) {
        let (job_id, stage) = (task.job_id, task.stage);

        let Some(cancel) = self.live_token(job_id) else {
            tracing::debug!(
                "Job {}: discarding {} task {}, job is no longer active",
                job_id,
                stage,
                task.task_id
            );
            return;
        };

        tracing::debug!(
            "Job {}: {} task {} delivery {}",
            job_id,
            stage,
            task.task_id,
            task.attempt
        );

        let result = match self.transition(job_id, JobState::for_stage(stage), None) {
            Ok(()) => match &task.payload {
                StagePayload::Crawl(job) => self.crawl_stage(job, cancel).await,
                StagePayload::Clean(raw) => self.clean_stage(job_id, raw).await,
                StagePayload::Format(listings) => self.format_stage(job_id, listings),
            },
            Err(e) => Err(e),
        };

        let Err(error) = result else {
            return;
        };

        if self.is_terminal(job_id) {
            tracing::debug!("Job {}: {} result discarded: {}", job_id, stage, error);
            return;
        }

        self.redeliver(queue, task, error.to_string()).await;
    }

    async fn redeliver(&self, queue: &dyn TaskQueue, task: StageTask, error: String) {
        let (job_id, stage) = (task.job_id, task.stage);
        self.update(job_id, |report| report.last_error = Some(error.clone()));

        match queue.retry(task).await {
            Ok(Redelivery::Requeued { attempt }) => {
                tracing::warn!(
                    "Job {}: {} stage failed ({}), redelivering as attempt {}",
                    job_id,
                    stage,
                    error,
                    attempt
                );
            }
            Ok(Redelivery::Exhausted { attempts }) => {
                tracing::error!(
                    "Job {}: {} stage failed after {} attempts: {}",
                    job_id,
                    stage,
                    attempts,
                    error
                );
                self.abort(job_id, stage);
            }
            Err(e) => {
                tracing::error!("Job {}: could not redeliver {} task: {}", job_id, stage, e);
                self.abort(job_id, stage);
            }
        }
    }

    fn abort(&self, job_id: JobId, stage: Stage) {
        let aborted = PipelineError::StageAborted { job_id, stage };
        self.update(job_id, |report| report.last_error = Some(aborted.to_string()));

        if let Err(e) = self.fail(job_id, FailureReason::StageAborted { stage }) {
            tracing::debug!("Job {}: not marked failed: {}", job_id, e);
        }
    }

    async fn crawl_stage(
        &self,
        job: &CrawlJob,
        cancel: CancellationToken,
    ) -> Result<(), PipelineError> {
        let job_id = job.job_id;
        let outcome = run_crawl(Arc::clone(&self.crawl), job, cancel.clone()).await;

        if outcome.cancelled || cancel.is_cancelled() {
            tracing::info!(
                "Job {}: discarding crawl results after cancellation ({} pages fetched)",
                job_id,
                outcome.stats.succeeded
            );
            return Ok(());
        }

        let stats = outcome.stats.clone();
        let path = self.artifacts.write_json(
            ArtifactKind::RawListings,
            job_id,
            Utc::now(),
            &outcome.listings,
        )?;
        self.update(job_id, |report| {
            report.crawl = Some(stats.clone());
            report.artifacts.set(ArtifactKind::RawListings, path);
        });

        if stats.succeeded == 0 {
            return self.fail(job_id, FailureReason::NoPagesFetched);
        }
        if stats.extraction_always_unavailable() {
            return self.fail(job_id, FailureReason::ExtractionUnavailable);
        }

        self.hand_off(job_id, StageTask::clean(job_id, outcome.listings))
            .await
    }

    async fn clean_stage(&self, job_id: JobId, raw: &[RawListing]) -> Result<(), PipelineError> {
        let outcome = clean_batch(raw);
        let stats = outcome.stats.clone();

        if self.is_terminal(job_id) {
            tracing::debug!("Job {}: cleaned batch discarded, job already finished", job_id);
            return Ok(());
        }

        tracing::info!(
            "Job {}: {} of {} raw listings retained ({} dropped, {} merged)",
            job_id,
            stats.retained,
            stats.received,
            stats.dropped,
            stats.merged
        );

        let path = self.artifacts.write_json(
            ArtifactKind::ValidatedListings,
            job_id,
            Utc::now(),
            &outcome.listings,
        )?;
        self.update(job_id, |report| {
            report.clean = Some(stats);
            report.artifacts.set(ArtifactKind::ValidatedListings, path);
        });

        self.hand_off(job_id, StageTask::format(job_id, outcome.listings))
            .await
    }

    fn format_stage(
        &self,
        job_id: JobId,
        listings: &[ValidatedListing],
    ) -> Result<(), PipelineError> {
        let report = build_report(job_id, listings.to_vec(), self.sort_key, Utc::now());
        let markdown = render_markdown(&report);

        if self.is_terminal(job_id) {
            return Ok(());
        }

        let path = self.artifacts.write_text(
            ArtifactKind::Report,
            job_id,
            report.generated_at,
            &markdown,
        )?;
        tracing::info!(
            "Job {}: report with {} listings written to {}",
            job_id,
            report.counts.listings,
            path.display()
        );

        let counts = report.counts.clone();
        self.update(job_id, |job_report| {
            job_report.report = Some(counts);
            job_report.artifacts.set(ArtifactKind::Report, path);
        });

        self.transition(job_id, JobState::Done, None)
    }

    /// Advances the job to the task's stage and queues the task
    async fn hand_off(&self, job_id: JobId, task: StageTask) -> Result<(), PipelineError> {
        let stage = task.stage;
        self.transition(job_id, JobState::for_stage(stage), None)?;
        self.queues.get(stage).produce(task).await?;
        Ok(())
    }
}

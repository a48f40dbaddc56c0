//! Crawl stage
//!
//! Drives one job's frontier to exhaustion with a pool of fetch workers.
//! Each worker loops over:
//! - take the next frontier entry
//! - wait for the host's pacing slot and fetch it (with retries)
//! - follow redirects through the frontier so no page is fetched twice
//! - offer same-host links back to the frontier
//! - hand the page text to the extraction service, one chunk at a time
//!
//! A page that fails at any step is counted and skipped; the crawl itself
//! never fails. Whether the job as a whole failed is decided by the
//! orchestrator from the returned [`CrawlStats`].

use crate::config::Config;
use crate::crawler::chunk::{chunk_page_text, ChunkLimits};
use crate::crawler::extraction::{extract_with_retry, ExtractionError, ExtractionRequest, ExtractionRetry};
use crate::crawler::fetcher::{
    build_http_client, fetch_with_retry, FetchError, FetchResponse, FetchedPage, MAX_REDIRECTS,
};
use crate::crawler::frontier::{Admission, Frontier, FrontierEntry};
use crate::crawler::pacer::HostPacer;
use crate::crawler::parser::parse_html;
use crate::crawler::ExtractionService;
use crate::listing::RawListing;
use crate::pipeline::CrawlJob;
use crate::retry::RetryPolicy;
use crate::url::{extract_domain, same_site};
use chrono::Utc;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Shared, job-independent resources of the crawl stage
#[derive(Clone)]
pub struct CrawlContext {
    pub client: Client,
    pub extractor: Arc<dyn ExtractionService>,
    pub fetch_retry: RetryPolicy,
    pub extraction_retry: ExtractionRetry,

    /// Concurrent fetch workers per job
    pub fetch_workers: usize,

    pub chunk_limits: ChunkLimits,
    pub same_host_only: bool,

    /// Shared by every job, so concurrent jobs on one host are paced together
    pub pacer: Arc<HostPacer>,
}

impl CrawlContext {
    /// Builds the context from configuration
    pub fn from_config(
        config: &Config,
        extractor: Arc<dyn ExtractionService>,
    ) -> Result<Self, reqwest::Error> {
        let client = build_http_client(
            &config.user_agent,
            Duration::from_millis(config.crawler.fetch_timeout_ms),
        )?;

        Ok(Self {
            client,
            extractor,
            fetch_retry: RetryPolicy::from(&config.retry.fetch),
            extraction_retry: ExtractionRetry {
                unavailable: RetryPolicy::from(&config.retry.extraction),
                rate_limited: RetryPolicy::from(&config.retry.rate_limit),
                call_timeout: Duration::from_millis(config.extraction.timeout_ms),
            },
            fetch_workers: config.pipeline.fetch_workers.max(1),
            chunk_limits: ChunkLimits {
                max_chars: config.crawler.max_page_chars,
                overlap_chars: config.crawler.chunk_overlap_chars,
                max_chunks: config.crawler.max_chunks,
            },
            same_host_only: config.crawler.same_host_only,
            pacer: Arc::new(HostPacer::new(Duration::from_millis(
                config.crawler.minimum_time_on_page,
            ))),
        })
    }
}

/// Page-level counters for one crawl
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlStats {
    /// Pages dispatched to a fetch worker
    pub attempted: u32,

    /// Pages fetched successfully
    pub succeeded: u32,

    /// Pages that could not be fetched after retries
    pub failed: u32,

    /// Pages dropped because they redirected to an already seen or external URL
    #[serde(default)]
    pub skipped: u32,

    /// Fetched pages for which extraction failed after retries
    pub extraction_failed: u32,

    /// Subset of `extraction_failed` where the service was unavailable
    pub extraction_unavailable: u32,

    /// Raw listings produced
    pub listings: u32,
}

impl CrawlStats {
    fn absorb(&mut self, other: &CrawlStats) {
        self.attempted += other.attempted;
        self.succeeded += other.succeeded;
        self.failed += other.failed;
        self.skipped += other.skipped;
        self.extraction_failed += other.extraction_failed;
        self.extraction_unavailable += other.extraction_unavailable;
        self.listings += other.listings;
    }

    /// True when every fetched page hit an unavailable extraction service
    pub fn extraction_always_unavailable(&self) -> bool {
        self.succeeded > 0 && self.extraction_unavailable == self.succeeded
    }
}

/// Everything a crawl produced
#[derive(Debug, Default)]
pub struct CrawlOutcome {
    pub listings: Vec<RawListing>,
    pub stats: CrawlStats,

    /// URLs that could not be fetched
    pub failed_urls: Vec<Url>,

    /// Set when the crawl stopped because of cancellation
    pub cancelled: bool,
}

#[derive(Default)]
struct WorkerOutput {
    listings: Vec<RawListing>,
    stats: CrawlStats,
    failed_urls: Vec<Url>,
}

/// Crawls `job` until its frontier is exhausted or `cancel` fires
pub async fn run_crawl(
    ctx: Arc<CrawlContext>,
    job: &CrawlJob,
    cancel: CancellationToken,
) -> CrawlOutcome {
    let frontier = Arc::new(Frontier::new(job));
    let seed_hosts: Arc<BTreeSet<String>> =
        Arc::new(job.seeds.iter().filter_map(extract_domain).collect());

    tracing::info!(
        "Job {}: crawling {} seed(s), max depth {}, max pages {}",
        job.job_id,
        job.seeds.len(),
        job.max_depth,
        job.max_pages
    );

    let mut workers = JoinSet::new();
    for worker_id in 0..ctx.fetch_workers {
        let ctx = Arc::clone(&ctx);
        let frontier = Arc::clone(&frontier);
        let seed_hosts = Arc::clone(&seed_hosts);
        let cancel = cancel.clone();
        workers.spawn(async move {
            fetch_worker(worker_id, &ctx, &frontier, &seed_hosts, &cancel).await
        });
    }

    let mut outcome = CrawlOutcome::default();
    while let Some(joined) = workers.join_next().await {
        match joined {
            Ok(output) => {
                outcome.listings.extend(output.listings);
                outcome.stats.absorb(&output.stats);
                outcome.failed_urls.extend(output.failed_urls);
            }
            Err(e) => tracing::error!("Job {}: fetch worker panicked: {}", job.job_id, e),
        }
    }

    if cancel.is_cancelled() {
        frontier.close();
        outcome.cancelled = true;
        tracing::info!("Job {}: crawl cancelled", job.job_id);
    } else {
        tracing::info!(
            "Job {}: crawled {} of {} pages, {} raw listings",
            job.job_id,
            outcome.stats.succeeded,
            outcome.stats.attempted,
            outcome.stats.listings
        );
    }

    outcome
}

async fn fetch_worker(
    worker_id: usize,
    ctx: &CrawlContext,
    frontier: &Frontier,
    seed_hosts: &BTreeSet<String>,
    cancel: &CancellationToken,
) -> WorkerOutput {
    let mut output = WorkerOutput::default();

    loop {
        let entry = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            entry = frontier.acquire() => match entry {
                Some(entry) => entry,
                None => break,
            },
        };

        tracing::debug!("Worker {} fetching {} (depth {})", worker_id, entry.url, entry.depth);
        output.stats.attempted += 1;

        let keep_going = process_entry(ctx, frontier, seed_hosts, cancel, &entry, &mut output).await;
        frontier.complete(&entry.url);
        if !keep_going {
            break;
        }
    }

    output
}

/// Handles one frontier entry; returns false once cancellation is observed
async fn process_entry(
    ctx: &CrawlContext,
    frontier: &Frontier,
    seed_hosts: &BTreeSet<String>,
    cancel: &CancellationToken,
    entry: &FrontierEntry,
    output: &mut WorkerOutput,
) -> bool {
    let page = match fetch_following_redirects(ctx, frontier, seed_hosts, cancel, &entry.url).await {
        Fetched::Page(page) => page,
        Fetched::Failed(e) => {
            tracing::warn!("Failed to fetch {}: {}", entry.url, e);
            output.stats.failed += 1;
            output.failed_urls.push(entry.url.clone());
            return true;
        }
        Fetched::Skipped(admission) => {
            tracing::debug!("Dropped {} after redirect: {:?}", entry.url, admission);
            output.stats.skipped += 1;
            return true;
        }
        Fetched::OffSite(target) => {
            tracing::debug!("Dropped {}, redirects off site to {}", entry.url, target);
            output.stats.skipped += 1;
            return true;
        }
        Fetched::Cancelled => return false,
    };
    let fetched_at = Utc::now();
    output.stats.succeeded += 1;

    let parsed = parse_html(&page.body, &page.final_url);

    if entry.depth < frontier.max_depth() {
        for link in &parsed.links {
            if ctx.same_host_only && !same_site(link, seed_hosts) {
                tracing::trace!("Skipping external link {}", link);
                continue;
            }
            let admission = frontier.offer(link.as_str(), entry.depth + 1);
            tracing::trace!("Offered {}: {:?}", link, admission);
        }
    }

    let chunks = chunk_page_text(&parsed.text, ctx.chunk_limits);
    if chunks.is_empty() {
        tracing::debug!("No text on {}, skipping extraction", page.final_url);
        return true;
    }

    let mut failures = Vec::new();
    for chunk in &chunks {
        let request = ExtractionRequest::new(chunk, page.final_url.clone(), ctx.chunk_limits.max_chars);
        let extracted =
            extract_with_retry(ctx.extractor.as_ref(), &request, &ctx.extraction_retry, cancel).await;
        if cancel.is_cancelled() {
            return false;
        }

        match extracted {
            Ok(records) => {
                tracing::debug!("Extracted {} listing(s) from {}", records.len(), page.final_url);
                for fields in records {
                    output.listings.push(RawListing {
                        source_url: page.final_url.clone(),
                        fields,
                        fetched_at,
                    });
                    output.stats.listings += 1;
                }
            }
            Err(e) => {
                tracing::warn!("Extraction failed for a chunk of {}: {}", page.final_url, e);
                failures.push(e);
            }
        }
    }

    // A page counts as failed only when no chunk could be extracted
    if failures.len() == chunks.len() {
        output.stats.extraction_failed += 1;
        if failures.iter().all(|e| matches!(e, ExtractionError::Unavailable(_))) {
            output.stats.extraction_unavailable += 1;
        }
    }

    true
}

enum Fetched {
    Page(FetchedPage),
    Failed(FetchError),
    Skipped(Admission),
    OffSite(Url),
    Cancelled,
}

/// Fetches `url`, routing every redirect hop through the frontier
async fn fetch_following_redirects(
    ctx: &CrawlContext,
    frontier: &Frontier,
    seed_hosts: &BTreeSet<String>,
    cancel: &CancellationToken,
    url: &Url,
) -> Fetched {
    let mut current = url.clone();

    for _ in 0..=MAX_REDIRECTS {
        if !ctx.pacer.wait_turn(&current, cancel).await {
            return Fetched::Cancelled;
        }

        let fetched = fetch_with_retry(&ctx.client, &current, &ctx.fetch_retry, cancel).await;
        if cancel.is_cancelled() {
            return Fetched::Cancelled;
        }

        let target = match fetched {
            Ok(FetchResponse::Page(page)) => return Fetched::Page(page),
            Ok(FetchResponse::Redirect(target)) => target,
            Err(e) => return Fetched::Failed(e),
        };

        if ctx.same_host_only && !same_site(&target, seed_hosts) {
            return Fetched::OffSite(target);
        }

        match frontier.claim_redirect(&target) {
            Admission::Admitted => {
                tracing::debug!("Following redirect {} -> {}", current, target);
                current = target;
            }
            admission => return Fetched::Skipped(admission),
        }
    }

    Fetched::Failed(FetchError::TooManyRedirects(MAX_REDIRECTS))
}

use crate::output::SortKey;
use serde::Deserialize;

/// Main configuration structure for Listing-Relay
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub crawler: CrawlerConfig,
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    #[serde(default)]
    pub retry: RetryConfigs,
    pub extraction: ExtractionConfig,
    pub output: OutputConfig,
    #[serde(default, rename = "target")]
    pub targets: Vec<TargetEntry>,
}

/// Worker pool and queue settings
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct PipelineConfig {
    /// Workers consuming the crawl queue
    pub crawl_workers: usize,

    /// Workers consuming the clean queue
    pub clean_workers: usize,

    /// Workers consuming the format queue
    pub format_workers: usize,

    /// Concurrent page fetches inside a single crawl task
    pub fetch_workers: usize,

    /// Deliveries of one stage task before the job is failed
    pub queue_max_attempts: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            crawl_workers: 2,
            clean_workers: 1,
            format_workers: 1,
            fetch_workers: 4,
            queue_max_attempts: 3,
        }
    }
}

/// Crawler behavior configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct CrawlerConfig {
    /// Default maximum link depth from the seeds
    pub max_depth: u32,

    /// Default maximum number of pages fetched per job
    pub max_pages: u32,

    /// Per-request fetch timeout (milliseconds)
    pub fetch_timeout_ms: u64,

    /// Largest piece of page text sent in one extraction request; longer
    /// pages are split into chunks
    pub max_page_chars: usize,

    /// Characters repeated at the start of each chunk from the end of the previous one
    pub chunk_overlap_chars: usize,

    /// Chunks extracted per page; text beyond the last chunk is skipped
    pub max_chunks: usize,

    /// Only follow links whose host matches one of the job's seed hosts
    pub same_host_only: bool,

    /// Minimum time between two requests to the same host (milliseconds)
    #[serde(rename = "minimum-time-on-page")]
    pub minimum_time_on_page: u64,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            max_depth: 2,
            max_pages: 5,
            fetch_timeout_ms: 15_000,
            max_page_chars: 16_000,
            chunk_overlap_chars: 800,
            max_chunks: 3,
            same_host_only: true,
            minimum_time_on_page: 1_000,
        }
    }
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UserAgentConfig {
    /// Name of the crawler
    #[serde(rename = "crawler-name")]
    pub crawler_name: String,

    /// Version of the crawler
    #[serde(rename = "crawler-version")]
    pub crawler_version: String,

    /// URL with information about the crawler
    #[serde(rename = "contact-url")]
    pub contact_url: String,

    /// Email address for crawler-related contact
    #[serde(rename = "contact-email")]
    pub contact_email: String,
}

/// One backoff schedule
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RetryConfig {
    /// Retries after the first attempt
    pub max_retries: u32,

    /// Delay before the first retry (milliseconds)
    pub base_delay_ms: u64,

    /// Growth factor between consecutive retries
    pub multiplier: f64,

    /// Random spread applied to each delay, as a fraction (0.0 - 1.0)
    #[serde(default)]
    pub jitter: f64,

    /// Upper bound on a single delay (milliseconds)
    pub max_delay_ms: u64,
}

/// Backoff schedules for the fetch and extraction call sites
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RetryConfigs {
    #[serde(default = "RetryConfigs::default_fetch")]
    pub fetch: RetryConfig,

    #[serde(default = "RetryConfigs::default_extraction")]
    pub extraction: RetryConfig,

    /// Used when the extraction service reports a rate limit
    #[serde(default = "RetryConfigs::default_rate_limit")]
    pub rate_limit: RetryConfig,
}

impl RetryConfigs {
    fn default_fetch() -> RetryConfig {
        RetryConfig {
            max_retries: 3,
            base_delay_ms: 500,
            multiplier: 2.0,
            jitter: 0.2,
            max_delay_ms: 10_000,
        }
    }

    fn default_extraction() -> RetryConfig {
        RetryConfig {
            max_retries: 2,
            base_delay_ms: 1_000,
            multiplier: 2.0,
            jitter: 0.2,
            max_delay_ms: 30_000,
        }
    }

    fn default_rate_limit() -> RetryConfig {
        RetryConfig {
            max_retries: 2,
            base_delay_ms: 5_000,
            multiplier: 3.0,
            jitter: 0.2,
            max_delay_ms: 60_000,
        }
    }
}

impl Default for RetryConfigs {
    fn default() -> Self {
        Self {
            fetch: Self::default_fetch(),
            extraction: Self::default_extraction(),
            rate_limit: Self::default_rate_limit(),
        }
    }
}

/// Extraction service endpoint
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ExtractionConfig {
    /// HTTP endpoint accepting extraction requests
    pub endpoint: String,

    /// Name of the environment variable holding the bearer token, if any
    #[serde(default)]
    pub api_key_env: Option<String>,

    /// Per-call timeout (milliseconds)
    #[serde(default = "ExtractionConfig::default_timeout_ms")]
    pub timeout_ms: u64,
}

impl ExtractionConfig {
    fn default_timeout_ms() -> u64 {
        60_000
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct OutputConfig {
    /// Directory receiving the per-job artifacts
    pub directory: String,

    /// Optional SQLite job history
    #[serde(default)]
    pub database_path: Option<String>,

    /// Report ordering
    #[serde(default)]
    pub sort: SortKey,
}

/// A site to crawl when no seeds are given on the command line
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TargetEntry {
    /// Label used in logs
    pub name: String,

    /// Seed URLs for this target's job
    pub seeds: Vec<String>,

    /// Overrides `crawler.max-depth`
    #[serde(default)]
    pub max_depth: Option<u32>,

    /// Overrides `crawler.max-pages`
    #[serde(default)]
    pub max_pages: Option<u32>,
}

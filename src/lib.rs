//! Listing-Relay: a queue-driven real-estate listing pipeline
//!
//! This crate crawls listing sites within explicit depth and page bounds, hands
//! page text to an extraction service, cleans the extracted records into a
//! canonical schema, and renders a Markdown report. The three stages are
//! connected through per-stage task queues driven by the [`pipeline::Orchestrator`].

pub mod clean;
pub mod config;
pub mod crawler;
pub mod listing;
pub mod output;
pub mod pipeline;
pub mod queue;
pub mod retry;
pub mod state;
pub mod storage;
pub mod url;

use thiserror::Error;

/// Main error type for pipeline operations
///
/// Page- and record-level failures never surface here; they are absorbed by
/// the stage that owns them and reported through counts instead.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Invalid job: {0}")]
    InvalidJob(String),

    #[error("Unknown job: {0}")]
    UnknownJob(pipeline::JobId),

    #[error("Invalid state transition for job {job_id}: {from} -> {to}")]
    InvalidTransition {
        job_id: pipeline::JobId,
        from: state::JobState,
        to: state::JobState,
    },

    #[error("{stage} stage never delivered a batch for job {job_id}")]
    StageAborted {
        job_id: pipeline::JobId,
        stage: queue::Stage,
    },

    #[error("Queue error: {0}")]
    Queue(#[from] queue::QueueError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("URL error: {0}")]
    UrlError(#[from] UrlError),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Failed to write artifact {path}: {source}")]
    Artifact {
        path: String,
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing domain in URL")]
    MissingDomain,

    #[error("Malformed URL: {0}")]
    Malformed(String),
}

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{ExtractionError, ExtractionService, FetchError};
pub use pipeline::{JobHandle, JobId, JobReport, JobRequest, Orchestrator};
pub use state::JobState;
pub use url::{extract_domain, normalize_url};

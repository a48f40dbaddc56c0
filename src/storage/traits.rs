//! Storage traits and error types
//!
//! This module defines the trait interface for the job history backend and
//! associated error types.

use crate::pipeline::{CrawlJob, JobId, JobReport};
use crate::state::JobState;
use crate::storage::{JobRecord, TransitionRecord};
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("Corrupt row for job {job_id}: {detail}")]
    CorruptRow { job_id: String, detail: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for job history backends
///
/// The orchestrator records every accepted job, every state transition and
/// the final counts. Nothing is read back while a job runs.
pub trait Storage {
    // ===== Job Management =====

    /// Records a newly accepted job in the `Submitted` state
    ///
    /// # Arguments
    ///
    /// * `job` - The validated job
    /// * `config_hash` - Hash of the configuration file the job ran under
    fn create_job(&mut self, job: &CrawlJob, config_hash: &str) -> StorageResult<()>;

    /// Records one state transition and updates the job's current state
    fn record_transition(&mut self, job_id: JobId, from: JobState, to: JobState)
        -> StorageResult<()>;

    /// Stores the terminal outcome and counts of a job
    fn finish_job(&mut self, report: &JobReport) -> StorageResult<()>;

    /// Gets a job by ID
    fn get_job(&self, job_id: JobId) -> StorageResult<JobRecord>;

    /// Gets all jobs, most recently submitted first
    fn list_jobs(&self) -> StorageResult<Vec<JobRecord>>;

    /// Gets a job's transitions in the order they happened
    fn get_transitions(&self, job_id: JobId) -> StorageResult<Vec<TransitionRecord>>;

    // ===== Statistics =====

    /// Counts jobs currently in `state`
    fn count_jobs_by_state(&self, state: JobState) -> StorageResult<u64>;
}

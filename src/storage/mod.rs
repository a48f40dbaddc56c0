//! Storage module for persisting job history
//!
//! The job store is optional. When `output.database-path` is set, the
//! orchestrator records:
//! - every accepted job with its seeds, bounds and config hash
//! - every state transition
//! - the terminal state, failure reason and final counts

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteStorage;
pub use traits::{Storage, StorageError, StorageResult};

use crate::state::{FailureReason, JobState};

use std::path::Path;

/// Initializes or opens a storage database
pub fn open_storage(path: &Path) -> StorageResult<SqliteStorage> {
    SqliteStorage::new(path)
}

/// Represents a job in the database
#[derive(Debug, Clone)]
pub struct JobRecord {
    pub id: String,
    pub config_hash: String,
    pub seeds: Vec<String>,
    pub max_depth: u32,
    pub max_pages: u32,
    pub state: JobState,
    pub failure: Option<FailureReason>,
    pub submitted_at: String,
    pub finished_at: Option<String>,
    pub pages_attempted: u32,
    pub pages_succeeded: u32,
    pub raw_listings: u32,
    pub validated_listings: u32,
    pub report_path: Option<String>,
}

/// Represents one recorded state transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionRecord {
    pub job_id: String,
    pub from: JobState,
    pub to: JobState,
    pub recorded_at: String,
}

//! Per-stage task queues
//!
//! Stages never call each other. The orchestrator produces a [`StageTask`]
//! onto the next stage's queue when a stage reports its batch complete.
//! Payloads move by value into the task and out of the delivery.

mod memory;
mod traits;

pub use memory::InMemoryQueue;
pub use traits::{Redelivery, TaskQueue};

use crate::listing::{RawListing, ValidatedListing};
use crate::pipeline::{CrawlJob, JobId};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// The three processing stages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Crawl,
    Clean,
    Format,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Crawl => "crawl",
            Self::Clean => "clean",
            Self::Format => "format",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Input of a stage task
#[derive(Debug, Clone)]
pub enum StagePayload {
    Crawl(CrawlJob),
    Clean(Vec<RawListing>),
    Format(Vec<ValidatedListing>),
}

impl StagePayload {
    /// The stage this payload is meant for
    pub fn stage(&self) -> Stage {
        match self {
            Self::Crawl(_) => Stage::Crawl,
            Self::Clean(_) => Stage::Clean,
            Self::Format(_) => Stage::Format,
        }
    }
}

/// One unit of work for one stage of one job
#[derive(Debug, Clone)]
pub struct StageTask {
    pub task_id: Uuid,
    pub job_id: JobId,
    pub stage: Stage,
    pub payload: StagePayload,

    /// Deliveries so far; set by the queue on consume
    pub attempt: u32,
}

impl StageTask {
    fn new(job_id: JobId, payload: StagePayload) -> Self {
        Self {
            task_id: Uuid::new_v4(),
            job_id,
            stage: payload.stage(),
            payload,
            attempt: 0,
        }
    }

    pub fn crawl(job: CrawlJob) -> Self {
        Self::new(job.job_id, StagePayload::Crawl(job))
    }

    pub fn clean(job_id: JobId, listings: Vec<RawListing>) -> Self {
        Self::new(job_id, StagePayload::Clean(listings))
    }

    pub fn format(job_id: JobId, listings: Vec<ValidatedListing>) -> Self {
        Self::new(job_id, StagePayload::Format(listings))
    }
}

/// Queue errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum QueueError {
    #[error("{0} queue is closed")]
    Closed(Stage),

    #[error("task for the {found} stage sent to the {expected} queue")]
    StageMismatch { expected: Stage, found: Stage },
}

//! State module for tracking job progress
//!
//! - `JobState`: the per-job state machine (submitted, crawling, cleaning, formatting, terminal)
//! - `FailureReason`: why a job ended in `Failed`

mod job_state;

pub use job_state::{FailureReason, JobState};

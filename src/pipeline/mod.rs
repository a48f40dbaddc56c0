//! Job submission, sequencing and status
//!
//! - `JobRequest` / `CrawlJob`: what a caller asks for and what the pipeline accepts
//! - `Orchestrator`: per-stage queues and worker pools, the job state machine
//! - `JobHandle` / `JobReport`: terminal status with partial-success counts

mod job;
mod orchestrator;
mod report;

pub use job::{CrawlJob, JobId, JobRequest};
pub use orchestrator::{JobHandle, Orchestrator, StageQueues};
pub use report::JobReport;

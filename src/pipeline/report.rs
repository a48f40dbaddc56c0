//! Terminal status handed back to the caller

use crate::clean::CleanStats;
use crate::crawler::CrawlStats;
use crate::output::{ArtifactPaths, ReportCounts};
use crate::pipeline::JobId;
use crate::state::{FailureReason, JobState};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Status and counts of one job
///
/// Snapshots are published on every transition; [`crate::JobHandle::wait`]
/// returns the one carrying a terminal state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobReport {
    pub job_id: JobId,
    pub state: JobState,

    /// Set only when `state` is `Failed`
    pub failure: Option<FailureReason>,

    /// Every state the job has been in, starting with `Submitted`
    pub history: Vec<JobState>,

    pub crawl: Option<CrawlStats>,
    pub clean: Option<CleanStats>,
    pub report: Option<ReportCounts>,
    pub artifacts: ArtifactPaths,

    /// Last stage error that caused a redelivery or an abort
    pub last_error: Option<String>,

    pub submitted_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl JobReport {
    pub fn new(job_id: JobId, submitted_at: DateTime<Utc>) -> Self {
        Self {
            job_id,
            state: JobState::Submitted,
            failure: None,
            history: vec![JobState::Submitted],
            crawl: None,
            clean: None,
            report: None,
            artifacts: ArtifactPaths::default(),
            last_error: None,
            submitted_at,
            finished_at: None,
        }
    }

    pub fn is_done(&self) -> bool {
        self.state == JobState::Done
    }

    /// True if the job ever entered `state`
    pub fn visited(&self, state: JobState) -> bool {
        self.history.contains(&state)
    }

    /// One-line partial-success summary
    ///
    /// e.g. `done: 5 of 8 pages crawled successfully, 12 raw listings, 9 retained`
    pub fn summary(&self) -> String {
        let mut parts = Vec::new();

        if let Some(crawl) = &self.crawl {
            parts.push(format!(
                "{} of {} pages crawled successfully",
                crawl.succeeded, crawl.attempted
            ));
            parts.push(format!("{} raw listings", crawl.listings));
        }
        if let Some(clean) = &self.clean {
            parts.push(format!("{} retained", clean.retained));
        }

        let mut line = self.state.to_string();
        if let Some(failure) = &self.failure {
            line.push_str(&format!(" ({})", failure));
        }
        if !parts.is_empty() {
            line.push_str(": ");
            line.push_str(&parts.join(", "));
        }
        line
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_reports_partial_success() {
        let mut report = JobReport::new(JobId::new(), Utc::now());
        report.state = JobState::Done;
        report.crawl = Some(CrawlStats {
            attempted: 8,
            succeeded: 5,
            failed: 3,
            listings: 12,
            ..Default::default()
        });
        report.clean = Some(CleanStats {
            received: 12,
            retained: 9,
            dropped: 2,
            merged: 1,
        });

        assert_eq!(
            report.summary(),
            "done: 5 of 8 pages crawled successfully, 12 raw listings, 9 retained"
        );
    }

    #[test]
    fn test_summary_names_failure() {
        let mut report = JobReport::new(JobId::new(), Utc::now());
        report.state = JobState::Failed;
        report.failure = Some(FailureReason::NoPagesFetched);
        report.crawl = Some(CrawlStats {
            attempted: 2,
            failed: 2,
            ..Default::default()
        });

        assert_eq!(
            report.summary(),
            "failed (no pages were fetched): 0 of 2 pages crawled successfully, 0 raw listings"
        );
    }

    #[test]
    fn test_new_report_starts_submitted() {
        let report = JobReport::new(JobId::new(), Utc::now());
        assert_eq!(report.history, vec![JobState::Submitted]);
        assert!(report.visited(JobState::Submitted));
        assert!(!report.visited(JobState::Crawling));
    }
}

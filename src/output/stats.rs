//! Console summaries of job outcomes
//!
//! This module prints terminal job reports after a run and the recorded job
//! history from the job store.

use crate::pipeline::JobReport;
use crate::storage::{JobRecord, Storage, StorageResult};
use crate::state::JobState;

/// Formats one job report as console lines
pub fn format_job_report(report: &JobReport) -> Vec<String> {
    let mut lines = vec![format!("Job {}: {}", report.job_id, report.summary())];

    if let Some(crawl) = &report.crawl {
        lines.push(format!(
            "  Pages: {} attempted, {} fetched, {} failed",
            crawl.attempted, crawl.succeeded, crawl.failed
        ));
        if crawl.skipped > 0 {
            lines.push(format!(
                "  Redirects to already seen or external pages: {}",
                crawl.skipped
            ));
        }
        if crawl.extraction_failed > 0 {
            lines.push(format!(
                "  Extraction failed on {} page(s) ({} unavailable)",
                crawl.extraction_failed, crawl.extraction_unavailable
            ));
        }
    }

    if let Some(clean) = &report.clean {
        lines.push(format!(
            "  Listings: {} received, {} retained, {} dropped, {} merged",
            clean.received, clean.retained, clean.dropped, clean.merged
        ));
    }

    if let Some(counts) = &report.report {
        lines.push(format!(
            "  Report: {} complete, {} partial, {} without price",
            counts.complete, counts.partial, counts.without_price
        ));
    }

    for path in [
        &report.artifacts.raw_listings,
        &report.artifacts.validated_listings,
        &report.artifacts.report,
    ]
    .into_iter()
    .flatten()
    {
        lines.push(format!("  Wrote {}", path.display()));
    }

    if let Some(error) = &report.last_error {
        lines.push(format!("  Last error: {}", error));
    }

    lines
}

/// Prints a terminal job report to stdout
pub fn print_job_report(report: &JobReport) {
    for line in format_job_report(report) {
        println!("{}", line);
    }
}

/// Prints every recorded job, newest first, with per-state totals
pub fn print_job_history(storage: &dyn Storage) -> StorageResult<()> {
    let jobs = storage.list_jobs()?;

    println!("=== Job History ===\n");

    if jobs.is_empty() {
        println!("No jobs recorded.");
        return Ok(());
    }

    for job in &jobs {
        println!("{}", format_job_record(job));
    }
    println!();

    println!("Jobs by State:");
    for state in JobState::all_states() {
        let count = storage.count_jobs_by_state(state)?;
        if count > 0 {
            println!("  {}: {}", state, count);
        }
    }

    Ok(())
}

fn format_job_record(job: &JobRecord) -> String {
    let mut line = format!(
        "{}  {:<10}  {} of {} pages, {} raw, {} validated  [{}]",
        job.submitted_at,
        job.state.to_string(),
        job.pages_succeeded,
        job.pages_attempted,
        job.raw_listings,
        job.validated_listings,
        job.seeds.join(", ")
    );

    if let Some(failure) = &job.failure {
        line.push_str(&format!("  ({})", failure));
    }

    line
}

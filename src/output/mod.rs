//! Output module for the format stage and job artifacts
//!
//! This module handles:
//! - Ordering validated listings into a report
//! - Rendering the report as Markdown
//! - Writing per-job artifacts atomically
//! - Printing job summaries and history on the console

mod artifacts;
mod markdown;
mod report;
pub mod stats;

pub use artifacts::{write_atomic, ArtifactKind, ArtifactPaths, ArtifactWriter};
pub use markdown::{render_markdown, PLACEHOLDER};
pub use report::{build_report, Report, ReportCounts, SortKey};
pub use stats::{print_job_history, print_job_report};

/// Job state definitions for tracking pipeline progress
///
/// A job moves forward through the stages and ends in exactly one terminal
/// state. Terminal states are sinks.
use crate::queue::Stage;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Represents the current state of a job in the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    // ===== Active States =====
    /// Accepted, crawl task queued
    Submitted,

    /// Crawl task running
    Crawling,

    /// Raw batch handed to the clean stage
    Cleaning,

    /// Validated batch handed to the format stage
    Formatting,

    // ===== Terminal States =====
    /// Report produced
    Done,

    /// Stopped by a job-level failure, see [`FailureReason`]
    Failed,

    /// Stopped by the caller
    Cancelled,
}

impl JobState {
    /// Returns true if this is a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed | Self::Cancelled)
    }

    /// Returns true if `next` is a legal successor of this state
    ///
    /// Stages advance one step at a time. Any non-terminal state may fail or
    /// be cancelled.
    pub fn can_transition_to(&self, next: JobState) -> bool {
        use JobState::*;

        match (self, next) {
            (Submitted, Crawling)
            | (Crawling, Cleaning)
            | (Cleaning, Formatting)
            | (Formatting, Done) => true,
            (from, Failed | Cancelled) => !from.is_terminal(),
            _ => false,
        }
    }

    /// The state a job is in while `stage` owns its batch
    pub fn for_stage(stage: Stage) -> Self {
        match stage {
            Stage::Crawl => Self::Crawling,
            Stage::Clean => Self::Cleaning,
            Stage::Format => Self::Formatting,
        }
    }

    /// Converts the job state to its database representation
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Submitted => "submitted",
            Self::Crawling => "crawling",
            Self::Cleaning => "cleaning",
            Self::Formatting => "formatting",
            Self::Done => "done",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Parses a job state from its database representation
    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "submitted" => Some(Self::Submitted),
            "crawling" => Some(Self::Crawling),
            "cleaning" => Some(Self::Cleaning),
            "formatting" => Some(Self::Formatting),
            "done" => Some(Self::Done),
            "failed" => Some(Self::Failed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    /// Returns all possible job states
    pub fn all_states() -> Vec<Self> {
        vec![
            Self::Submitted,
            Self::Crawling,
            Self::Cleaning,
            Self::Formatting,
            Self::Done,
            Self::Failed,
            Self::Cancelled,
        ]
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.to_db_string())
    }
}

/// Why a job ended in [`JobState::Failed`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum FailureReason {
    /// No page was fetched successfully
    NoPagesFetched,

    /// The extraction service was unavailable for every fetched page
    ExtractionUnavailable,

    /// A stage task used up its queue deliveries
    StageAborted { stage: Stage },
}

impl FailureReason {
    pub fn to_db_string(&self) -> String {
        match self {
            Self::NoPagesFetched => "no_pages_fetched".to_string(),
            Self::ExtractionUnavailable => "extraction_unavailable".to_string(),
            Self::StageAborted { stage } => format!("stage_aborted:{}", stage),
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "no_pages_fetched" => Some(Self::NoPagesFetched),
            "extraction_unavailable" => Some(Self::ExtractionUnavailable),
            "stage_aborted:crawl" => Some(Self::StageAborted { stage: Stage::Crawl }),
            "stage_aborted:clean" => Some(Self::StageAborted { stage: Stage::Clean }),
            "stage_aborted:format" => Some(Self::StageAborted { stage: Stage::Format }),
            _ => None,
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoPagesFetched => write!(f, "no pages were fetched"),
            Self::ExtractionUnavailable => {
                write!(f, "extraction service unavailable for every fetched page")
            }
            Self::StageAborted { stage } => write!(f, "{} stage aborted", stage),
        }
    }
}

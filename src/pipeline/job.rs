//! Job identity and submission

use crate::url::normalize_url;
use crate::PipelineError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use url::Url;
use uuid::Uuid;

/// Identifier of one pipeline job
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// What a caller submits
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRequest {
    pub seeds: Vec<String>,

    #[serde(default = "JobRequest::default_max_depth")]
    pub max_depth: u32,

    #[serde(default = "JobRequest::default_max_pages")]
    pub max_pages: u32,
}

impl JobRequest {
    fn default_max_depth() -> u32 {
        2
    }

    fn default_max_pages() -> u32 {
        5
    }

    /// A request for `seeds` with the default bounds
    pub fn new<I, S>(seeds: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            seeds: seeds.into_iter().map(Into::into).collect(),
            max_depth: Self::default_max_depth(),
            max_pages: Self::default_max_pages(),
        }
    }

    pub fn with_bounds(mut self, max_depth: u32, max_pages: u32) -> Self {
        self.max_depth = max_depth;
        self.max_pages = max_pages;
        self
    }
}

/// An accepted job; immutable once built
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlJob {
    pub job_id: JobId,

    /// Normalized seed URLs
    pub seeds: BTreeSet<Url>,

    pub max_depth: u32,
    pub max_pages: u32,
}

impl CrawlJob {
    /// Validates a request and assigns a fresh job id
    ///
    /// Rejects empty seed lists, seeds that are not http(s) URLs, and a
    /// zero page budget.
    pub fn from_request(request: JobRequest) -> Result<Self, PipelineError> {
        if request.seeds.is_empty() {
            return Err(PipelineError::InvalidJob("no seed URLs".to_string()));
        }
        if request.max_pages == 0 {
            return Err(PipelineError::InvalidJob(
                "max_pages must be at least 1".to_string(),
            ));
        }

        let mut seeds = BTreeSet::new();
        for seed in &request.seeds {
            let url = normalize_url(seed.trim()).map_err(|e| {
                PipelineError::InvalidJob(format!("invalid seed '{}': {}", seed, e))
            })?;
            seeds.insert(url);
        }

        Ok(Self {
            job_id: JobId::new(),
            seeds,
            max_depth: request.max_depth,
            max_pages: request.max_pages,
        })
    }
}

//! Per-job artifact files
//!
//! Each job leaves up to three files in the output directory:
//! - `raw_listings_<job>_<timestamp>.json`
//! - `validated_listings_<job>_<timestamp>.json`
//! - `report_<job>_<timestamp>.md`
//!
//! Files are written to a temporary file in the same directory and renamed
//! into place, so a reader never sees a partial artifact.

use crate::pipeline::JobId;
use crate::PipelineError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// The kinds of artifact a job produces
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    RawListings,
    ValidatedListings,
    Report,
}

impl ArtifactKind {
    fn prefix(&self) -> &'static str {
        match self {
            Self::RawListings => "raw_listings",
            Self::ValidatedListings => "validated_listings",
            Self::Report => "report",
        }
    }

    fn extension(&self) -> &'static str {
        match self {
            Self::RawListings | Self::ValidatedListings => "json",
            Self::Report => "md",
        }
    }

    /// File name for this artifact of `job_id`
    pub fn file_name(&self, job_id: JobId, timestamp: DateTime<Utc>) -> String {
        format!(
            "{}_{}_{}.{}",
            self.prefix(),
            job_id,
            timestamp.format("%Y%m%dT%H%M%SZ"),
            self.extension()
        )
    }
}

/// Paths of the artifacts written for one job
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactPaths {
    pub raw_listings: Option<PathBuf>,
    pub validated_listings: Option<PathBuf>,
    pub report: Option<PathBuf>,
}

impl ArtifactPaths {
    pub fn set(&mut self, kind: ArtifactKind, path: PathBuf) {
        match kind {
            ArtifactKind::RawListings => self.raw_listings = Some(path),
            ArtifactKind::ValidatedListings => self.validated_listings = Some(path),
            ArtifactKind::Report => self.report = Some(path),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.raw_listings.is_none() && self.validated_listings.is_none() && self.report.is_none()
    }
}

/// Writes artifacts into one output directory
#[derive(Debug, Clone)]
pub struct ArtifactWriter {
    directory: PathBuf,
}

impl ArtifactWriter {
    /// Creates the writer, creating `directory` if needed
    pub fn new(directory: impl Into<PathBuf>) -> Result<Self, PipelineError> {
        let directory = directory.into();
        std::fs::create_dir_all(&directory).map_err(|source| PipelineError::Artifact {
            path: directory.display().to_string(),
            source,
        })?;
        Ok(Self { directory })
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Serializes `value` as pretty JSON
    pub fn write_json<T: Serialize>(
        &self,
        kind: ArtifactKind,
        job_id: JobId,
        timestamp: DateTime<Utc>,
        value: &T,
    ) -> Result<PathBuf, PipelineError> {
        let json = serde_json::to_vec_pretty(value)?;
        self.write(kind, job_id, timestamp, &json)
    }

    /// Writes text as-is
    pub fn write_text(
        &self,
        kind: ArtifactKind,
        job_id: JobId,
        timestamp: DateTime<Utc>,
        text: &str,
    ) -> Result<PathBuf, PipelineError> {
        self.write(kind, job_id, timestamp, text.as_bytes())
    }

    fn write(
        &self,
        kind: ArtifactKind,
        job_id: JobId,
        timestamp: DateTime<Utc>,
        contents: &[u8],
    ) -> Result<PathBuf, PipelineError> {
        let path = self.directory.join(kind.file_name(job_id, timestamp));
        write_atomic(&path, contents).map_err(|source| PipelineError::Artifact {
            path: path.display().to_string(),
            source,
        })?;

        tracing::debug!("Wrote {}", path.display());
        Ok(path)
    }
}

/// Writes `contents` to `path` via a temporary file in the same directory
pub fn write_atomic(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let directory = path.parent().unwrap_or_else(|| Path::new("."));

    let mut file = NamedTempFile::new_in(directory)?;
    file.write_all(contents)?;
    file.as_file().sync_all()?;
    file.persist(path).map_err(|e| e.error)?;

    Ok(())
}

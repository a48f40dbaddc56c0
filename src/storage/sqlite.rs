//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the Storage trait.

use crate::pipeline::{CrawlJob, JobId, JobReport};
use crate::state::{FailureReason, JobState};
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{Storage, StorageError, StorageResult};
use crate::storage::{JobRecord, TransitionRecord};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;

const JOB_COLUMNS: &str = "id, config_hash, seeds, max_depth, max_pages, state, failure,
     submitted_at, finished_at, pages_attempted, pages_succeeded, raw_listings,
     validated_listings, report_path";

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Opens or creates the database at `path`
    pub fn new(path: &Path) -> StorageResult<Self> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database
    pub fn new_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }
}

/// Column values as stored, before parsing the enum and JSON columns
struct JobRow {
    id: String,
    config_hash: String,
    seeds: String,
    max_depth: u32,
    max_pages: u32,
    state: String,
    failure: Option<String>,
    submitted_at: String,
    finished_at: Option<String>,
    pages_attempted: u32,
    pages_succeeded: u32,
    raw_listings: u32,
    validated_listings: u32,
    report_path: Option<String>,
}

impl JobRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            config_hash: row.get(1)?,
            seeds: row.get(2)?,
            max_depth: row.get(3)?,
            max_pages: row.get(4)?,
            state: row.get(5)?,
            failure: row.get(6)?,
            submitted_at: row.get(7)?,
            finished_at: row.get(8)?,
            pages_attempted: row.get(9)?,
            pages_succeeded: row.get(10)?,
            raw_listings: row.get(11)?,
            validated_listings: row.get(12)?,
            report_path: row.get(13)?,
        })
    }

    fn into_record(self) -> StorageResult<JobRecord> {
        let state = JobState::from_db_string(&self.state).ok_or_else(|| StorageError::CorruptRow {
            job_id: self.id.clone(),
            detail: format!("unknown state '{}'", self.state),
        })?;

        let failure = match &self.failure {
            Some(text) => Some(FailureReason::from_db_string(text).ok_or_else(|| {
                StorageError::CorruptRow {
                    job_id: self.id.clone(),
                    detail: format!("unknown failure '{}'", text),
                }
            })?),
            None => None,
        };

        Ok(JobRecord {
            seeds: serde_json::from_str(&self.seeds)?,
            id: self.id,
            config_hash: self.config_hash,
            max_depth: self.max_depth,
            max_pages: self.max_pages,
            state,
            failure,
            submitted_at: self.submitted_at,
            finished_at: self.finished_at,
            pages_attempted: self.pages_attempted,
            pages_succeeded: self.pages_succeeded,
            raw_listings: self.raw_listings,
            validated_listings: self.validated_listings,
            report_path: self.report_path,
        })
    }
}

impl Storage for SqliteStorage {
    // ===== Job Management =====

    fn create_job(&mut self, job: &CrawlJob, config_hash: &str) -> StorageResult<()> {
        let seeds: Vec<&str> = job.seeds.iter().map(|url| url.as_str()).collect();
        let now = Utc::now().to_rfc3339();

        self.conn.execute(
            "INSERT INTO jobs (id, config_hash, seeds, max_depth, max_pages, state, submitted_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                job.job_id.to_string(),
                config_hash,
                serde_json::to_string(&seeds)?,
                job.max_depth,
                job.max_pages,
                JobState::Submitted.to_db_string(),
                now
            ],
        )?;
        Ok(())
    }

    fn record_transition(
        &mut self,
        job_id: JobId,
        from: JobState,
        to: JobState,
    ) -> StorageResult<()> {
        let id = job_id.to_string();
        let now = Utc::now().to_rfc3339();

        let tx = self.conn.transaction()?;
        let updated = tx.execute(
            "UPDATE jobs SET state = ?1 WHERE id = ?2",
            params![to.to_db_string(), id],
        )?;
        if updated == 0 {
            return Err(StorageError::JobNotFound(id));
        }
        tx.execute(
            "INSERT INTO job_events (job_id, from_state, to_state, recorded_at) VALUES (?1, ?2, ?3, ?4)",
            params![id, from.to_db_string(), to.to_db_string(), now],
        )?;
        tx.commit()?;

        Ok(())
    }

    fn finish_job(&mut self, report: &JobReport) -> StorageResult<()> {
        let crawl = report.crawl.clone().unwrap_or_default();
        let retained = report.clean.as_ref().map(|c| c.retained).unwrap_or(0);
        let report_path = report
            .artifacts
            .report
            .as_ref()
            .map(|p| p.display().to_string());
        let finished_at = report
            .finished_at
            .unwrap_or_else(Utc::now)
            .to_rfc3339();

        let updated = self.conn.execute(
            "UPDATE jobs SET state = ?1, failure = ?2, finished_at = ?3, pages_attempted = ?4,
             pages_succeeded = ?5, raw_listings = ?6, validated_listings = ?7, report_path = ?8
             WHERE id = ?9",
            params![
                report.state.to_db_string(),
                report.failure.map(|f| f.to_db_string()),
                finished_at,
                crawl.attempted,
                crawl.succeeded,
                crawl.listings,
                retained,
                report_path,
                report.job_id.to_string()
            ],
        )?;

        if updated == 0 {
            return Err(StorageError::JobNotFound(report.job_id.to_string()));
        }
        Ok(())
    }

    fn get_job(&self, job_id: JobId) -> StorageResult<JobRecord> {
        let id = job_id.to_string();
        let sql = format!("SELECT {} FROM jobs WHERE id = ?1", JOB_COLUMNS);

        let row = self
            .conn
            .query_row(&sql, params![id], JobRow::from_row)
            .optional()?
            .ok_or(StorageError::JobNotFound(id))?;

        row.into_record()
    }

    fn list_jobs(&self) -> StorageResult<Vec<JobRecord>> {
        let sql = format!(
            "SELECT {} FROM jobs ORDER BY submitted_at DESC, rowid DESC",
            JOB_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;

        let rows = stmt
            .query_map([], JobRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter().map(JobRow::into_record).collect()
    }

    fn get_transitions(&self, job_id: JobId) -> StorageResult<Vec<TransitionRecord>> {
        let id = job_id.to_string();
        let mut stmt = self.conn.prepare(
            "SELECT job_id, from_state, to_state, recorded_at FROM job_events
             WHERE job_id = ?1 ORDER BY id ASC",
        )?;

        let rows = stmt
            .query_map(params![id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(job_id, from, to, recorded_at)| -> StorageResult<TransitionRecord> {
                let parse = |s: &str| {
                    JobState::from_db_string(s).ok_or_else(|| StorageError::CorruptRow {
                        job_id: job_id.clone(),
                        detail: format!("unknown state '{}'", s),
                    })
                };
                Ok(TransitionRecord {
                    from: parse(&from)?,
                    to: parse(&to)?,
                    job_id: job_id.clone(),
                    recorded_at,
                })
            })
            .collect()
    }

    // ===== Statistics =====

    fn count_jobs_by_state(&self, state: JobState) -> StorageResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM jobs WHERE state = ?1",
            params![state.to_db_string()],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::CrawlStats;
    use crate::pipeline::JobRequest;

    fn crawl_job() -> CrawlJob {
        CrawlJob::from_request(JobRequest {
            seeds: vec!["https://example.com/listings".to_string()],
            max_depth: 1,
            max_pages: 4,
        })
        .unwrap()
    }

    #[test]
    fn test_create_and_get_job() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let job = crawl_job();
        storage.create_job(&job, "test_hash").unwrap();

        let record = storage.get_job(job.job_id).unwrap();
        assert_eq!(record.state, JobState::Submitted);
        assert_eq!(record.seeds, vec!["https://example.com/listings".to_string()]);
        assert_eq!(record.max_pages, 4);
        assert_eq!(record.config_hash, "test_hash");
        assert!(record.finished_at.is_none());
    }

    #[test]
    fn test_unknown_job() {
        let storage = SqliteStorage::new_in_memory().unwrap();
        assert!(matches!(
            storage.get_job(JobId::new()),
            Err(StorageError::JobNotFound(_))
        ));
    }

    #[test]
    fn test_transitions_are_recorded_in_order() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let job = crawl_job();
        storage.create_job(&job, "test_hash").unwrap();

        storage
            .record_transition(job.job_id, JobState::Submitted, JobState::Crawling)
            .unwrap();
        storage
            .record_transition(job.job_id, JobState::Crawling, JobState::Cancelled)
            .unwrap();

        let transitions = storage.get_transitions(job.job_id).unwrap();
        let pairs: Vec<_> = transitions.iter().map(|t| (t.from, t.to)).collect();
        assert_eq!(
            pairs,
            vec![
                (JobState::Submitted, JobState::Crawling),
                (JobState::Crawling, JobState::Cancelled)
            ]
        );
        assert_eq!(storage.get_job(job.job_id).unwrap().state, JobState::Cancelled);
    }

    #[test]
    fn test_transition_for_unknown_job() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let result = storage.record_transition(JobId::new(), JobState::Submitted, JobState::Crawling);
        assert!(matches!(result, Err(StorageError::JobNotFound(_))));
    }

    #[test]
    fn test_finish_job_stores_counts() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let job = crawl_job();
        storage.create_job(&job, "test_hash").unwrap();

        let mut report = JobReport::new(job.job_id, Utc::now());
        report.state = JobState::Failed;
        report.failure = Some(FailureReason::NoPagesFetched);
        report.crawl = Some(CrawlStats {
            attempted: 3,
            failed: 3,
            ..Default::default()
        });
        report.finished_at = Some(Utc::now());
        storage.finish_job(&report).unwrap();

        let record = storage.get_job(job.job_id).unwrap();
        assert_eq!(record.state, JobState::Failed);
        assert_eq!(record.failure, Some(FailureReason::NoPagesFetched));
        assert_eq!(record.pages_attempted, 3);
        assert_eq!(record.pages_succeeded, 0);
        assert!(record.finished_at.is_some());
    }

    #[test]
    fn test_list_and_count_jobs() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let first = crawl_job();
        let second = crawl_job();
        storage.create_job(&first, "h").unwrap();
        storage.create_job(&second, "h").unwrap();
        storage
            .record_transition(second.job_id, JobState::Submitted, JobState::Crawling)
            .unwrap();

        assert_eq!(storage.list_jobs().unwrap().len(), 2);
        assert_eq!(storage.count_jobs_by_state(JobState::Submitted).unwrap(), 1);
        assert_eq!(storage.count_jobs_by_state(JobState::Crawling).unwrap(), 1);
        assert_eq!(storage.count_jobs_by_state(JobState::Done).unwrap(), 0);
    }
}

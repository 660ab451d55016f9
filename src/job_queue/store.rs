//! Job queue storage and persistence.
//!
//! Provides SQLite-backed storage for jobs, including the atomic claim used by
//! the worker to take ownership of the next eligible job.

use super::models::*;
use super::schema::JOB_QUEUE_VERSIONED_SCHEMAS;
use crate::sqlite_persistence::open_versioned_db;
use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// How long a connection waits on a locked database before giving up.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Trait for job queue storage operations.
#[cfg_attr(any(test, feature = "mock"), mockall::automock)]
pub trait JobQueueStore: Send + Sync {
    /// Add a job to the queue.
    fn enqueue(&self, job: &Job) -> Result<()>;

    /// Get a job by ID.
    fn get_job(&self, id: &str) -> Result<Option<Job>>;

    /// Atomically claim the oldest eligible `expand-series` job.
    ///
    /// A job is eligible when it is queued and `run_at <= now`. The claimed job
    /// is moved to `running` with `attempts` incremented in the same write, and
    /// returned in its post-claim state. Returns None when nothing is eligible.
    fn claim_next_job(&self, now: DateTime<Utc>) -> Result<Option<Job>>;

    /// Set status and last error of a job.
    fn update_job_status(&self, id: &str, update: &JobStatusUpdate) -> Result<()>;

    /// Put a job back in the queue, eligible again from `run_at`.
    fn reschedule_job(&self, id: &str, run_at: DateTime<Utc>, last_error: &str) -> Result<()>;

    /// Requeue jobs left running since before `claimed_before`. Returns how many.
    fn requeue_stale_running(&self, claimed_before: DateTime<Utc>) -> Result<usize>;

    /// Count jobs with the given status.
    fn count_by_status(&self, status: JobStatus) -> Result<usize>;
}

/// SQLite-backed job queue store.
pub struct SqliteJobQueueStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteJobQueueStore {
    /// Open (or create) the job queue database at `db_path`.
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = open_versioned_db(db_path.as_ref(), JOB_QUEUE_VERSIONED_SCHEMAS, "job queue")?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Create an in-memory store for testing.
    #[cfg(test)]
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        JOB_QUEUE_VERSIONED_SCHEMAS
            .last()
            .context("No schemas defined")?
            .create(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn row_to_job(row: &rusqlite::Row) -> rusqlite::Result<Job> {
        let status: String = row.get("status")?;
        let payload: String = row.get("payload")?;

        Ok(Job {
            id: row.get("id")?,
            job_type: row.get("job_type")?,
            status: JobStatus::parse(&status).ok_or_else(|| {
                rusqlite::Error::InvalidColumnType(
                    2,
                    format!("unknown job status '{}'", status),
                    rusqlite::types::Type::Text,
                )
            })?,
            run_at: millis_to_datetime(row, "run_at")?,
            attempts: row.get("attempts")?,
            payload: decode_payload(payload),
            last_error: row.get("last_error")?,
            created_at: millis_to_datetime(row, "created_at")?,
            updated_at: millis_to_datetime(row, "updated_at")?,
            claimed_at: row
                .get::<_, Option<i64>>("claimed_at")?
                .map(|ms| from_millis(ms, "claimed_at"))
                .transpose()?,
        })
    }
}

/// Payload text that is not JSON is kept as a JSON string, so the job can
/// still be claimed and then failed by the processor.
fn decode_payload(raw: String) -> serde_json::Value {
    serde_json::from_str(&raw).unwrap_or(serde_json::Value::String(raw))
}

fn from_millis(ms: i64, column: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms).ok_or_else(|| {
        rusqlite::Error::InvalidColumnType(
            0,
            format!("{} out of range: {}", column, ms),
            rusqlite::types::Type::Integer,
        )
    })
}

fn millis_to_datetime(row: &rusqlite::Row, column: &str) -> rusqlite::Result<DateTime<Utc>> {
    from_millis(row.get(column)?, column)
}

impl JobQueueStore for SqliteJobQueueStore {
    fn enqueue(&self, job: &Job) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"INSERT INTO jobs (
                id, job_type, status, run_at, attempts, payload, last_error,
                created_at, updated_at, claimed_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"#,
            params![
                job.id,
                job.job_type,
                job.status.as_str(),
                job.run_at.timestamp_millis(),
                job.attempts,
                job.payload.to_string(),
                job.last_error,
                job.created_at.timestamp_millis(),
                job.updated_at.timestamp_millis(),
                job.claimed_at.map(|t| t.timestamp_millis()),
            ],
        )
        .with_context(|| format!("Failed to enqueue job {}", job.id))?;
        Ok(())
    }

    fn get_job(&self, id: &str) -> Result<Option<Job>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT * FROM jobs WHERE id = ?1",
            params![id],
            Self::row_to_job,
        )
        .optional()
        .with_context(|| format!("Failed to load job {}", id))
    }

    fn claim_next_job(&self, now: DateTime<Utc>) -> Result<Option<Job>> {
        let mut conn = self.conn.lock().unwrap();
        let now_ms = now.timestamp_millis();

        // IMMEDIATE takes the write lock up front, so a concurrent claimer on
        // another connection waits and then sees the job as running.
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let claimed = tx
            .query_row(
                r#"UPDATE jobs
                   SET status = ?1, attempts = attempts + 1, claimed_at = ?3, updated_at = ?3
                   WHERE id = (
                       SELECT id FROM jobs
                       WHERE status = ?2 AND job_type = ?4 AND run_at <= ?3
                       ORDER BY run_at ASC, created_at ASC
                       LIMIT 1
                   ) AND status = ?2
                   RETURNING *"#,
                params![
                    JobStatus::Running.as_str(),
                    JobStatus::Queued.as_str(),
                    now_ms,
                    EXPAND_SERIES_JOB_TYPE,
                ],
                Self::row_to_job,
            )
            .optional()
            .context("Failed to claim next job")?;
        tx.commit()?;

        Ok(claimed)
    }

    fn update_job_status(&self, id: &str, update: &JobStatusUpdate) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let updated = conn.execute(
            "UPDATE jobs SET status = ?2, last_error = ?3, updated_at = ?4 WHERE id = ?1",
            params![
                id,
                update.status.as_str(),
                update.last_error,
                Utc::now().timestamp_millis(),
            ],
        )?;
        if updated == 0 {
            bail!("Job not found: {}", id);
        }
        Ok(())
    }

    fn reschedule_job(&self, id: &str, run_at: DateTime<Utc>, last_error: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let updated = conn.execute(
            r#"UPDATE jobs
               SET status = ?2, run_at = ?3, last_error = ?4, claimed_at = NULL, updated_at = ?5
               WHERE id = ?1"#,
            params![
                id,
                JobStatus::Queued.as_str(),
                run_at.timestamp_millis(),
                last_error,
                Utc::now().timestamp_millis(),
            ],
        )?;
        if updated == 0 {
            bail!("Job not found: {}", id);
        }
        Ok(())
    }

    fn requeue_stale_running(&self, claimed_before: DateTime<Utc>) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let count = conn.execute(
            r#"UPDATE jobs
               SET status = ?1, claimed_at = NULL, last_error = ?3, updated_at = ?4
               WHERE status = ?2 AND (claimed_at IS NULL OR claimed_at < ?5)"#,
            params![
                JobStatus::Queued.as_str(),
                JobStatus::Running.as_str(),
                "requeued after stale claim",
                Utc::now().timestamp_millis(),
                claimed_before.timestamp_millis(),
            ],
        )?;
        Ok(count)
    }

    fn count_by_status(&self, status: JobStatus) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM jobs WHERE status = ?1",
            params![status.as_str()],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }
}

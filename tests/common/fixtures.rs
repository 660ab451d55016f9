//! File-backed store fixture for integration tests

use super::constants::*;
use chrono::{Duration, NaiveDate, Utc};
use series_expander::config::WorkerSettings;
use series_expander::job_queue::{ExpandSeriesPayload, Job, JobQueueStore, SqliteJobQueueStore};
use series_expander::occurrence_store::{Occurrence, OccurrenceStore, SqliteOccurrenceStore};
use series_expander::worker::WorkerLoop;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

/// Date of the seeded base event.
pub fn base_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 10, 1).unwrap()
}

/// `days` calendar days after the base event.
pub fn days_after_base(days: u64) -> NaiveDate {
    base_date() + chrono::Days::new(days)
}

/// Worker settings with a short tick, suitable for tests.
pub fn worker_settings() -> WorkerSettings {
    WorkerSettings {
        tick_interval_ms: 20,
        ..Default::default()
    }
}

pub struct TestStores {
    _dir: TempDir,
    pub db_dir: PathBuf,
    pub jobs: Arc<SqliteJobQueueStore>,
    pub occurrences: Arc<SqliteOccurrenceStore>,
}

impl TestStores {
    pub fn new() -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let db_dir = dir.path().to_path_buf();
        let jobs = Arc::new(
            SqliteJobQueueStore::new(db_dir.join("jobs.db")).expect("Failed to open job queue"),
        );
        let occurrences = Arc::new(
            SqliteOccurrenceStore::new(db_dir.join("occurrences.db"))
                .expect("Failed to open occurrence store"),
        );
        Self {
            _dir: dir,
            db_dir,
            jobs,
            occurrences,
        }
    }

    /// A second, independent connection to the same job queue database.
    pub fn open_jobs_connection(&self) -> Arc<SqliteJobQueueStore> {
        Arc::new(
            SqliteJobQueueStore::new(self.db_dir.join("jobs.db"))
                .expect("Failed to reopen job queue"),
        )
    }

    /// A second, independent connection to the same occurrence database.
    pub fn open_occurrences_connection(&self) -> Arc<SqliteOccurrenceStore> {
        Arc::new(
            SqliteOccurrenceStore::new(self.db_dir.join("occurrences.db"))
                .expect("Failed to reopen occurrence store"),
        )
    }

    /// Insert a hand-made event to be used as a series template.
    pub fn seed_base_event(&self, id: &str, date: NaiveDate, repeats: &str) -> Occurrence {
        let event = Occurrence {
            id: id.to_string(),
            title: BASE_TITLE.to_string(),
            description: Some("Bring both kits".to_string()),
            date,
            start_time: date.and_hms_opt(18, 30, 0).unwrap().and_utc(),
            end_time: date.and_hms_opt(20, 0, 0).unwrap().and_utc(),
            event_type: "training".to_string(),
            team: Some("first-team".to_string()),
            club: Some("fc-rovers".to_string()),
            created_by: BASE_CREATED_BY.to_string(),
            repeats: Some(repeats.to_string()),
            status: "scheduled".to_string(),
            series_id: None,
            occurrence_index: None,
        };
        self.occurrences
            .insert(&event)
            .expect("Failed to seed base event");
        event
    }

    /// Enqueue an `expand-series` job that is already eligible.
    pub fn enqueue_expansion(
        &self,
        series_id: &str,
        base_event_id: &str,
        repeats: &str,
        until: NaiveDate,
    ) -> Job {
        self.enqueue_expansion_at(
            series_id,
            base_event_id,
            repeats,
            until,
            Utc::now() - Duration::seconds(1),
        )
    }

    pub fn enqueue_expansion_at(
        &self,
        series_id: &str,
        base_event_id: &str,
        repeats: &str,
        until: NaiveDate,
        run_at: chrono::DateTime<Utc>,
    ) -> Job {
        let payload = ExpandSeriesPayload {
            series_id: series_id.to_string(),
            base_event_id: base_event_id.to_string(),
            repeats: repeats.to_string(),
            until,
        };
        let job = Job::expand_series(&payload, run_at).expect("Failed to build job");
        self.jobs.enqueue(&job).expect("Failed to enqueue job");
        job
    }

    /// Enqueue an `expand-series` job whose payload column holds `raw` verbatim.
    pub fn enqueue_raw_payload(&self, raw: &str, run_at: chrono::DateTime<Utc>) -> Job {
        let job = self.enqueue_expansion_at(SERIES_ID, BASE_EVENT_ID, "Daily", base_date(), run_at);
        let conn = rusqlite::Connection::open(self.db_dir.join("jobs.db"))
            .expect("Failed to open jobs.db");
        conn.execute(
            "UPDATE jobs SET payload = ?1 WHERE id = ?2",
            rusqlite::params![raw, job.id],
        )
        .expect("Failed to overwrite payload");
        job
    }

    /// Current state of a job.
    pub fn job(&self, id: &str) -> Job {
        self.jobs
            .get_job(id)
            .expect("Failed to load job")
            .expect("Job not found")
    }

    pub fn worker(&self, settings: WorkerSettings) -> WorkerLoop {
        WorkerLoop::new(self.jobs.clone(), self.occurrences.clone(), settings)
    }
}

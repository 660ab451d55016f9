//! Data models for the job queue.

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Job type handled by the series expansion worker.
pub const EXPAND_SERIES_JOB_TYPE: &str = "expand-series";

/// Status of a job in the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    Done,   // terminal
    Failed, // terminal
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Done => "done",
            JobStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "queued" => Some(JobStatus::Queued),
            "running" => Some(JobStatus::Running),
            "done" => Some(JobStatus::Done),
            "failed" => Some(JobStatus::Failed),
            _ => None,
        }
    }
}

/// Payload of an `expand-series` job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpandSeriesPayload {
    /// Identifier shared by every occurrence generated for this series.
    pub series_id: String,
    /// Occurrence used as the template for the series.
    pub base_event_id: String,
    /// Recurrence rule name ("Daily", "Weekly", "Monthly").
    pub repeats: String,
    /// Last date (inclusive) an occurrence may fall on.
    pub until: NaiveDate,
}

/// A job document.
#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    pub id: String,
    pub job_type: String,
    pub status: JobStatus,
    /// Earliest time the job may be claimed.
    pub run_at: DateTime<Utc>,
    /// Number of times the job has been claimed, whatever the outcome.
    pub attempts: u32,
    pub payload: serde_json::Value,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// When the job was last claimed.
    pub claimed_at: Option<DateTime<Utc>>,
}

impl Job {
    /// Create a queued `expand-series` job eligible from `run_at`.
    pub fn expand_series(payload: &ExpandSeriesPayload, run_at: DateTime<Utc>) -> Result<Self> {
        let now = Utc::now();
        Ok(Self {
            id: uuid::Uuid::new_v4().to_string(),
            job_type: EXPAND_SERIES_JOB_TYPE.to_string(),
            status: JobStatus::Queued,
            run_at,
            attempts: 0,
            payload: serde_json::to_value(payload).context("Failed to serialize payload")?,
            last_error: None,
            created_at: now,
            updated_at: now,
            claimed_at: None,
        })
    }

    pub fn is_expand_series(&self) -> bool {
        self.job_type == EXPAND_SERIES_JOB_TYPE
    }

    /// Decode the payload as an `expand-series` payload.
    pub fn expand_series_payload(&self) -> Result<ExpandSeriesPayload, serde_json::Error> {
        ExpandSeriesPayload::deserialize(&self.payload)
    }
}

/// Fields written when a job's status changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobStatusUpdate {
    pub status: JobStatus,
    pub last_error: Option<String>,
}

impl JobStatusUpdate {
    pub fn done() -> Self {
        Self {
            status: JobStatus::Done,
            last_error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: JobStatus::Failed,
            last_error: Some(error.into()),
        }
    }
}

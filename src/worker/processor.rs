//! Processing of a single claimed `expand-series` job.

use super::error::{ProcessError, ProcessingStage};
use super::retry_policy::RetryPolicy;
use crate::job_queue::{Job, JobQueueStore, JobStatusUpdate};
use crate::metrics;
use crate::occurrence_store::{InsertOptions, OccurrenceStore};
use crate::recurrence::{expand_series, Recurrence};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

/// What happened to a claimed job.
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    Completed {
        generated: usize,
        inserted: usize,
        duplicates: usize,
    },
    /// Put back in the queue after a retryable failure.
    Rescheduled {
        run_at: DateTime<Utc>,
        error: String,
    },
    Failed {
        error: String,
    },
}

impl JobOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            JobOutcome::Completed { .. } => "completed",
            JobOutcome::Rescheduled { .. } => "rescheduled",
            JobOutcome::Failed { .. } => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedJob {
    pub job_id: String,
    pub outcome: JobOutcome,
}

#[derive(Debug, Default)]
struct ExpansionSummary {
    generated: usize,
    inserted: usize,
    duplicates: usize,
}

/// Claims `expand-series` jobs and materializes their occurrences.
pub struct SeriesJobProcessor {
    jobs: Arc<dyn JobQueueStore>,
    occurrences: Arc<dyn OccurrenceStore>,
    retry_policy: RetryPolicy,
}

impl SeriesJobProcessor {
    pub fn new(
        jobs: Arc<dyn JobQueueStore>,
        occurrences: Arc<dyn OccurrenceStore>,
        retry_policy: RetryPolicy,
    ) -> Self {
        Self {
            jobs,
            occurrences,
            retry_policy,
        }
    }

    pub fn jobs(&self) -> &Arc<dyn JobQueueStore> {
        &self.jobs
    }

    /// Claim and process up to `limit` jobs, one after the other.
    ///
    /// Stops early once the queue has nothing eligible. Returns an error only
    /// when the queue itself cannot be read or a job's outcome cannot be
    /// recorded.
    pub fn run_batch(&self, limit: usize) -> Result<Vec<ProcessedJob>> {
        let mut processed = Vec::new();
        while processed.len() < limit {
            match self.process_next(Utc::now())? {
                Some(job) => processed.push(job),
                None => break,
            }
        }
        Ok(processed)
    }

    /// Claim the next eligible job at `now` and process it.
    pub fn process_next(&self, now: DateTime<Utc>) -> Result<Option<ProcessedJob>> {
        let Some(job) = self.jobs.claim_next_job(now)? else {
            return Ok(None);
        };
        self.process_claimed(&job).map(Some)
    }

    /// Process a job that has already been claimed (status `running`).
    pub fn process_claimed(&self, job: &Job) -> Result<ProcessedJob> {
        let start = Instant::now();

        let outcome = if self.retry_policy.attempts_exceeded(job.attempts) {
            let message = format!(
                "Attempt limit exceeded: claimed {} times, limit is {}",
                job.attempts, self.retry_policy.max_attempts
            );
            error!("Job {} not processed: {}", job.id, message);
            self.jobs
                .update_job_status(&job.id, &JobStatusUpdate::failed(&message))
                .with_context(|| format!("Failed to mark job {} as failed", job.id))?;
            JobOutcome::Failed { error: message }
        } else {
            info!("Processing job {} (attempt {})", job.id, job.attempts);
            let mut stage = ProcessingStage::Started;
            match self.run_stages(job, &mut stage) {
                Ok(summary) => {
                    metrics::record_occurrences(summary.inserted, summary.duplicates);
                    info!(
                        "Job {} completed: {} generated, {} inserted, {} duplicates",
                        job.id, summary.generated, summary.inserted, summary.duplicates
                    );
                    JobOutcome::Completed {
                        generated: summary.generated,
                        inserted: summary.inserted,
                        duplicates: summary.duplicates,
                    }
                }
                Err(e) => self.handle_failure(job, stage, e)?,
            }
        };

        metrics::record_job(outcome.label(), start.elapsed());
        Ok(ProcessedJob {
            job_id: job.id.clone(),
            outcome,
        })
    }

    fn run_stages(
        &self,
        job: &Job,
        stage: &mut ProcessingStage,
    ) -> Result<ExpansionSummary, ProcessError> {
        if !job.is_expand_series() {
            return Err(ProcessError::InvalidPayload(format!(
                "unsupported job type {:?}",
                job.job_type
            )));
        }
        let payload = job
            .expand_series_payload()
            .map_err(|e| ProcessError::InvalidPayload(e.to_string()))?;

        let base = self
            .occurrences
            .get_by_id(&payload.base_event_id)?
            .ok_or_else(|| ProcessError::BaseEventNotFound(payload.base_event_id.clone()))?;
        *stage = ProcessingStage::BaseLoaded;

        if Recurrence::parse(&payload.repeats).is_none() {
            warn!(
                "Job {} has unknown repeats value {:?}, nothing to expand",
                job.id, payload.repeats
            );
        }
        let occurrences =
            expand_series(&base, &payload.repeats, payload.until, &payload.series_id)?;
        *stage = ProcessingStage::Expanded;

        let mut summary = ExpansionSummary {
            generated: occurrences.len(),
            ..Default::default()
        };
        if !occurrences.is_empty() {
            let result = self
                .occurrences
                .bulk_insert(&occurrences, InsertOptions::unordered())?;
            summary.inserted = result.inserted;
            summary.duplicates = result.duplicate_count();

            if let Some(first) = result.first_non_duplicate() {
                return Err(ProcessError::Insert {
                    failed: result.failures.len() - summary.duplicates,
                    first_error: first.message.clone(),
                });
            }
        }
        *stage = ProcessingStage::Persisted;

        self.jobs.update_job_status(&job.id, &JobStatusUpdate::done())?;
        *stage = ProcessingStage::Completed;

        Ok(summary)
    }

    fn handle_failure(
        &self,
        job: &Job,
        stage: ProcessingStage,
        error: ProcessError,
    ) -> Result<JobOutcome> {
        let message = error.to_string();
        error!(
            "Job {} failed at stage {} ({}): {}",
            job.id,
            stage,
            error.kind(),
            message
        );

        if self.retry_policy.should_retry(&error, job.attempts) {
            let run_at = self.retry_policy.next_retry_at(job.attempts, Utc::now());
            self.jobs
                .reschedule_job(&job.id, run_at, &message)
                .with_context(|| format!("Failed to reschedule job {}", job.id))?;
            warn!(
                "Job {} rescheduled for {} (attempt {} of {})",
                job.id, run_at, job.attempts, self.retry_policy.max_attempts
            );
            Ok(JobOutcome::Rescheduled {
                run_at,
                error: message,
            })
        } else {
            self.jobs
                .update_job_status(&job.id, &JobStatusUpdate::failed(&message))
                .with_context(|| format!("Failed to mark job {} as failed", job.id))?;
            Ok(JobOutcome::Failed { error: message })
        }
    }
}

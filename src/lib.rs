//! Series expansion worker library
//!
//! Expands recurring calendar events into dated occurrences, driven by a
//! persistent job queue.

pub mod config;
pub mod job_queue;
pub mod metrics;
pub mod occurrence_store;
pub mod recurrence;
pub mod sqlite_persistence;
pub mod worker;

// Re-export commonly used types for convenience
pub use job_queue::{Job, JobQueueStore, JobStatus, SqliteJobQueueStore};
pub use occurrence_store::{Occurrence, OccurrenceStore, SqliteOccurrenceStore};
pub use recurrence::{expand_series, ExpansionError, Recurrence};
pub use worker::{SeriesJobProcessor, TickOutcome, WorkerLoop};

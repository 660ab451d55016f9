//! The series expansion worker.
//!
//! [`WorkerLoop`] fires ticks on a fixed interval. Each tick holds a
//! [`TickLease`] and lets the [`SeriesJobProcessor`] claim and process up to
//! `batch_limit` jobs.

mod error;
mod processor;
mod retry_policy;
mod worker_loop;

pub use error::{ProcessError, ProcessingStage};
pub use processor::{JobOutcome, ProcessedJob, SeriesJobProcessor};
pub use retry_policy::RetryPolicy;
pub use worker_loop::{TickLease, TickOutcome, WorkerLoop};

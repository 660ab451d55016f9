//! Persistent queue of background jobs.
//!
//! Jobs are created by other parts of the system; this crate only claims
//! `expand-series` jobs and records their outcome.

mod models;
mod schema;
mod store;

pub use models::*;
pub use schema::JOB_QUEUE_VERSIONED_SCHEMAS;
#[cfg(any(test, feature = "mock"))]
pub use store::MockJobQueueStore;
pub use store::{JobQueueStore, SqliteJobQueueStore};

//! Durable collection of calendar occurrences.

mod models;
mod schema;
mod store;

pub use models::*;
pub use schema::OCCURRENCE_VERSIONED_SCHEMAS;
#[cfg(any(test, feature = "mock"))]
pub use store::MockOccurrenceStore;
pub use store::{OccurrenceStore, SqliteOccurrenceStore};

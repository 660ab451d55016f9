//! Data models for the occurrence store.

use chrono::{DateTime, NaiveDate, Utc};

/// A single dated calendar entry: either a hand-made event or one generated
/// by expanding a series.
#[derive(Debug, Clone, PartialEq)]
pub struct Occurrence {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    /// Calendar day of the occurrence.
    pub date: NaiveDate,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub event_type: String,
    pub team: Option<String>,
    pub club: Option<String>,
    pub created_by: String,
    /// Recurrence rule name the event was created with, if any.
    pub repeats: Option<String>,
    pub status: String,
    /// Set on generated occurrences only.
    pub series_id: Option<String>,
    /// 1-based position inside the series, set on generated occurrences only.
    pub occurrence_index: Option<u32>,
}

/// Options for bulk inserts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InsertOptions {
    /// Stop at the first failing document when true; otherwise attempt all.
    pub ordered: bool,
}

impl InsertOptions {
    pub fn unordered() -> Self {
        Self { ordered: false }
    }
}

impl Default for InsertOptions {
    fn default() -> Self {
        Self { ordered: true }
    }
}

/// Why a single document in a bulk insert was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertFailureKind {
    /// Uniqueness constraint violation.
    Duplicate,
    /// Anything else (validation, I/O, ...).
    Other,
}

impl InsertFailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            InsertFailureKind::Duplicate => "duplicate",
            InsertFailureKind::Other => "other",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsertFailure {
    /// Position of the rejected document in the input slice.
    pub index: usize,
    pub kind: InsertFailureKind,
    pub message: String,
}

/// Outcome of a bulk insert.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InsertResult {
    pub inserted: usize,
    pub failures: Vec<InsertFailure>,
}

impl InsertResult {
    pub fn duplicate_count(&self) -> usize {
        self.failures
            .iter()
            .filter(|f| f.kind == InsertFailureKind::Duplicate)
            .count()
    }

    /// First failure that is not a duplicate.
    pub fn first_non_duplicate(&self) -> Option<&InsertFailure> {
        self.failures
            .iter()
            .find(|f| f.kind != InsertFailureKind::Duplicate)
    }
}

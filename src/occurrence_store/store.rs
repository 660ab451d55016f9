//! Occurrence storage and persistence.

use super::models::*;
use super::schema::OCCURRENCE_VERSIONED_SCHEMAS;
use crate::sqlite_persistence::open_versioned_db;
use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{ffi, params, Connection, ErrorCode, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const DATE_FORMAT: &str = "%Y-%m-%d";

const INSERT_OCCURRENCE_SQL: &str = r#"INSERT INTO occurrences (
    id, title, description, date, start_time, end_time, event_type, team, club,
    created_by, repeats, status, series_id, occurrence_index, created_at
) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)"#;

/// Trait for occurrence storage operations.
#[cfg_attr(any(test, feature = "mock"), mockall::automock)]
pub trait OccurrenceStore: Send + Sync {
    /// Insert a single occurrence.
    fn insert(&self, occurrence: &Occurrence) -> Result<()>;

    /// Get an occurrence by ID.
    fn get_by_id(&self, id: &str) -> Result<Option<Occurrence>>;

    /// Insert many occurrences, reporting per-document failures.
    ///
    /// An `Err` means the batch as a whole could not be attempted; rejected
    /// documents are reported in the returned `InsertResult` instead.
    fn bulk_insert(&self, occurrences: &[Occurrence], options: InsertOptions)
        -> Result<InsertResult>;

    /// All occurrences of a series, by occurrence index.
    fn list_series(&self, series_id: &str) -> Result<Vec<Occurrence>>;

    /// Number of occurrences in a series.
    fn count_series(&self, series_id: &str) -> Result<usize>;
}

/// SQLite-backed occurrence store.
pub struct SqliteOccurrenceStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteOccurrenceStore {
    /// Open (or create) the occurrence database at `db_path`.
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = open_versioned_db(db_path.as_ref(), OCCURRENCE_VERSIONED_SCHEMAS, "occurrence")?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Create an in-memory store for testing.
    #[cfg(test)]
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        OCCURRENCE_VERSIONED_SCHEMAS
            .last()
            .context("No schemas defined")?
            .create(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn execute_insert(conn: &Connection, occurrence: &Occurrence) -> rusqlite::Result<usize> {
        conn.prepare_cached(INSERT_OCCURRENCE_SQL)?.execute(params![
            occurrence.id,
            occurrence.title,
            occurrence.description,
            occurrence.date.format(DATE_FORMAT).to_string(),
            occurrence.start_time.to_rfc3339(),
            occurrence.end_time.to_rfc3339(),
            occurrence.event_type,
            occurrence.team,
            occurrence.club,
            occurrence.created_by,
            occurrence.repeats,
            occurrence.status,
            occurrence.series_id,
            occurrence.occurrence_index,
            Utc::now().timestamp_millis(),
        ])
    }

    fn row_to_occurrence(row: &rusqlite::Row) -> rusqlite::Result<Occurrence> {
        let date: String = row.get("date")?;
        let start_time: String = row.get("start_time")?;
        let end_time: String = row.get("end_time")?;

        Ok(Occurrence {
            id: row.get("id")?,
            title: row.get("title")?,
            description: row.get("description")?,
            date: NaiveDate::parse_from_str(&date, DATE_FORMAT)
                .map_err(|e| conversion_error(3, e))?,
            start_time: parse_timestamp(&start_time).map_err(|e| conversion_error(4, e))?,
            end_time: parse_timestamp(&end_time).map_err(|e| conversion_error(5, e))?,
            event_type: row.get("event_type")?,
            team: row.get("team")?,
            club: row.get("club")?,
            created_by: row.get("created_by")?,
            repeats: row.get("repeats")?,
            status: row.get("status")?,
            series_id: row.get("series_id")?,
            occurrence_index: row.get("occurrence_index")?,
        })
    }
}

fn parse_timestamp(s: &str) -> chrono::ParseResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s).map(|dt| dt.with_timezone(&Utc))
}

fn conversion_error(column: usize, e: chrono::ParseError) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(column, rusqlite::types::Type::Text, Box::new(e))
}

/// Classify a rejected insert: uniqueness violations are duplicates.
fn classify_insert_error(error: &rusqlite::Error) -> InsertFailureKind {
    match error {
        rusqlite::Error::SqliteFailure(e, _)
            if e.code == ErrorCode::ConstraintViolation
                && matches!(
                    e.extended_code,
                    ffi::SQLITE_CONSTRAINT_UNIQUE | ffi::SQLITE_CONSTRAINT_PRIMARYKEY
                ) =>
        {
            InsertFailureKind::Duplicate
        }
        _ => InsertFailureKind::Other,
    }
}

impl OccurrenceStore for SqliteOccurrenceStore {
    fn insert(&self, occurrence: &Occurrence) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        Self::execute_insert(&conn, occurrence)
            .with_context(|| format!("Failed to insert occurrence {}", occurrence.id))?;
        Ok(())
    }

    fn get_by_id(&self, id: &str) -> Result<Option<Occurrence>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT * FROM occurrences WHERE id = ?1",
            params![id],
            Self::row_to_occurrence,
        )
        .optional()
        .with_context(|| format!("Failed to load occurrence {}", id))
    }

    fn bulk_insert(
        &self,
        occurrences: &[Occurrence],
        options: InsertOptions,
    ) -> Result<InsertResult> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn
            .transaction()
            .context("Failed to start bulk insert transaction")?;

        let mut result = InsertResult::default();
        for (index, occurrence) in occurrences.iter().enumerate() {
            // A failed statement only rolls back itself, the transaction stays usable
            match Self::execute_insert(&tx, occurrence) {
                Ok(_) => result.inserted += 1,
                Err(e) => {
                    result.failures.push(InsertFailure {
                        index,
                        kind: classify_insert_error(&e),
                        message: e.to_string(),
                    });
                    if options.ordered {
                        break;
                    }
                }
            }
        }

        tx.commit().context("Failed to commit bulk insert")?;
        Ok(result)
    }

    fn list_series(&self, series_id: &str) -> Result<Vec<Occurrence>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT * FROM occurrences WHERE series_id = ?1 ORDER BY occurrence_index ASC",
        )?;
        let occurrences = stmt
            .query_map(params![series_id], Self::row_to_occurrence)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .with_context(|| format!("Failed to list series {}", series_id))?;
        Ok(occurrences)
    }

    fn count_series(&self, series_id: &str) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM occurrences WHERE series_id = ?1",
            params![series_id],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }
}

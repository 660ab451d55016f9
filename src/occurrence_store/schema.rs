//! Database schema for occurrences.db.

use crate::sqlite_column;
use crate::sqlite_persistence::{Column, SqlType, Table, VersionedSchema};

const OCCURRENCES_TABLE_V0: Table = Table {
    name: "occurrences",
    columns: &[
        sqlite_column!("id", &SqlType::Text, is_primary_key = true),
        sqlite_column!("title", &SqlType::Text, non_null = true),
        sqlite_column!("description", &SqlType::Text),
        sqlite_column!("date", &SqlType::Text, non_null = true),
        sqlite_column!("start_time", &SqlType::Text, non_null = true),
        sqlite_column!("end_time", &SqlType::Text, non_null = true),
        sqlite_column!("event_type", &SqlType::Text, non_null = true),
        sqlite_column!("team", &SqlType::Text),
        sqlite_column!("club", &SqlType::Text),
        sqlite_column!("created_by", &SqlType::Text, non_null = true),
        sqlite_column!("repeats", &SqlType::Text),
        sqlite_column!("status", &SqlType::Text, non_null = true),
        sqlite_column!("series_id", &SqlType::Text),
        sqlite_column!("occurrence_index", &SqlType::Integer),
        sqlite_column!("created_at", &SqlType::Integer, non_null = true),
    ],
    indices: &[("idx_occurrences_date", "date")],
    // NULLs are distinct in SQLite, so hand-made events never collide here
    unique_constraints: &[&["series_id", "occurrence_index"]],
};

pub const OCCURRENCE_VERSIONED_SCHEMAS: &[VersionedSchema] = &[VersionedSchema {
    version: 0,
    tables: &[OCCURRENCES_TABLE_V0],
    migration: None,
}];

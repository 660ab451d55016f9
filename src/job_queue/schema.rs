//! Database schema for jobs.db.

use crate::sqlite_column;
use crate::sqlite_persistence::{Column, SqlType, Table, VersionedSchema};

const JOBS_TABLE_V0: Table = Table {
    name: "jobs",
    columns: &[
        sqlite_column!("id", &SqlType::Text, is_primary_key = true),
        sqlite_column!("job_type", &SqlType::Text, non_null = true),
        sqlite_column!("status", &SqlType::Text, non_null = true),
        sqlite_column!("run_at", &SqlType::Integer, non_null = true),
        sqlite_column!(
            "attempts",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
        sqlite_column!("payload", &SqlType::Text, non_null = true),
        sqlite_column!("last_error", &SqlType::Text),
        sqlite_column!("created_at", &SqlType::Integer, non_null = true),
        sqlite_column!("updated_at", &SqlType::Integer, non_null = true),
        sqlite_column!("claimed_at", &SqlType::Integer),
    ],
    indices: &[("idx_jobs_claim", "status, job_type, run_at")],
    unique_constraints: &[],
};

pub const JOB_QUEUE_VERSIONED_SCHEMAS: &[VersionedSchema] = &[VersionedSchema {
    version: 0,
    tables: &[JOBS_TABLE_V0],
    migration: None,
}];

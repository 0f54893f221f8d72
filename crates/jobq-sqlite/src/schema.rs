//! Table definition and pool setup.

use std::path::Path;
use std::time::Duration;

use jobq_core::domain::StoreError;
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

/// Executed on every open; creates what is missing and nothing more.
pub(crate) const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS queue_entries (
    id TEXT PRIMARY KEY NOT NULL,
    input_path TEXT NOT NULL,
    py_venv TEXT NOT NULL,
    output_directory TEXT NOT NULL,
    convert_longitudes INTEGER NOT NULL,
    split_vars INTEGER NOT NULL,
    split_intervals INTEGER NOT NULL,
    ppn INTEGER NOT NULL,
    walltime TEXT NOT NULL,
    status TEXT NOT NULL CHECK(status IN ('NEW', 'HOLD', 'SUBMITTED', 'RUNNING', 'SUCCESS', 'ERROR')),
    added_time TEXT NOT NULL,
    submitted_time TEXT,
    external_job_id TEXT,
    started_time TEXT,
    completed_time TEXT,
    completion_message TEXT,
    revision INTEGER NOT NULL DEFAULT 0,
    lease_holder TEXT,
    lease_expires_at TEXT
);

CREATE INDEX IF NOT EXISTS idx_queue_status_added ON queue_entries(status, added_time);
CREATE INDEX IF NOT EXISTS idx_queue_input_path ON queue_entries(input_path);
";

const MAX_CONNECTIONS: u32 = 5;
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Open (creating if needed) the database file at `path`.
pub(crate) async fn create_connection_pool(path: &Path) -> Result<SqlitePool, StoreError> {
    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true)
        .busy_timeout(BUSY_TIMEOUT);
    SqlitePoolOptions::new()
        .max_connections(MAX_CONNECTIONS)
        .min_connections(1)
        .connect_with(options)
        .await
        .map_err(|e| {
            StoreError::Backend(format!(
                "failed to open database {}: {e}",
                path.display()
            ))
        })
}

pub(crate) async fn init_schema(pool: &SqlitePool) -> Result<(), StoreError> {
    sqlx::query(SCHEMA)
        .execute(pool)
        .await
        .map(|_| ())
        .map_err(|e| StoreError::Backend(format!("failed to initialize schema: {e}")))
}

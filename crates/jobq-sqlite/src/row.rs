//! Row <-> QueueEntry conversion.

use chrono::{DateTime, SecondsFormat, Utc};
use jobq_core::domain::{EntryId, ExecParams, QueueEntry, Status, StoreError};
use sqlx::Row;
use sqlx::sqlite::SqliteRow;

/// Columns in the order `parse_entry_row` reads them.
pub(crate) const ENTRY_COLUMNS: &str = "id, input_path, py_venv, output_directory, \
    convert_longitudes, split_vars, split_intervals, ppn, walltime, status, added_time, \
    submitted_time, external_job_id, started_time, completed_time, completion_message, revision";

/// Fixed-width UTC text, so lexical order is time order.
pub(crate) fn time_to_text(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn opt_time_to_text(t: Option<DateTime<Utc>>) -> Option<String> {
    t.map(time_to_text)
}

fn text_to_time(column: &str, value: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StoreError::Backend(format!("invalid {column} '{value}': {e}")))
}

fn get<'r, T>(row: &'r SqliteRow, column: &str) -> Result<T, StoreError>
where
    T: sqlx::Decode<'r, sqlx::Sqlite> + sqlx::Type<sqlx::Sqlite>,
{
    row.try_get(column)
        .map_err(|e| StoreError::Backend(format!("failed to read {column}: {e}")))
}

fn get_time(row: &SqliteRow, column: &str) -> Result<DateTime<Utc>, StoreError> {
    let text: String = get(row, column)?;
    text_to_time(column, &text)
}

fn get_opt_time(row: &SqliteRow, column: &str) -> Result<Option<DateTime<Utc>>, StoreError> {
    let text: Option<String> = get(row, column)?;
    text.map(|t| text_to_time(column, &t)).transpose()
}

pub(crate) fn parse_entry_row(row: &SqliteRow) -> Result<QueueEntry, StoreError> {
    let id_text: String = get(row, "id")?;
    let id: EntryId = id_text
        .parse()
        .map_err(|e| StoreError::Backend(format!("invalid id: {e}")))?;
    let status_text: String = get(row, "status")?;
    let status: Status = status_text
        .parse()
        .map_err(|e| StoreError::Backend(format!("invalid status: {e}")))?;
    let ppn: i64 = get(row, "ppn")?;
    let revision: i64 = get(row, "revision")?;

    Ok(QueueEntry {
        id,
        input_path: get(row, "input_path")?,
        params: ExecParams {
            py_venv: get(row, "py_venv")?,
            output_directory: get(row, "output_directory")?,
            convert_longitudes: get(row, "convert_longitudes")?,
            split_vars: get(row, "split_vars")?,
            split_intervals: get(row, "split_intervals")?,
            ppn: u32::try_from(ppn)
                .map_err(|_| StoreError::Backend(format!("invalid ppn {ppn}")))?,
            walltime: get(row, "walltime")?,
        },
        status,
        added_time: get_time(row, "added_time")?,
        submitted_time: get_opt_time(row, "submitted_time")?,
        external_job_id: get(row, "external_job_id")?,
        started_time: get_opt_time(row, "started_time")?,
        completed_time: get_opt_time(row, "completed_time")?,
        completion_message: get(row, "completion_message")?,
        revision: u64::try_from(revision)
            .map_err(|_| StoreError::Backend(format!("invalid revision {revision}")))?,
    })
}

pub(crate) fn revision_to_sql(revision: u64) -> Result<i64, StoreError> {
    i64::try_from(revision)
        .map_err(|_| StoreError::Backend(format!("revision {revision} out of range")))
}

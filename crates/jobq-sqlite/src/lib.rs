//! jobq-sqlite
//!
//! SQLite-backed [`EntryStore`]. One table, `queue_entries`; every write is
//! conditional on the stored revision.

mod row;
mod schema;

use std::path::Path;

use async_trait::async_trait;
use jobq_core::domain::{EntryId, QueueEntry, Status, StoreError};
use jobq_core::observability::QueueCounts;
use jobq_core::ports::{CommitGuard, DispatchLease, EntryFilter, EntryStore};
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};

use crate::row::{
    ENTRY_COLUMNS, opt_time_to_text, parse_entry_row, revision_to_sql, time_to_text,
};

#[derive(Debug, Clone)]
pub struct SqliteEntryStore {
    pool: SqlitePool,
}

fn backend(context: &str) -> impl FnOnce(sqlx::Error) -> StoreError + '_ {
    move |e| StoreError::Backend(format!("{context}: {e}"))
}

fn limit_to_sql(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

/// Appends ` WHERE ...` for `filter` (ignoring its limit).
fn push_where(qb: &mut QueryBuilder<'_, Sqlite>, filter: &EntryFilter) {
    qb.push(" WHERE 1 = 1");
    if let Some(path) = &filter.path_equals {
        qb.push(" AND input_path = ").push_bind(path.clone());
    }
    if let Some(fragment) = &filter.path_contains {
        qb.push(" AND instr(input_path, ")
            .push_bind(fragment.clone())
            .push(") > 0");
    }
    if let Some(fragment) = &filter.job_id_contains {
        qb.push(" AND instr(external_job_id, ")
            .push_bind(fragment.clone())
            .push(") > 0");
    }
    if !filter.statuses.is_empty() {
        qb.push(" AND status IN (");
        let mut separated = qb.separated(", ");
        for status in &filter.statuses {
            separated.push_bind(status.as_str());
        }
        separated.push_unseparated(")");
    }
}

impl SqliteEntryStore {
    /// Open the database file at `path`, creating it and the table if missing.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let pool = schema::create_connection_pool(path).await?;
        schema::init_schema(&pool).await?;
        tracing::debug!(path = %path.display(), "opened queue database");
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Why a commit matched no row: a foreign lease if the revision is
    /// still current, a conflict otherwise.
    async fn commit_refusal(
        &self,
        entry: &QueueEntry,
        revision: i64,
    ) -> Result<StoreError, StoreError> {
        let row = sqlx::query("SELECT revision, lease_holder FROM queue_entries WHERE id = ?")
            .bind(entry.id.to_storage_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(backend("failed to read queue entry"))?;
        let Some(row) = row else {
            return Ok(StoreError::Conflict { id: entry.id });
        };
        let stored_revision: i64 = row
            .try_get("revision")
            .map_err(backend("failed to read revision"))?;
        let holder: Option<String> = row
            .try_get("lease_holder")
            .map_err(backend("failed to read lease holder"))?;
        Ok(match holder {
            Some(holder) if stored_revision == revision => StoreError::Leased {
                id: entry.id,
                holder,
            },
            _ => StoreError::Conflict { id: entry.id },
        })
    }
}

#[async_trait]
impl EntryStore for SqliteEntryStore {
    async fn insert(&self, entry: &QueueEntry) -> Result<QueueEntry, StoreError> {
        let p = &entry.params;
        sqlx::query(
            "INSERT INTO queue_entries (id, input_path, py_venv, output_directory, \
             convert_longitudes, split_vars, split_intervals, ppn, walltime, status, added_time, \
             submitted_time, external_job_id, started_time, completed_time, completion_message, \
             revision) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(entry.id.to_storage_string())
        .bind(&entry.input_path)
        .bind(&p.py_venv)
        .bind(&p.output_directory)
        .bind(p.convert_longitudes)
        .bind(p.split_vars)
        .bind(p.split_intervals)
        .bind(i64::from(p.ppn))
        .bind(&p.walltime)
        .bind(entry.status.as_str())
        .bind(time_to_text(entry.added_time))
        .bind(opt_time_to_text(entry.submitted_time))
        .bind(&entry.external_job_id)
        .bind(opt_time_to_text(entry.started_time))
        .bind(opt_time_to_text(entry.completed_time))
        .bind(&entry.completion_message)
        .bind(revision_to_sql(entry.revision)?)
        .execute(&self.pool)
        .await
        .map_err(backend("failed to insert queue entry"))?;
        Ok(entry.clone())
    }

    async fn get(&self, id: EntryId) -> Result<Option<QueueEntry>, StoreError> {
        let sql = format!("SELECT {ENTRY_COLUMNS} FROM queue_entries WHERE id = ?");
        sqlx::query(&sql)
            .bind(id.to_storage_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(backend("failed to load queue entry"))?
            .map(|row| parse_entry_row(&row))
            .transpose()
    }

    async fn list(&self, filter: &EntryFilter) -> Result<Vec<QueueEntry>, StoreError> {
        let mut qb = QueryBuilder::<Sqlite>::new(format!("SELECT {ENTRY_COLUMNS} FROM queue_entries"));
        push_where(&mut qb, filter);
        qb.push(" ORDER BY added_time, id");
        if let Some(limit) = filter.limit {
            qb.push(" LIMIT ").push_bind(limit_to_sql(limit));
        }
        qb.build()
            .fetch_all(&self.pool)
            .await
            .map_err(backend("failed to list queue entries"))?
            .iter()
            .map(parse_entry_row)
            .collect()
    }

    async fn count_by_status(&self, filter: &EntryFilter) -> Result<QueueCounts, StoreError> {
        let mut qb = QueryBuilder::<Sqlite>::new("SELECT status, COUNT(*) AS n FROM queue_entries");
        push_where(&mut qb, filter);
        qb.push(" GROUP BY status");
        let rows = qb
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(backend("failed to count queue entries"))?;

        let mut counts = QueueCounts::default();
        for row in rows {
            let status: String = row
                .try_get("status")
                .map_err(backend("failed to read status"))?;
            let n: i64 = row.try_get("n").map_err(backend("failed to read count"))?;
            let status: Status = status
                .parse()
                .map_err(|e| StoreError::Backend(format!("invalid status: {e}")))?;
            counts.add(status, usize::try_from(n).unwrap_or_default());
        }
        Ok(counts)
    }

    async fn lease_new(
        &self,
        limit: usize,
        lease: &DispatchLease,
    ) -> Result<Vec<QueueEntry>, StoreError> {
        // one statement, so selection and lease are atomic
        let sql = format!(
            "UPDATE queue_entries \
             SET lease_holder = ?, lease_expires_at = ?, revision = revision + 1 \
             WHERE id IN ( \
                 SELECT id FROM queue_entries \
                 WHERE status = 'NEW' AND (lease_expires_at IS NULL OR lease_expires_at <= ?) \
                 ORDER BY added_time, id LIMIT ? \
             ) \
             RETURNING {ENTRY_COLUMNS}"
        );
        let rows = sqlx::query(&sql)
            .bind(&lease.holder)
            .bind(time_to_text(lease.expires_at))
            .bind(time_to_text(lease.now))
            .bind(limit_to_sql(limit))
            .fetch_all(&self.pool)
            .await
            .map_err(backend("failed to lease queue entries"))?;

        let mut leased = rows
            .iter()
            .map(parse_entry_row)
            .collect::<Result<Vec<_>, _>>()?;
        leased.sort_by_key(QueueEntry::fifo_key);
        Ok(leased)
    }

    async fn commit(
        &self,
        entry: &QueueEntry,
        guard: &CommitGuard,
    ) -> Result<QueueEntry, StoreError> {
        let p = &entry.params;
        let revision = revision_to_sql(entry.revision)?;
        let result = sqlx::query(
            "UPDATE queue_entries SET input_path = ?, py_venv = ?, output_directory = ?, \
             convert_longitudes = ?, split_vars = ?, split_intervals = ?, ppn = ?, walltime = ?, \
             status = ?, submitted_time = ?, external_job_id = ?, started_time = ?, \
             completed_time = ?, completion_message = ?, revision = revision + 1, \
             lease_holder = NULL, lease_expires_at = NULL \
             WHERE id = ? AND revision = ? \
             AND (lease_holder IS NULL OR lease_expires_at <= ? OR lease_holder = ?)",
        )
        .bind(&entry.input_path)
        .bind(&p.py_venv)
        .bind(&p.output_directory)
        .bind(p.convert_longitudes)
        .bind(p.split_vars)
        .bind(p.split_intervals)
        .bind(i64::from(p.ppn))
        .bind(&p.walltime)
        .bind(entry.status.as_str())
        .bind(opt_time_to_text(entry.submitted_time))
        .bind(&entry.external_job_id)
        .bind(opt_time_to_text(entry.started_time))
        .bind(opt_time_to_text(entry.completed_time))
        .bind(&entry.completion_message)
        .bind(entry.id.to_storage_string())
        .bind(revision)
        .bind(time_to_text(guard.now))
        .bind(&guard.holder)
        .execute(&self.pool)
        .await
        .map_err(backend("failed to update queue entry"))?;

        if result.rows_affected() == 0 {
            return Err(self.commit_refusal(entry, revision).await?);
        }
        let mut stored = entry.clone();
        stored.revision += 1;
        Ok(stored)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{Duration, TimeZone, Utc};
    use jobq_core::app::{AppBuilder, EntrySelector};
    use jobq_core::domain::{ExecParams, NewEntry};
    use jobq_core::impls::QsubSubmitter;
    use jobq_core::ports::FixedClock;
    use tempfile::TempDir;
    use ulid::Ulid;

    use super::*;

    fn at(minute: u32) -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, minute, 0).unwrap()
    }

    fn entry(path: &str, minute: u32) -> QueueEntry {
        let id = EntryId::from_ulid(Ulid::from_parts(at(minute).timestamp_millis() as u64, 3));
        QueueEntry::create(id, NewEntry::new(path, ExecParams::new("/v", "/o")), at(minute))
    }

    fn lease(holder: &str, minute: u32) -> DispatchLease {
        DispatchLease {
            holder: holder.into(),
            now: at(minute),
            expires_at: at(minute) + Duration::minutes(10),
        }
    }

    fn writer(minute: u32) -> CommitGuard {
        CommitGuard::writer(at(minute))
    }

    async fn open() -> (TempDir, SqliteEntryStore) {
        let dir = TempDir::new().unwrap();
        let store = SqliteEntryStore::open(dir.path().join("queue.db"))
            .await
            .unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn insert_and_get_round_trip() {
        let (_dir, store) = open().await;
        let mut e = entry("/in/a.nc", 1);
        e.params.ppn = 3;
        e.params.split_vars = false;
        store.insert(&e).await.unwrap();
        assert_eq!(store.get(e.id).await.unwrap(), Some(e));
    }

    #[tokio::test]
    async fn list_filters_and_orders() {
        let (_dir, store) = open().await;
        store.insert(&entry("/in/tas_b.nc", 2)).await.unwrap();
        store.insert(&entry("/in/tas_a.nc", 1)).await.unwrap();
        store.insert(&entry("/in/pr.nc", 3)).await.unwrap();
        let mut submitted = entry("/in/tas_c.nc", 4);
        submitted.status = Status::Submitted;
        submitted.external_job_id = Some("55.server".into());
        store.insert(&submitted).await.unwrap();

        let tas: Vec<String> = store
            .list(&EntryFilter::all().path_contains("tas_"))
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.input_path)
            .collect();
        assert_eq!(tas, vec!["/in/tas_a.nc", "/in/tas_b.nc", "/in/tas_c.nc"]);

        let new_only = store
            .list(&EntryFilter::all().path_contains("tas_").status(Status::New).limit(1))
            .await
            .unwrap();
        assert_eq!(new_only.len(), 1);
        assert_eq!(new_only[0].input_path, "/in/tas_a.nc");

        let by_job = store
            .list(&EntryFilter::all().job_id_contains("55"))
            .await
            .unwrap();
        assert_eq!(by_job, vec![submitted]);

        let exact = store
            .list(&EntryFilter::all().path_equals("/in/pr.nc"))
            .await
            .unwrap();
        assert_eq!(exact.len(), 1);
    }

    #[tokio::test]
    async fn commit_checks_revision() {
        let (_dir, store) = open().await;
        let e = store.insert(&entry("/in/a.nc", 1)).await.unwrap();

        let mut held = e.clone();
        held.status = Status::Hold;
        let stored = store.commit(&held, &writer(2)).await.unwrap();
        assert_eq!(stored.revision, 1);

        let err = store.commit(&held, &writer(3)).await.unwrap_err();
        assert_eq!(err, StoreError::Conflict { id: e.id });
        assert_eq!(store.get(e.id).await.unwrap(), Some(stored));
    }

    #[tokio::test]
    async fn leases_are_exclusive_until_expiry() {
        let (_dir, store) = open().await;
        store.insert(&entry("/in/a.nc", 1)).await.unwrap();
        store.insert(&entry("/in/b.nc", 2)).await.unwrap();
        store.insert(&entry("/in/c.nc", 3)).await.unwrap();

        let first = store.lease_new(2, &lease("one", 5)).await.unwrap();
        let paths: Vec<&str> = first.iter().map(|e| e.input_path.as_str()).collect();
        assert_eq!(paths, vec!["/in/a.nc", "/in/b.nc"]);
        assert!(first.iter().all(|e| e.revision == 1));

        let second = store.lease_new(5, &lease("two", 6)).await.unwrap();
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].input_path, "/in/c.nc");

        // committing releases; expiry frees the rest
        store
            .commit(&first[0], &CommitGuard::lease_holder(&lease("one", 5), at(7)))
            .await
            .unwrap();
        let third = store.lease_new(5, &lease("three", 30)).await.unwrap();
        assert_eq!(third.len(), 3);
    }

    #[tokio::test]
    async fn foreign_commit_is_refused_while_lease_is_live() {
        let (_dir, store) = open().await;
        store.insert(&entry("/in/a.nc", 1)).await.unwrap();
        let leased = store.lease_new(1, &lease("one", 5)).await.unwrap().remove(0);

        let mut altered = leased.clone();
        altered.params.ppn = 4;
        let err = store.commit(&altered, &writer(6)).await.unwrap_err();
        assert_eq!(
            err,
            StoreError::Leased {
                id: leased.id,
                holder: "one".into()
            }
        );
        assert_eq!(store.get(leased.id).await.unwrap(), Some(leased.clone()));

        // lease from "one" expired at minute 15
        let stored = store.commit(&altered, &writer(15)).await.unwrap();
        assert_eq!(stored.params.ppn, 4);
        assert_eq!(stored.revision, leased.revision + 1);
    }

    #[tokio::test]
    async fn counts_group_by_status() {
        let (_dir, store) = open().await;
        store.insert(&entry("/in/a.nc", 1)).await.unwrap();
        store.insert(&entry("/in/b.nc", 2)).await.unwrap();
        let mut err = entry("/in/c.nc", 3);
        err.status = Status::Error;
        store.insert(&err).await.unwrap();

        let counts = store.count_by_status(&EntryFilter::all()).await.unwrap();
        assert_eq!(counts.new, 2);
        assert_eq!(counts.error, 1);
        assert_eq!(counts.total(), 3);

        let filtered = store
            .count_by_status(&EntryFilter::all().path_contains("c.nc"))
            .await
            .unwrap();
        assert_eq!(filtered.total(), 1);
    }

    #[tokio::test]
    async fn status_column_rejects_unknown_values() {
        let (_dir, store) = open().await;
        let result = sqlx::query(
            "INSERT INTO queue_entries (id, input_path, py_venv, output_directory, \
             convert_longitudes, split_vars, split_intervals, ppn, walltime, status, added_time) \
             VALUES ('x', '/a', '/v', '/o', 1, 1, 1, 1, '1:00:00', 'PAUSED', '2024')",
        )
        .execute(store.pool())
        .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn data_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("queue.db");
        let e = entry("/in/a.nc", 1);
        {
            let store = SqliteEntryStore::open(&path).await.unwrap();
            store.insert(&e).await.unwrap();
            store.pool().close().await;
        }
        let store = SqliteEntryStore::open(&path).await.unwrap();
        assert_eq!(store.get(e.id).await.unwrap(), Some(e));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn queue_app_runs_on_sqlite() {
        let (_dir, store) = open().await;
        let clock = Arc::new(FixedClock::new(at(0)));
        let app = AppBuilder::new()
            .store(store.clone())
            .clock(Arc::clone(&clock))
            .submitter(QsubSubmitter::new("sh").with_args(["-c", "cat >/dev/null; echo 8.server"]))
            .build()
            .unwrap();

        app.register(NewEntry::new("/in/a.nc", ExecParams::new("/v", "/o")), false)
            .await
            .unwrap();
        clock.advance(Duration::minutes(1));
        let outcomes = app.dispatch(5).await.unwrap();
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].status, Status::Submitted);
        assert_eq!(outcomes[0].external_job_id.as_deref(), Some("8.server"));

        let reset = app
            .reset(&EntrySelector::PathEquals("/in/a.nc".into()), Status::New)
            .await
            .unwrap();
        let results = app.apply_all(reset).await;
        assert!(results.iter().all(|r| !r.is_failure()));
        assert_eq!(app.summarize(None).await.unwrap().new, 1);
    }
}

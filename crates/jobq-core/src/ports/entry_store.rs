//! EntryStore port - キューエントリの正本（source of truth）
//!
//! # 設計原則
//! - 書き込みはすべて revision 付きの条件付き更新（楽観ロック）
//! - dispatch は投入前に lease を取る。lease 中のエントリは他の dispatcher から見えず、
//!   持ち主以外の commit は期限切れまで Leased で拒否される
//! - 一覧は常に (added_time, id) 昇順

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{EntryId, QueueEntry, Status, StoreError};
use crate::observability::QueueCounts;

/// Query predicate over entries. Empty fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntryFilter {
    pub path_equals: Option<String>,
    pub path_contains: Option<String>,
    pub job_id_contains: Option<String>,
    /// Any of these statuses; empty means any status.
    pub statuses: Vec<Status>,
    pub limit: Option<usize>,
}

impl EntryFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn path_equals(mut self, path: impl Into<String>) -> Self {
        self.path_equals = Some(path.into());
        self
    }

    pub fn path_contains(mut self, fragment: impl Into<String>) -> Self {
        self.path_contains = Some(fragment.into());
        self
    }

    pub fn job_id_contains(mut self, fragment: impl Into<String>) -> Self {
        self.job_id_contains = Some(fragment.into());
        self
    }

    pub fn status(mut self, status: Status) -> Self {
        self.statuses.push(status);
        self
    }

    pub fn statuses(mut self, statuses: impl IntoIterator<Item = Status>) -> Self {
        self.statuses.extend(statuses);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// In-process evaluation, mirroring what stores do in their query language.
    pub fn matches(&self, entry: &QueueEntry) -> bool {
        let path_eq = self
            .path_equals
            .as_ref()
            .is_none_or(|p| entry.input_path == *p);
        let path_like = self
            .path_contains
            .as_ref()
            .is_none_or(|p| entry.input_path.contains(p.as_str()));
        let job_like = self.job_id_contains.as_ref().is_none_or(|p| {
            entry
                .external_job_id
                .as_ref()
                .is_some_and(|id| id.contains(p.as_str()))
        });
        let status_ok = self.statuses.is_empty() || self.statuses.contains(&entry.status);
        path_eq && path_like && job_like && status_ok
    }
}

/// A time-bounded reservation of NEW entries for one dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchLease {
    pub holder: String,
    pub now: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Who is writing a commit. A live lease only yields to its own holder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitGuard {
    pub now: DateTime<Utc>,
    pub holder: Option<String>,
}

impl CommitGuard {
    /// An ordinary writer (hold, alter, reset, reconcile).
    pub fn writer(now: DateTime<Utc>) -> Self {
        Self { now, holder: None }
    }

    /// The dispatcher writing back an entry it leased.
    pub fn lease_holder(lease: &DispatchLease, now: DateTime<Utc>) -> Self {
        Self {
            now,
            holder: Some(lease.holder.clone()),
        }
    }

    /// Whether a stored lease still blocks this writer.
    pub fn blocked_by(&self, holder: &str, expires_at: DateTime<Utc>) -> bool {
        expires_at > self.now && self.holder.as_deref() != Some(holder)
    }
}

#[async_trait]
pub trait EntryStore: Send + Sync {
    /// Persist a freshly created entry.
    async fn insert(&self, entry: &QueueEntry) -> Result<QueueEntry, StoreError>;

    async fn get(&self, id: EntryId) -> Result<Option<QueueEntry>, StoreError>;

    /// Matching entries in FIFO order.
    async fn list(&self, filter: &EntryFilter) -> Result<Vec<QueueEntry>, StoreError>;

    async fn count_by_status(&self, filter: &EntryFilter) -> Result<QueueCounts, StoreError>;

    /// Lease up to `limit` NEW entries in FIFO order whose lease is absent or
    /// expired. Returns only the entries this call actually leased, with
    /// their post-lease revision.
    async fn lease_new(
        &self,
        limit: usize,
        lease: &DispatchLease,
    ) -> Result<Vec<QueueEntry>, StoreError>;

    /// Write `entry` if the stored revision still equals `entry.revision`
    /// and no unexpired lease of another holder is on it (`Leased` otherwise).
    /// Clears the lease. Returns the stored entry with its new revision.
    async fn commit(
        &self,
        entry: &QueueEntry,
        guard: &CommitGuard,
    ) -> Result<QueueEntry, StoreError>;
}

#[async_trait]
impl<S: EntryStore + ?Sized> EntryStore for std::sync::Arc<S> {
    async fn insert(&self, entry: &QueueEntry) -> Result<QueueEntry, StoreError> {
        (**self).insert(entry).await
    }

    async fn get(&self, id: EntryId) -> Result<Option<QueueEntry>, StoreError> {
        (**self).get(id).await
    }

    async fn list(&self, filter: &EntryFilter) -> Result<Vec<QueueEntry>, StoreError> {
        (**self).list(filter).await
    }

    async fn count_by_status(&self, filter: &EntryFilter) -> Result<QueueCounts, StoreError> {
        (**self).count_by_status(filter).await
    }

    async fn lease_new(
        &self,
        limit: usize,
        lease: &DispatchLease,
    ) -> Result<Vec<QueueEntry>, StoreError> {
        (**self).lease_new(limit, lease).await
    }

    async fn commit(
        &self,
        entry: &QueueEntry,
        guard: &CommitGuard,
    ) -> Result<QueueEntry, StoreError> {
        (**self).commit(entry, guard).await
    }
}

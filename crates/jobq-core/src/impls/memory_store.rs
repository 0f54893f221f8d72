//! In-memory entry store (tests and dry runs).

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::domain::{EntryId, QueueEntry, Status, StoreError};
use crate::observability::QueueCounts;
use crate::ports::{CommitGuard, DispatchLease, EntryFilter, EntryStore};

#[derive(Debug, Clone)]
struct StoredEntry {
    entry: QueueEntry,
    /// (holder, expires_at)
    lease: Option<(String, DateTime<Utc>)>,
}

impl StoredEntry {
    fn is_leasable(&self, now: DateTime<Utc>) -> bool {
        self.entry.status == Status::New
            && self
                .lease
                .as_ref()
                .is_none_or(|(_, expires_at)| *expires_at <= now)
    }
}

#[derive(Default)]
struct MemoryStoreState {
    records: HashMap<EntryId, StoredEntry>,
}

impl MemoryStoreState {
    fn sorted(&self, filter: &EntryFilter) -> Vec<QueueEntry> {
        let mut entries: Vec<QueueEntry> = self
            .records
            .values()
            .map(|stored| &stored.entry)
            .filter(|entry| filter.matches(entry))
            .cloned()
            .collect();
        entries.sort_by_key(QueueEntry::fifo_key);
        if let Some(limit) = filter.limit {
            entries.truncate(limit);
        }
        entries
    }
}

/// Single source of truth held behind one async mutex; every operation is
/// atomic with respect to the others.
#[derive(Clone, Default)]
pub struct MemoryEntryStore {
    state: Arc<Mutex<MemoryStoreState>>,
}

impl MemoryEntryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current lease holder of an entry, if any (for tests and diagnostics).
    pub async fn lease_holder(&self, id: EntryId) -> Option<String> {
        let state = self.state.lock().await;
        state
            .records
            .get(&id)
            .and_then(|stored| stored.lease.as_ref().map(|(holder, _)| holder.clone()))
    }
}

#[async_trait]
impl EntryStore for MemoryEntryStore {
    async fn insert(&self, entry: &QueueEntry) -> Result<QueueEntry, StoreError> {
        let mut state = self.state.lock().await;
        if state.records.contains_key(&entry.id) {
            return Err(StoreError::Backend(format!("duplicate entry id {}", entry.id)));
        }
        state.records.insert(
            entry.id,
            StoredEntry {
                entry: entry.clone(),
                lease: None,
            },
        );
        Ok(entry.clone())
    }

    async fn get(&self, id: EntryId) -> Result<Option<QueueEntry>, StoreError> {
        let state = self.state.lock().await;
        Ok(state.records.get(&id).map(|stored| stored.entry.clone()))
    }

    async fn list(&self, filter: &EntryFilter) -> Result<Vec<QueueEntry>, StoreError> {
        let state = self.state.lock().await;
        Ok(state.sorted(filter))
    }

    async fn count_by_status(&self, filter: &EntryFilter) -> Result<QueueCounts, StoreError> {
        let state = self.state.lock().await;
        let mut counts = QueueCounts::default();
        for entry in state.sorted(&EntryFilter {
            limit: None,
            ..filter.clone()
        }) {
            counts.add(entry.status, 1);
        }
        Ok(counts)
    }

    async fn lease_new(
        &self,
        limit: usize,
        lease: &DispatchLease,
    ) -> Result<Vec<QueueEntry>, StoreError> {
        let mut state = self.state.lock().await;
        let mut candidates: Vec<(DateTime<Utc>, EntryId)> = state
            .records
            .values()
            .filter(|stored| stored.is_leasable(lease.now))
            .map(|stored| stored.entry.fifo_key())
            .collect();
        candidates.sort();
        candidates.truncate(limit);

        let mut leased = Vec::with_capacity(candidates.len());
        for (_, id) in candidates {
            if let Some(stored) = state.records.get_mut(&id) {
                stored.lease = Some((lease.holder.clone(), lease.expires_at));
                stored.entry.revision += 1;
                leased.push(stored.entry.clone());
            }
        }
        Ok(leased)
    }

    async fn commit(
        &self,
        entry: &QueueEntry,
        guard: &CommitGuard,
    ) -> Result<QueueEntry, StoreError> {
        let mut state = self.state.lock().await;
        let Some(stored) = state.records.get_mut(&entry.id) else {
            return Err(StoreError::Conflict { id: entry.id });
        };
        if stored.entry.revision != entry.revision {
            return Err(StoreError::Conflict { id: entry.id });
        }
        if let Some((holder, expires_at)) = &stored.lease {
            if guard.blocked_by(holder, *expires_at) {
                return Err(StoreError::Leased {
                    id: entry.id,
                    holder: holder.clone(),
                });
            }
        }
        let mut next = entry.clone();
        next.revision += 1;
        stored.entry = next.clone();
        stored.lease = None;
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entry::fixtures::{at, entry};
    use chrono::Duration;

    fn lease(holder: &str, minute: u32) -> DispatchLease {
        DispatchLease {
            holder: holder.to_string(),
            now: at(minute),
            expires_at: at(minute) + Duration::minutes(10),
        }
    }

    fn writer(minute: u32) -> CommitGuard {
        CommitGuard::writer(at(minute))
    }

    #[tokio::test]
    async fn list_is_fifo_ordered() {
        let store = MemoryEntryStore::new();
        store.insert(&entry("/b.nc", 2)).await.unwrap();
        store.insert(&entry("/a.nc", 1)).await.unwrap();
        store.insert(&entry("/c.nc", 3)).await.unwrap();

        let paths: Vec<String> = store
            .list(&EntryFilter::all())
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.input_path)
            .collect();
        assert_eq!(paths, vec!["/a.nc", "/b.nc", "/c.nc"]);
    }

    #[tokio::test]
    async fn commit_rejects_stale_revision() {
        let store = MemoryEntryStore::new();
        let stored = store.insert(&entry("/a.nc", 1)).await.unwrap();

        let mut first = stored.clone();
        first.status = Status::Hold;
        let committed = store.commit(&first, &writer(2)).await.unwrap();
        assert_eq!(committed.revision, stored.revision + 1);

        let mut second = stored.clone();
        second.status = Status::Error;
        let err = store.commit(&second, &writer(3)).await.unwrap_err();
        assert_eq!(err, StoreError::Conflict { id: stored.id });
        assert_eq!(
            store.get(stored.id).await.unwrap().unwrap().status,
            Status::Hold
        );
    }

    #[tokio::test]
    async fn leased_entries_are_invisible_until_expiry() {
        let store = MemoryEntryStore::new();
        store.insert(&entry("/a.nc", 1)).await.unwrap();
        store.insert(&entry("/b.nc", 2)).await.unwrap();

        let first = store.lease_new(1, &lease("one", 5)).await.unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].input_path, "/a.nc");

        let second = store.lease_new(5, &lease("two", 6)).await.unwrap();
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].input_path, "/b.nc");

        // lease from "one" expired at minute 15
        let third = store.lease_new(5, &lease("three", 20)).await.unwrap();
        let paths: Vec<&str> = third.iter().map(|e| e.input_path.as_str()).collect();
        assert_eq!(paths, vec!["/a.nc", "/b.nc"]);
    }

    #[tokio::test]
    async fn holder_commit_releases_lease() {
        let store = MemoryEntryStore::new();
        store.insert(&entry("/a.nc", 1)).await.unwrap();
        let one = lease("one", 5);
        let leased = store.lease_new(1, &one).await.unwrap().remove(0);
        assert_eq!(store.lease_holder(leased.id).await.as_deref(), Some("one"));

        store
            .commit(&leased, &CommitGuard::lease_holder(&one, at(6)))
            .await
            .unwrap();
        assert_eq!(store.lease_holder(leased.id).await, None);
    }

    #[tokio::test]
    async fn other_writers_wait_for_lease_expiry() {
        let store = MemoryEntryStore::new();
        store.insert(&entry("/a.nc", 1)).await.unwrap();
        let leased = store.lease_new(1, &lease("one", 5)).await.unwrap().remove(0);

        let mut held = leased.clone();
        held.status = Status::Hold;
        let err = store.commit(&held, &writer(6)).await.unwrap_err();
        assert_eq!(
            err,
            StoreError::Leased {
                id: leased.id,
                holder: "one".into()
            }
        );
        assert_eq!(store.lease_holder(leased.id).await.as_deref(), Some("one"));

        // lease from "one" expired at minute 15
        let stored = store.commit(&held, &writer(15)).await.unwrap();
        assert_eq!(stored.status, Status::Hold);
        assert_eq!(store.lease_holder(leased.id).await, None);
    }

    #[tokio::test]
    async fn counts_ignore_limit() {
        let store = MemoryEntryStore::new();
        store.insert(&entry("/a.nc", 1)).await.unwrap();
        store.insert(&entry("/b.nc", 2)).await.unwrap();
        let counts = store
            .count_by_status(&EntryFilter::all().limit(1))
            .await
            .unwrap();
        assert_eq!(counts.new, 2);
    }
}

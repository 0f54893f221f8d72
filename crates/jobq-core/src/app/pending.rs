//! Pending mutations - 確認付きのバッチ操作
//!
//! hold / unhold / reset は対象エントリを読み込んで PendingBatch を返すだけで、
//! 何も書き込まない。呼び出し側（CLI）が 1 件ずつ確認し、apply() した分だけ
//! revision 付きで書き込まれる。古くなった 1 件は Conflict、投入中の 1 件は Leased で
//! 失敗し、残りは続行。

use crate::app::QueueApp;
use crate::app::query::EntrySelector;
use crate::app::reset::reset_to;
use crate::domain::{
    DomainEvent, EntryId, Forward, ParamsPatch, QueueEntry, QueueError, Status, apply_forward,
};

/// What a pending mutation will do to its entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change {
    Hold,
    Unhold,
    Reset(Status),
    Alter(ParamsPatch),
}

impl Change {
    /// Short verb phrase for prompts and logs.
    pub fn describe(&self) -> String {
        match self {
            Change::Hold => "hold".to_string(),
            Change::Unhold => "unhold".to_string(),
            Change::Reset(target) => format!("reset to {target}"),
            Change::Alter(_) => "alter parameters".to_string(),
        }
    }

    /// Computes the changed entry without touching the store.
    fn apply_to(&self, entry: &QueueEntry) -> Result<QueueEntry, QueueError> {
        let mut next = entry.clone();
        match self {
            Change::Hold => apply_forward(&mut next, Forward::Hold)?,
            Change::Unhold => apply_forward(&mut next, Forward::Unhold)?,
            Change::Reset(target) => next = reset_to(entry, *target)?,
            Change::Alter(patch) => {
                if !entry.status.is_active() {
                    return Err(QueueError::InvalidArgument(format!(
                        "parameters of a {} entry cannot change",
                        entry.status
                    )));
                }
                next.params = patch.apply_to(&entry.params)?;
            }
        }
        Ok(next)
    }
}

/// One loaded entry plus the change requested for it. Nothing is written
/// until it is passed to [`QueueApp::apply`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingMutation {
    entry: QueueEntry,
    change: Change,
}

impl PendingMutation {
    pub fn entry(&self) -> &QueueEntry {
        &self.entry
    }

    pub fn change(&self) -> &Change {
        &self.change
    }

    /// What the entry would look like after `apply`, as of load time.
    pub fn preview(&self) -> Result<QueueEntry, QueueError> {
        self.change.apply_to(&self.entry)
    }
}

/// Finite batch of pending mutations, yielded oldest entry first.
#[derive(Debug)]
pub struct PendingBatch {
    entries: std::vec::IntoIter<QueueEntry>,
    change: Change,
}

impl PendingBatch {
    fn new(entries: Vec<QueueEntry>, change: Change) -> Self {
        Self {
            entries: entries.into_iter(),
            change,
        }
    }
}

impl Iterator for PendingBatch {
    type Item = PendingMutation;

    fn next(&mut self) -> Option<PendingMutation> {
        self.entries.next().map(|entry| PendingMutation {
            entry,
            change: self.change.clone(),
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.entries.size_hint()
    }
}

impl ExactSizeIterator for PendingBatch {}

/// Result of applying (or declining) one pending mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationOutcome {
    pub entry_id: EntryId,
    pub input_path: String,
    pub change: Change,
    pub result: Result<QueueEntry, QueueError>,
}

impl MutationOutcome {
    pub fn is_failure(&self) -> bool {
        self.result.is_err()
    }
}

impl QueueApp {
    /// NEW entries matched by `selector`, to be put on hold.
    pub async fn hold(&self, selector: &EntrySelector) -> Result<PendingBatch, QueueError> {
        let entries = self.select(selector, &[Status::New]).await?;
        Ok(PendingBatch::new(entries, Change::Hold))
    }

    /// HOLD entries matched by `selector`, to be released back to NEW.
    pub async fn unhold(&self, selector: &EntrySelector) -> Result<PendingBatch, QueueError> {
        let entries = self.select(selector, &[Status::Hold]).await?;
        Ok(PendingBatch::new(entries, Change::Unhold))
    }

    /// Every entry matched by `selector`, to be reset to `target`.
    ///
    /// Entries that cannot reach `target` stay in the batch; applying them
    /// fails with `UnreachableTarget` without touching the others.
    pub async fn reset(
        &self,
        selector: &EntrySelector,
        target: Status,
    ) -> Result<PendingBatch, QueueError> {
        let entries = self.select(selector, &[]).await?;
        Ok(PendingBatch::new(entries, Change::Reset(target)))
    }

    /// Apply one pending mutation with a single revision-checked write.
    pub async fn apply(&self, pending: PendingMutation) -> Result<QueueEntry, QueueError> {
        let PendingMutation { entry, change } = pending;
        if let Change::Reset(target) = change {
            return self.commit_reset(&entry, target).await;
        }

        let next = change.apply_to(&entry)?;
        let stored = self.store.commit(&next, &self.writer()).await?;
        if stored.status != entry.status {
            self.emit(DomainEvent::Transitioned {
                id: stored.id,
                from: entry.status,
                to: stored.status,
            });
        }
        if let Change::Alter(_) = change {
            self.emit(DomainEvent::ParamsAltered { id: stored.id });
        }
        Ok(stored)
    }

    /// Apply every item of `batch`, collecting per-entry results.
    pub async fn apply_all(&self, batch: PendingBatch) -> Vec<MutationOutcome> {
        let mut outcomes = Vec::with_capacity(batch.len());
        for pending in batch {
            let entry_id = pending.entry().id;
            let input_path = pending.entry().input_path.clone();
            let change = pending.change().clone();
            let result = self.apply(pending).await;
            if let Err(e) = &result {
                self.emit(DomainEvent::Skipped {
                    id: entry_id,
                    reason: e.to_string(),
                });
            }
            outcomes.push(MutationOutcome {
                entry_id,
                input_path,
                change,
                result,
            });
        }
        outcomes
    }

    /// Patch the parameters of every NEW or HOLD entry matched by `selector`.
    /// Entries in other statuses are not selected.
    pub async fn alter_params(
        &self,
        selector: &EntrySelector,
        patch: ParamsPatch,
    ) -> Result<Vec<MutationOutcome>, QueueError> {
        if patch.is_empty() {
            return Err(QueueError::InvalidArgument(
                "no parameters to change".into(),
            ));
        }
        let entries = self
            .select(selector, &[Status::New, Status::Hold])
            .await?;
        Ok(self
            .apply_all(PendingBatch::new(entries, Change::Alter(patch)))
            .await)
    }
}

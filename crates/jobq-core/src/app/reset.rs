//! Reset - エントリを以前の状態に巻き戻す
//!
//! # アルゴリズム（一本化）
//! 1. plan_reset: 目標ランクが現在より小さいことを確認し、backward 1 段ずつの経路を計算
//!    （HOLD は出発点としてのみ許可、目標にはできない。
//!    投入されなかったエントリは NEW にしか戻せない）
//! 2. 作業コピーに全段を適用（各段で再検証）。途中で失敗したら何も書かない
//! 3. 最終状態を revision 付きで 1 回だけ書き込む

use serde::Serialize;

use crate::app::QueueApp;
use crate::domain::transition::previous_status;
use crate::domain::{DomainEvent, EntryId, QueueEntry, QueueError, Status, apply_backward};

/// Validated chain of backward steps from `from` down to `target`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResetPlan {
    pub from: Status,
    pub target: Status,
    /// Status after each single step; the last element is `target`.
    pub steps: Vec<Status>,
}

impl ResetPlan {
    /// Apply every step to a copy of `entry`. `entry` itself is never touched.
    pub fn apply(&self, entry: &QueueEntry) -> Result<QueueEntry, QueueError> {
        if entry.status != self.from {
            return Err(QueueError::InvalidTransition {
                from: entry.status,
                to: self.target,
            });
        }
        let mut working = entry.clone();
        for step in &self.steps {
            apply_backward(&mut working, *step)?;
        }
        Ok(working)
    }
}

/// Compute the reset path without touching anything.
pub fn plan_reset(entry: &QueueEntry, target: Status) -> Result<ResetPlan, QueueError> {
    let from = entry.status;
    let unreachable = QueueError::UnreachableTarget { from, target };

    let earlier = target.rank() < from.rank();
    let hold_release = from == Status::Hold && target == Status::New;
    if target == Status::Hold || !(earlier || hold_release) {
        return Err(unreachable);
    }
    // never submitted (e.g. NEW -> ERROR on submit failure): only NEW is reachable
    if target != Status::New && entry.external_job_id.is_none() {
        return Err(unreachable);
    }

    let mut steps = Vec::new();
    let mut current = from;
    while current != target {
        match previous_status(current) {
            Some(prev) if prev.rank() >= target.rank() => {
                steps.push(prev);
                current = prev;
            }
            _ => return Err(unreachable),
        }
    }
    Ok(ResetPlan {
        from,
        target,
        steps,
    })
}

/// Reset `entry` in memory. On error the input is unchanged.
pub fn reset_to(entry: &QueueEntry, target: Status) -> Result<QueueEntry, QueueError> {
    plan_reset(entry, target)?.apply(entry)
}

impl QueueApp {
    /// Reset one entry and persist it with a single revision-checked write.
    pub async fn reset_entry(
        &self,
        id: EntryId,
        target: Status,
    ) -> Result<QueueEntry, QueueError> {
        let entry = self
            .store
            .get(id)
            .await?
            .ok_or_else(|| QueueError::NotFound(id.to_string()))?;
        self.commit_reset(&entry, target).await
    }

    /// Reset an already-loaded entry. Fails with `Conflict` if it changed
    /// since it was loaded.
    pub(crate) async fn commit_reset(
        &self,
        entry: &QueueEntry,
        target: Status,
    ) -> Result<QueueEntry, QueueError> {
        let next = reset_to(entry, target)?;
        let stored = self.store.commit(&next, &self.writer()).await?;
        self.emit(DomainEvent::Transitioned {
            id: stored.id,
            from: entry.status,
            to: stored.status,
        });
        Ok(stored)
    }
}

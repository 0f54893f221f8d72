//! Dispatch - NEW エントリを外部スケジューラへ投入する
//!
//! # フロー
//! 1. EntryStore::lease_new() で最大 N 件を FIFO で予約（他の dispatcher から見えなくなる）
//! 2. ScriptRenderer でスクリプト生成
//! 3. Submitter を submit_timeout 付きで呼ぶ
//! 4. 成功: NEW → SUBMITTED / 失敗・タイムアウト: NEW → ERROR（理由を記録）
//! 5. lease の持ち主として commit し、lease を解放
//!    （lease が有効な間、他の書き込みは StoreError::Leased で拒否される）
//!
//! 1 件の失敗はバッチを止めない。

use serde::Serialize;

use crate::app::QueueApp;
use crate::domain::{
    DomainEvent, EntryId, Forward, QueueEntry, QueueError, Status, apply_forward,
};
use crate::ports::{CommitGuard, DispatchLease, SubmitError};

/// Result of dispatching one entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DispatchOutcome {
    pub entry_id: EntryId,
    pub input_path: String,
    /// Status after the attempt (SUBMITTED, ERROR, or NEW if nothing was written).
    pub status: Status,
    pub external_job_id: Option<String>,
    pub error: Option<String>,
}

impl DispatchOutcome {
    pub fn is_failure(&self) -> bool {
        self.error.is_some()
    }
}

impl QueueApp {
    /// Submit up to `max_count` NEW entries, oldest first.
    ///
    /// Returns an error only when the batch cannot be selected; per-entry
    /// failures are in the outcomes.
    pub async fn dispatch(&self, max_count: usize) -> Result<Vec<DispatchOutcome>, QueueError> {
        if max_count == 0 {
            return Ok(Vec::new());
        }

        let now = self.clock.now();
        let lease = DispatchLease {
            holder: self.dispatch.holder.clone(),
            now,
            expires_at: now + self.dispatch.lease_ttl(),
        };
        let leased = self.store.lease_new(max_count, &lease).await?;
        tracing::debug!(
            holder = %lease.holder,
            requested = max_count,
            leased = leased.len(),
            "leased entries for dispatch"
        );

        let mut outcomes = Vec::with_capacity(leased.len());
        for entry in leased {
            outcomes.push(self.dispatch_one(entry, &lease).await);
        }
        Ok(outcomes)
    }

    async fn dispatch_one(&self, entry: QueueEntry, lease: &DispatchLease) -> DispatchOutcome {
        let script = self.renderer.render(&entry, self.dispatch.test_job);
        let submitted = match tokio::time::timeout(
            self.dispatch.submit_timeout(),
            self.submitter.submit(&entry, &script),
        )
        .await
        {
            Ok(result) => result,
            Err(_elapsed) => Err(SubmitError::Timeout {
                seconds: self.dispatch.submit_timeout_secs,
            }),
        };

        let transition = match &submitted {
            Ok(job_id) => Forward::Submit {
                external_job_id: job_id.clone(),
                at: self.clock.now(),
            },
            Err(e) => Forward::SubmitFailed {
                reason: e.to_string(),
            },
        };

        let mut next = entry.clone();
        if let Err(e) = apply_forward(&mut next, transition) {
            return failed_outcome(&entry, e.to_string());
        }

        let guard = CommitGuard::lease_holder(lease, self.clock.now());
        match self.store.commit(&next, &guard).await {
            Ok(stored) => {
                match &submitted {
                    Ok(job_id) => self.emit(DomainEvent::Submitted {
                        id: stored.id,
                        external_job_id: job_id.clone(),
                    }),
                    Err(e) => self.emit(DomainEvent::SubmissionFailed {
                        id: stored.id,
                        reason: e.to_string(),
                    }),
                }
                self.emit(DomainEvent::Transitioned {
                    id: stored.id,
                    from: entry.status,
                    to: stored.status,
                });
                DispatchOutcome {
                    entry_id: stored.id,
                    input_path: stored.input_path,
                    status: stored.status,
                    external_job_id: stored.external_job_id,
                    error: submitted.err().map(|e| e.to_string()),
                }
            }
            Err(store_err) => {
                let error = store_err.to_string();
                match submitted {
                    Ok(job_id) => {
                        self.emit(DomainEvent::SubmittedButUnrecorded {
                            id: entry.id,
                            external_job_id: job_id.clone(),
                            error: error.clone(),
                        });
                        DispatchOutcome {
                            external_job_id: Some(job_id),
                            ..failed_outcome(&entry, error)
                        }
                    }
                    Err(_) => {
                        self.emit(DomainEvent::CommitFailed {
                            id: entry.id,
                            error: error.clone(),
                        });
                        failed_outcome(&entry, error)
                    }
                }
            }
        }
    }
}

fn failed_outcome(entry: &QueueEntry, error: String) -> DispatchOutcome {
    DispatchOutcome {
        entry_id: entry.id,
        input_path: entry.input_path.clone(),
        status: entry.status,
        external_job_id: None,
        error: Some(error),
    }
}

//! Reconcile - スケジューラの報告をエントリ状態に反映する
//!
//! - 開始時刻あり & SUBMITTED → RUNNING
//! - 完了時刻あり & RUNNING → SUCCESS（ExitStatus ルーティングでは非 0 で ERROR）
//! - 両方あれば 1 回の書き込みで 2 段進める
//! - 既に進んでいるエントリは Unchanged（冪等）

use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::app::QueueApp;
use crate::app::config::CompletionRouting;
use crate::domain::{
    DomainEvent, EntryId, Forward, QueueEntry, QueueError, Status, StatusReport, apply_forward,
};
use crate::ports::EntryFilter;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReconcileChange {
    Applied { from: Status, to: Status },
    Unchanged { status: Status },
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReconcileOutcome {
    pub entry_id: EntryId,
    pub external_job_id: String,
    pub change: ReconcileChange,
}

impl ReconcileOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self.change, ReconcileChange::Failed { .. })
    }
}

/// Pure transition step: what `entry` becomes after `report`.
pub fn advance(
    entry: &QueueEntry,
    report: &StatusReport,
    routing: CompletionRouting,
) -> Result<QueueEntry, QueueError> {
    let mut next = entry.clone();
    if next.status == Status::Submitted {
        if let Some(at) = report.started_at {
            apply_forward(&mut next, Forward::Start { at })?;
        }
    }
    if next.status == Status::Running {
        if let Some(at) = report.completed_at {
            let failed = routing == CompletionRouting::ExitStatus
                && report.exit_status.is_some_and(|code| code != 0);
            let message = report.message.clone();
            let transition = if failed {
                Forward::Fail { at, message }
            } else {
                Forward::Complete { at, message }
            };
            apply_forward(&mut next, transition)?;
        }
    }
    Ok(next)
}

/// Fold reports per job id, keeping the first report's known fields.
fn merge_reports(reports: Vec<StatusReport>) -> HashMap<String, StatusReport> {
    let mut merged: HashMap<String, StatusReport> = HashMap::new();
    for report in reports {
        match merged.get_mut(&report.external_job_id) {
            Some(existing) => existing.merge(report),
            None => {
                merged.insert(report.external_job_id.clone(), report);
            }
        }
    }
    merged
}

impl QueueApp {
    /// Apply scheduler reports to SUBMITTED/RUNNING entries.
    ///
    /// Outcomes are returned for every entry a report refers to. Reports that
    /// match no entry are only logged.
    pub async fn reconcile(
        &self,
        reports: Vec<StatusReport>,
    ) -> Result<Vec<ReconcileOutcome>, QueueError> {
        let pending = merge_reports(reports);
        if pending.is_empty() {
            return Ok(Vec::new());
        }

        let in_flight = self
            .store
            .list(&EntryFilter::all().statuses([Status::Submitted, Status::Running]))
            .await?;

        // a force-added duplicate can share its job id with another entry
        let mut matched = HashSet::new();
        let mut outcomes = Vec::new();
        for entry in in_flight {
            let Some(job_id) = entry.external_job_id.clone() else {
                continue;
            };
            let Some(report) = pending.get(&job_id) else {
                continue;
            };
            matched.insert(job_id.clone());
            outcomes.push(self.reconcile_one(entry, job_id, report).await);
        }

        // Reports for entries that already moved on are not errors.
        let mut leftover: Vec<String> = pending
            .into_keys()
            .filter(|job_id| !matched.contains(job_id))
            .collect();
        leftover.sort();
        for job_id in leftover {
            let known: Vec<QueueEntry> = self
                .store
                .list(&EntryFilter::all().job_id_contains(&job_id))
                .await?
                .into_iter()
                .filter(|e| e.external_job_id.as_deref() == Some(job_id.as_str()))
                .collect();
            if known.is_empty() {
                self.emit(DomainEvent::ReportUnmatched {
                    external_job_id: job_id,
                });
                continue;
            }
            for entry in known {
                outcomes.push(ReconcileOutcome {
                    entry_id: entry.id,
                    external_job_id: job_id.clone(),
                    change: ReconcileChange::Unchanged {
                        status: entry.status,
                    },
                });
            }
        }
        Ok(outcomes)
    }

    async fn reconcile_one(
        &self,
        entry: QueueEntry,
        external_job_id: String,
        report: &StatusReport,
    ) -> ReconcileOutcome {
        let outcome = |change| ReconcileOutcome {
            entry_id: entry.id,
            external_job_id: external_job_id.clone(),
            change,
        };

        let next = match advance(&entry, report, self.reconcile.completion) {
            Ok(next) => next,
            Err(e) => return outcome(ReconcileChange::Failed { error: e.to_string() }),
        };
        if next.status == entry.status {
            return outcome(ReconcileChange::Unchanged {
                status: entry.status,
            });
        }

        match self.store.commit(&next, &self.writer()).await {
            Ok(stored) => {
                self.emit(DomainEvent::Transitioned {
                    id: stored.id,
                    from: entry.status,
                    to: stored.status,
                });
                outcome(ReconcileChange::Applied {
                    from: entry.status,
                    to: stored.status,
                })
            }
            Err(e) => {
                self.emit(DomainEvent::CommitFailed {
                    id: entry.id,
                    error: e.to_string(),
                });
                outcome(ReconcileChange::Failed { error: e.to_string() })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::testing::{FakeSubmitter, Harness};
    use crate::app::{DispatchConfig, ReconcileConfig};
    use crate::domain::entry::fixtures::at;
    use crate::domain::{ExecParams, ExternalSubmission, NewEntry};
    use crate::ports::EntryStore;

    /// Harness with one entry submitted as `1.server`.
    async fn submitted(h: &Harness) -> QueueEntry {
        let entry = h.add("/in/a.nc", 1).await;
        h.app.dispatch(1).await.unwrap();
        let stored = h.store.get(entry.id).await.unwrap().unwrap();
        assert_eq!(stored.external_job_id.as_deref(), Some("1.server"));
        stored
    }

    #[tokio::test]
    async fn start_report_moves_to_running() {
        let h = Harness::new();
        let entry = submitted(&h).await;

        let outcomes = h
            .app
            .reconcile(vec![StatusReport::new("1.server").started(at(10))])
            .await
            .unwrap();
        assert_eq!(
            outcomes,
            vec![ReconcileOutcome {
                entry_id: entry.id,
                external_job_id: "1.server".into(),
                change: ReconcileChange::Applied {
                    from: Status::Submitted,
                    to: Status::Running
                },
            }]
        );
        let stored = h.store.get(entry.id).await.unwrap().unwrap();
        assert_eq!(stored.started_time, Some(at(10)));
    }

    #[tokio::test]
    async fn start_and_completion_advance_two_steps() {
        let h = Harness::new();
        let entry = submitted(&h).await;

        h.app
            .reconcile(vec![
                StatusReport::new("1.server")
                    .started(at(10))
                    .completed(at(20))
                    .with_message("done"),
            ])
            .await
            .unwrap();
        let stored = h.store.get(entry.id).await.unwrap().unwrap();
        assert_eq!(stored.status, Status::Success);
        assert_eq!(stored.started_time, Some(at(10)));
        assert_eq!(stored.completed_time, Some(at(20)));
        assert_eq!(stored.completion_message.as_deref(), Some("done"));
    }

    #[tokio::test]
    async fn completion_without_start_on_submitted_is_noop() {
        let h = Harness::new();
        let entry = submitted(&h).await;

        let outcomes = h
            .app
            .reconcile(vec![StatusReport::new("1.server").completed(at(20))])
            .await
            .unwrap();
        assert_eq!(
            outcomes[0].change,
            ReconcileChange::Unchanged {
                status: Status::Submitted
            }
        );
        assert_eq!(h.store.get(entry.id).await.unwrap().unwrap(), entry);
    }

    #[tokio::test]
    async fn reconcile_is_idempotent() {
        let h = Harness::new();
        let entry = submitted(&h).await;
        let report = StatusReport::new("1.server")
            .started(at(10))
            .completed(at(20));

        h.app.reconcile(vec![report.clone()]).await.unwrap();
        let after_first = h.store.get(entry.id).await.unwrap().unwrap();

        let outcomes = h.app.reconcile(vec![report]).await.unwrap();
        assert_eq!(
            outcomes[0].change,
            ReconcileChange::Unchanged {
                status: Status::Success
            }
        );
        assert_eq!(h.store.get(entry.id).await.unwrap().unwrap(), after_first);
    }

    #[tokio::test]
    async fn split_reports_for_one_job_are_merged() {
        let h = Harness::new();
        let entry = submitted(&h).await;
        h.app
            .reconcile(vec![
                StatusReport::new("1.server").completed(at(20)),
                StatusReport::new("1.server").started(at(10)),
            ])
            .await
            .unwrap();
        assert_eq!(
            h.store.get(entry.id).await.unwrap().unwrap().status,
            Status::Success
        );
    }

    #[tokio::test]
    async fn report_reaches_every_entry_sharing_the_job_id() {
        let h = Harness::new();
        let mut ids = Vec::new();
        for path in ["/in/a.nc", "/in/a_copy.nc"] {
            let request = NewEntry::new(path, ExecParams::new("/opt/venv", "/out"))
                .submitted_externally(ExternalSubmission {
                    submitted_time: at(2),
                    external_job_id: "7.server".into(),
                });
            let outcome = h.app.register(request, true).await.unwrap();
            ids.push(outcome.into_entry().id);
        }

        let outcomes = h
            .app
            .reconcile(vec![StatusReport::new("7.server").started(at(10))])
            .await
            .unwrap();
        let mut reached: Vec<EntryId> = outcomes.iter().map(|o| o.entry_id).collect();
        reached.sort();
        ids.sort();
        assert_eq!(reached, ids);
        assert!(outcomes.iter().all(|o| o.change
            == ReconcileChange::Applied {
                from: Status::Submitted,
                to: Status::Running
            }));
        for id in &ids {
            assert_eq!(
                h.store.get(*id).await.unwrap().unwrap().started_time,
                Some(at(10))
            );
        }
        assert!(
            !h.events
                .events()
                .iter()
                .any(|e| matches!(e, DomainEvent::ReportUnmatched { .. }))
        );
    }

    #[tokio::test]
    async fn unknown_job_is_logged_not_failed() {
        let h = Harness::new();
        submitted(&h).await;
        let outcomes = h
            .app
            .reconcile(vec![StatusReport::new("999.server").started(at(3))])
            .await
            .unwrap();
        assert!(outcomes.is_empty());
        assert!(h.events.events().contains(&DomainEvent::ReportUnmatched {
            external_job_id: "999.server".into()
        }));
    }

    #[tokio::test]
    async fn exit_status_routing_sends_failures_to_error() {
        let h = Harness::with(
            FakeSubmitter::default(),
            DispatchConfig::default(),
            ReconcileConfig {
                completion: CompletionRouting::ExitStatus,
            },
        );
        let entry = submitted(&h).await;
        h.app
            .reconcile(vec![
                StatusReport::new("1.server")
                    .started(at(10))
                    .completed(at(20))
                    .with_exit_status(271),
            ])
            .await
            .unwrap();
        let stored = h.store.get(entry.id).await.unwrap().unwrap();
        assert_eq!(stored.status, Status::Error);
        assert_eq!(stored.completed_time, Some(at(20)));
    }

    #[tokio::test]
    async fn default_routing_ignores_exit_status() {
        let h = Harness::new();
        let entry = submitted(&h).await;
        h.app
            .reconcile(vec![
                StatusReport::new("1.server")
                    .started(at(10))
                    .completed(at(20))
                    .with_exit_status(1),
            ])
            .await
            .unwrap();
        assert_eq!(
            h.store.get(entry.id).await.unwrap().unwrap().status,
            Status::Success
        );
    }
}

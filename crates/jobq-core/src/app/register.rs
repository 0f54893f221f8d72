//! Registration of new work.

use serde::Serialize;

use crate::app::QueueApp;
use crate::domain::{DomainEvent, NewEntry, QueueEntry, QueueError, Status};
use crate::ports::EntryFilter;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RegisterOutcome {
    Added(QueueEntry),
    /// An active entry for the same path already exists.
    Skipped { existing: QueueEntry },
}

impl RegisterOutcome {
    pub fn is_added(&self) -> bool {
        matches!(self, Self::Added(_))
    }

    /// The new entry, or the one that blocked registration.
    pub fn into_entry(self) -> QueueEntry {
        match self {
            Self::Added(entry) | Self::Skipped { existing: entry } => entry,
        }
    }
}

impl QueueApp {
    /// Add `request` to the queue.
    ///
    /// Without `force`, a NEW or HOLD entry for the same path makes this a
    /// no-op that returns `Skipped`. With `force` the check is bypassed.
    pub async fn register(
        &self,
        request: NewEntry,
        force: bool,
    ) -> Result<RegisterOutcome, QueueError> {
        if request.input_path.trim().is_empty() {
            return Err(QueueError::InvalidArgument("input path is empty".into()));
        }
        if let Some(external) = &request.external {
            if external.external_job_id.trim().is_empty() {
                return Err(QueueError::InvalidArgument(
                    "external job id is empty".into(),
                ));
            }
        }
        request.params.validate()?;

        let active = self
            .store
            .list(
                &EntryFilter::all()
                    .path_equals(&request.input_path)
                    .statuses([Status::New, Status::Hold]),
            )
            .await?;

        match active.first() {
            Some(existing) if !force => {
                self.emit(DomainEvent::RegistrationSkipped {
                    input_path: request.input_path,
                    existing: existing.id,
                });
                return Ok(RegisterOutcome::Skipped {
                    existing: existing.clone(),
                });
            }
            Some(_) => self.emit(DomainEvent::ForcedDuplicate {
                input_path: request.input_path.clone(),
                active_count: active.len(),
            }),
            None => {}
        }

        let entry = QueueEntry::create(self.ids.generate_entry_id(), request, self.clock.now());
        let stored = self.store.insert(&entry).await?;
        self.emit(DomainEvent::Registered {
            id: stored.id,
            input_path: stored.input_path.clone(),
            status: stored.status,
        });
        Ok(RegisterOutcome::Added(stored))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::testing::Harness;
    use crate::domain::entry::fixtures::at;
    use crate::domain::{ExecParams, ExternalSubmission};
    use crate::ports::EntryStore;

    fn request(path: &str) -> NewEntry {
        NewEntry::new(path, ExecParams::new("/opt/venv", "/out"))
    }

    #[tokio::test]
    async fn new_entry_starts_new_with_clock_time() {
        let h = Harness::new();
        h.clock.set(at(7));
        let outcome = h.app.register(request("/in/a.nc"), false).await.unwrap();
        assert!(outcome.is_added());
        let entry = outcome.into_entry();
        assert_eq!(entry.status, Status::New);
        assert_eq!(entry.added_time, at(7));
        assert_eq!(h.store.get(entry.id).await.unwrap(), Some(entry));
    }

    #[tokio::test]
    async fn duplicate_active_path_is_skipped() {
        let h = Harness::new();
        let first = h.add("/in/a.nc", 1).await;
        let outcome = h.app.register(request("/in/a.nc"), false).await.unwrap();
        assert_eq!(
            outcome,
            RegisterOutcome::Skipped {
                existing: first.clone()
            }
        );
        assert_eq!(h.store.list(&EntryFilter::all()).await.unwrap().len(), 1);
        assert!(h.events.events().contains(&DomainEvent::RegistrationSkipped {
            input_path: "/in/a.nc".into(),
            existing: first.id,
        }));
    }

    #[tokio::test]
    async fn force_adds_duplicate_and_warns() {
        let h = Harness::new();
        h.add("/in/a.nc", 1).await;
        let outcome = h.app.register(request("/in/a.nc"), true).await.unwrap();
        assert!(outcome.is_added());
        assert_eq!(h.store.list(&EntryFilter::all()).await.unwrap().len(), 2);
        assert!(h.events.events().contains(&DomainEvent::ForcedDuplicate {
            input_path: "/in/a.nc".into(),
            active_count: 1,
        }));
    }

    #[tokio::test]
    async fn finished_entries_do_not_block_registration() {
        let h = Harness::new();
        let first = h.add("/in/a.nc", 1).await;
        let mut done = first.clone();
        done.status = Status::Success;
        h.store.commit(&done, &h.app.writer()).await.unwrap();

        let outcome = h.app.register(request("/in/a.nc"), false).await.unwrap();
        assert!(outcome.is_added());
    }

    #[tokio::test]
    async fn external_submission_registers_submitted() {
        let h = Harness::new();
        let submission = ExternalSubmission::from_parts(Some(at(2)), Some("99.pbs".into()))
            .unwrap()
            .unwrap();
        let entry = h
            .app
            .register(request("/in/b.nc").submitted_externally(submission), false)
            .await
            .unwrap()
            .into_entry();
        assert_eq!(entry.status, Status::Submitted);
        assert_eq!(entry.external_job_id.as_deref(), Some("99.pbs"));
        assert_eq!(entry.submitted_time, Some(at(2)));
    }

    #[tokio::test]
    async fn invalid_params_are_rejected() {
        let h = Harness::new();
        let mut bad = request("/in/a.nc");
        bad.params.walltime = "forever".into();
        let err = h.app.register(bad, false).await.unwrap_err();
        assert!(matches!(err, QueueError::InvalidArgument(_)));
        assert!(h.store.list(&EntryFilter::all()).await.unwrap().is_empty());
    }
}

//! EventSink that forwards domain events to `tracing`.

use crate::domain::DomainEvent;
use crate::ports::EventSink;

#[derive(Debug, Clone, Copy, Default)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn emit(&self, event: DomainEvent) {
        match event {
            DomainEvent::Registered {
                id,
                input_path,
                status,
            } => tracing::info!(%id, %input_path, %status, "added queue entry"),
            DomainEvent::RegistrationSkipped {
                input_path,
                existing,
            } => tracing::info!(%input_path, %existing, "entry already in queue; skipped"),
            DomainEvent::ForcedDuplicate {
                input_path,
                active_count,
            } => tracing::warn!(
                %input_path,
                active_count,
                "forced addition of an entry that is already queued"
            ),
            DomainEvent::Transitioned { id, from, to } => {
                tracing::debug!(%id, %from, %to, "status changed")
            }
            DomainEvent::Submitted {
                id,
                external_job_id,
            } => tracing::info!(%id, %external_job_id, "submitted job"),
            DomainEvent::SubmissionFailed { id, reason } => {
                tracing::error!(%id, %reason, "submission failed")
            }
            DomainEvent::CommitFailed { id, error } => {
                tracing::warn!(%id, %error, "could not record change")
            }
            DomainEvent::SubmittedButUnrecorded {
                id,
                external_job_id,
                error,
            } => tracing::error!(
                %id,
                %external_job_id,
                %error,
                "job was submitted but the queue entry was not updated"
            ),
            DomainEvent::ReportUnmatched { external_job_id } => {
                tracing::debug!(%external_job_id, "no queue entry for reported job")
            }
            DomainEvent::ParamsAltered { id } => tracing::info!(%id, "parameters updated"),
            DomainEvent::Skipped { id, reason } => tracing::debug!(%id, %reason, "skipped"),
        }
    }
}

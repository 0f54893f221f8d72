//! Events - ドメインイベント
//!
//! 操作は EventSink にイベントを渡すだけで、ログの出し方は知らない。

use serde::Serialize;

use super::ids::EntryId;
use super::status::Status;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DomainEvent {
    Registered {
        id: EntryId,
        input_path: String,
        status: Status,
    },
    /// An active entry already exists for the path.
    RegistrationSkipped {
        input_path: String,
        existing: EntryId,
    },
    /// `force` bypassed the uniqueness check.
    ForcedDuplicate {
        input_path: String,
        active_count: usize,
    },
    Transitioned {
        id: EntryId,
        from: Status,
        to: Status,
    },
    Submitted {
        id: EntryId,
        external_job_id: String,
    },
    SubmissionFailed {
        id: EntryId,
        reason: String,
    },
    /// A write for one entry failed; the batch continued.
    CommitFailed {
        id: EntryId,
        error: String,
    },
    /// The scheduler accepted the job but recording it failed.
    SubmittedButUnrecorded {
        id: EntryId,
        external_job_id: String,
        error: String,
    },
    ReportUnmatched {
        external_job_id: String,
    },
    ParamsAltered {
        id: EntryId,
    },
    Skipped {
        id: EntryId,
        reason: String,
    },
}

//! Domain model (IDs, statuses, entries, transitions, reports, events, errors).

pub mod entry;
pub mod errors;
pub mod events;
pub mod ids;
pub mod report;
pub mod status;
pub mod transition;

pub use self::entry::{
    ExecParams, ExternalSubmission, NewEntry, ParamsPatch, QueueEntry, validate_walltime,
};
pub use self::errors::{QueueError, StoreError};
pub use self::events::DomainEvent;
pub use self::ids::{EntryId, ParseIdError};
pub use self::report::StatusReport;
pub use self::status::{ParseStatusError, Status};
pub use self::transition::{Forward, apply_backward, apply_forward, can_transition};

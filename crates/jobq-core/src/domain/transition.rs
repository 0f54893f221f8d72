//! Status state machine - 状態遷移の正本
//!
//! 前進遷移（forward）と巻き戻し（backward）の表をここだけで定義する。
//! apply_* は適用時に必ず前提条件を再検証する（事前チェックを信用しない）。
//! 失敗した場合、エントリは一切変更されない。

use chrono::{DateTime, Utc};

use super::entry::QueueEntry;
use super::errors::QueueError;
use super::status::Status;

/// Legal forward transitions.
pub const FORWARD: [(Status, Status); 7] = [
    (Status::New, Status::Hold),
    (Status::Hold, Status::New),
    (Status::New, Status::Submitted),
    (Status::Submitted, Status::Running),
    (Status::Running, Status::Success),
    (Status::Running, Status::Error),
    (Status::New, Status::Error),
];

/// Legal backward (reset) transitions. Each undoes the fields of a forward step.
pub const BACKWARD: [(Status, Status); 5] = [
    (Status::Submitted, Status::New),
    (Status::Hold, Status::New),
    (Status::Running, Status::Submitted),
    (Status::Success, Status::Running),
    (Status::Error, Status::Running),
];

/// A forward transition together with the data it records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Forward {
    Hold,
    Unhold,
    Submit {
        external_job_id: String,
        at: DateTime<Utc>,
    },
    Start {
        at: DateTime<Utc>,
    },
    Complete {
        at: DateTime<Utc>,
        message: Option<String>,
    },
    /// Execution failure reported by the scheduler.
    Fail {
        at: DateTime<Utc>,
        message: Option<String>,
    },
    /// Submission attempt failed; only the reason is kept.
    SubmitFailed {
        reason: String,
    },
}

impl Forward {
    /// Status the entry must be in.
    pub fn source(&self) -> Status {
        match self {
            Forward::Hold | Forward::Submit { .. } | Forward::SubmitFailed { .. } => Status::New,
            Forward::Unhold => Status::Hold,
            Forward::Start { .. } => Status::Submitted,
            Forward::Complete { .. } | Forward::Fail { .. } => Status::Running,
        }
    }

    pub fn target(&self) -> Status {
        match self {
            Forward::Hold => Status::Hold,
            Forward::Unhold => Status::New,
            Forward::Submit { .. } => Status::Submitted,
            Forward::Start { .. } => Status::Running,
            Forward::Complete { .. } => Status::Success,
            Forward::Fail { .. } | Forward::SubmitFailed { .. } => Status::Error,
        }
    }
}

pub fn is_forward(from: Status, to: Status) -> bool {
    FORWARD.contains(&(from, to))
}

pub fn is_backward(from: Status, to: Status) -> bool {
    BACKWARD.contains(&(from, to))
}

/// True for every pair in either table, false for everything else.
pub fn can_transition(from: Status, to: Status) -> bool {
    is_forward(from, to) || is_backward(from, to)
}

/// The single backward step out of `status`, if one exists.
pub fn previous_status(status: Status) -> Option<Status> {
    BACKWARD
        .iter()
        .find(|(from, _)| *from == status)
        .map(|(_, to)| *to)
}

/// Apply a forward transition, re-validating the entry's current status.
pub fn apply_forward(entry: &mut QueueEntry, transition: Forward) -> Result<(), QueueError> {
    let (from, to) = (entry.status, transition.target());
    if from != transition.source() || !is_forward(from, to) {
        return Err(QueueError::InvalidTransition { from, to });
    }

    match transition {
        Forward::Hold | Forward::Unhold => {}
        Forward::Submit {
            external_job_id,
            at,
        } => {
            entry.submitted_time = Some(at);
            entry.external_job_id = Some(external_job_id);
        }
        Forward::Start { at } => {
            entry.started_time = Some(at);
        }
        Forward::Complete { at, message } | Forward::Fail { at, message } => {
            entry.completed_time = Some(at);
            entry.completion_message = message;
        }
        Forward::SubmitFailed { reason } => {
            entry.completion_message = Some(reason);
        }
    }
    entry.status = to;
    Ok(())
}

/// Apply one backward step to `to`, clearing exactly what the matching
/// forward step set.
pub fn apply_backward(entry: &mut QueueEntry, to: Status) -> Result<(), QueueError> {
    let from = entry.status;
    if !is_backward(from, to) {
        return Err(QueueError::InvalidTransition { from, to });
    }

    match to {
        Status::New => {
            entry.submitted_time = None;
            entry.external_job_id = None;
        }
        Status::Submitted => {
            entry.started_time = None;
        }
        Status::Running => {
            entry.completed_time = None;
            entry.completion_message = None;
        }
        // BACKWARD has no other targets
        Status::Hold | Status::Success | Status::Error => {
            return Err(QueueError::InvalidTransition { from, to });
        }
    }
    entry.status = to;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entry::fixtures::{at, entry};
    use proptest::prelude::*;
    use rstest::rstest;

    fn forward_for(from: Status, to: Status) -> Forward {
        match (from, to) {
            (Status::New, Status::Hold) => Forward::Hold,
            (Status::Hold, Status::New) => Forward::Unhold,
            (Status::New, Status::Submitted) => Forward::Submit {
                external_job_id: "123.server".into(),
                at: at(1),
            },
            (Status::Submitted, Status::Running) => Forward::Start { at: at(2) },
            (Status::Running, Status::Success) => Forward::Complete {
                at: at(3),
                message: Some("done".into()),
            },
            (Status::Running, Status::Error) => Forward::Fail {
                at: at(3),
                message: Some("exit 1".into()),
            },
            (Status::New, Status::Error) => Forward::SubmitFailed {
                reason: "qsub: not found".into(),
            },
            _ => unreachable!("not a forward pair"),
        }
    }

    /// An entry that legitimately reached `status` by walking forward.
    fn entry_in(status: Status) -> QueueEntry {
        let path: &[(Status, Status)] = match status {
            Status::New => &[],
            Status::Hold => &[(Status::New, Status::Hold)],
            Status::Submitted => &[(Status::New, Status::Submitted)],
            Status::Running => &[
                (Status::New, Status::Submitted),
                (Status::Submitted, Status::Running),
            ],
            Status::Success => &[
                (Status::New, Status::Submitted),
                (Status::Submitted, Status::Running),
                (Status::Running, Status::Success),
            ],
            Status::Error => &[
                (Status::New, Status::Submitted),
                (Status::Submitted, Status::Running),
                (Status::Running, Status::Error),
            ],
        };
        let mut e = entry("/in/file.nc", 0);
        for (from, to) in path {
            apply_forward(&mut e, forward_for(*from, *to)).unwrap();
        }
        e
    }

    #[test]
    fn submit_sets_time_and_job_id() {
        let mut e = entry_in(Status::New);
        apply_forward(&mut e, forward_for(Status::New, Status::Submitted)).unwrap();
        assert_eq!(e.status, Status::Submitted);
        assert_eq!(e.external_job_id.as_deref(), Some("123.server"));
        assert_eq!(e.submitted_time, Some(at(1)));
    }

    #[test]
    fn submit_failure_records_reason_without_timestamps() {
        let mut e = entry_in(Status::New);
        apply_forward(&mut e, forward_for(Status::New, Status::Error)).unwrap();
        assert_eq!(e.status, Status::Error);
        assert_eq!(e.completion_message.as_deref(), Some("qsub: not found"));
        assert_eq!(e.completed_time, None);
        assert_eq!(e.submitted_time, None);
    }

    #[rstest]
    #[case::start_from_new(Status::New, Forward::Start { at: at(1) })]
    #[case::hold_from_submitted(Status::Submitted, Forward::Hold)]
    #[case::unhold_from_new(Status::New, Forward::Unhold)]
    #[case::complete_from_submitted(Status::Submitted, Forward::Complete { at: at(1), message: None })]
    #[case::submit_twice(Status::Submitted, Forward::Submit { external_job_id: "x".into(), at: at(1) })]
    fn forward_rejects_wrong_source(#[case] status: Status, #[case] transition: Forward) {
        let mut e = entry_in(status);
        let before = e.clone();
        let err = apply_forward(&mut e, transition).unwrap_err();
        assert!(matches!(err, QueueError::InvalidTransition { from, .. } if from == status));
        assert_eq!(e, before);
    }

    #[test]
    fn previous_status_follows_backward_table() {
        assert_eq!(previous_status(Status::Success), Some(Status::Running));
        assert_eq!(previous_status(Status::Error), Some(Status::Running));
        assert_eq!(previous_status(Status::Running), Some(Status::Submitted));
        assert_eq!(previous_status(Status::Submitted), Some(Status::New));
        assert_eq!(previous_status(Status::Hold), Some(Status::New));
        assert_eq!(previous_status(Status::New), None);
    }

    fn any_status() -> impl Strategy<Value = Status> {
        proptest::sample::select(Status::ALL.to_vec())
    }

    proptest! {
        #[test]
        fn unlisted_pairs_are_rejected(from in any_status(), to in any_status()) {
            let listed = FORWARD.contains(&(from, to)) || BACKWARD.contains(&(from, to));
            prop_assert_eq!(can_transition(from, to), listed);

            if !is_backward(from, to) {
                let mut e = entry_in(from);
                let before = e.clone();
                let err = apply_backward(&mut e, to);
                let is_invalid = matches!(err, Err(QueueError::InvalidTransition { .. }));
                prop_assert!(is_invalid);
                prop_assert_eq!(e, before);
            }
        }

        #[test]
        fn forward_then_backward_restores_fields(idx in 0usize..FORWARD.len()) {
            let (from, to) = FORWARD[idx];
            prop_assume!(is_backward(to, from));

            let original = entry_in(from);
            let mut e = original.clone();
            apply_forward(&mut e, forward_for(from, to)).unwrap();
            prop_assert_eq!(e.status, to);
            apply_backward(&mut e, from).unwrap();
            prop_assert_eq!(e, original);
        }

        #[test]
        fn forward_applies_only_from_its_source(status in any_status(), idx in 0usize..FORWARD.len()) {
            let (from, to) = FORWARD[idx];
            let mut e = entry_in(status);
            let result = apply_forward(&mut e, forward_for(from, to));
            prop_assert_eq!(result.is_ok(), status == from);
            prop_assert!(Status::ALL.contains(&e.status));
        }
    }
}

//! Entry status (six-value lifecycle).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Status of a queue entry.
///
/// Lifecycle:
/// - NEW <-> HOLD (manual toggle)
/// - NEW -> SUBMITTED -> RUNNING -> SUCCESS
/// - RUNNING -> ERROR (execution failure reported externally)
/// - NEW -> ERROR (submission attempt failed)
///
/// Serialized as the upper-case names used by the persisted table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    New,
    Hold,
    Submitted,
    Running,
    Success,
    Error,
}

impl Status {
    /// Every status, in lifecycle order.
    pub const ALL: [Status; 6] = [
        Status::New,
        Status::Hold,
        Status::Submitted,
        Status::Running,
        Status::Success,
        Status::Error,
    ];

    /// Position in the canonical forward order used by reset.
    /// HOLD ranks with NEW.
    pub fn rank(self) -> u8 {
        match self {
            Status::New | Status::Hold => 0,
            Status::Submitted => 1,
            Status::Running => 2,
            Status::Success | Status::Error => 3,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Status::New => "NEW",
            Status::Hold => "HOLD",
            Status::Submitted => "SUBMITTED",
            Status::Running => "RUNNING",
            Status::Success => "SUCCESS",
            Status::Error => "ERROR",
        }
    }

    /// No forward transition leaves this status.
    pub fn is_terminal(self) -> bool {
        matches!(self, Status::Success | Status::Error)
    }

    /// Not yet handed to the scheduler; input-path uniqueness applies.
    pub fn is_active(self) -> bool {
        matches!(self, Status::New | Status::Hold)
    }

    /// Waiting on the external scheduler; reconciliation applies.
    pub fn is_in_flight(self) -> bool {
        matches!(self, Status::Submitted | Status::Running)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown status '{0}' (expected one of NEW, HOLD, SUBMITTED, RUNNING, SUCCESS, ERROR)")]
pub struct ParseStatusError(pub String);

impl FromStr for Status {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Status::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ParseStatusError(s.to_string()))
    }
}

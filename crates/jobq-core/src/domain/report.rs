//! Normalized status signal from the external scheduler.
//!
//! `qstat` output and PBS notification mail both reduce to this shape.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusReport {
    pub external_job_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Exit status as reported by the scheduler, when it reports one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_status: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl StatusReport {
    pub fn new(external_job_id: impl Into<String>) -> Self {
        Self {
            external_job_id: external_job_id.into(),
            started_at: None,
            completed_at: None,
            exit_status: None,
            message: None,
        }
    }

    pub fn started(mut self, at: DateTime<Utc>) -> Self {
        self.started_at = Some(at);
        self
    }

    pub fn completed(mut self, at: DateTime<Utc>) -> Self {
        self.completed_at = Some(at);
        self
    }

    pub fn with_exit_status(mut self, code: i32) -> Self {
        self.exit_status = Some(code);
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Fold a later report for the same job into this one.
    /// Fields already known are kept; missing ones are filled in.
    pub fn merge(&mut self, other: StatusReport) {
        self.started_at = self.started_at.or(other.started_at);
        self.completed_at = self.completed_at.or(other.completed_at);
        self.exit_status = self.exit_status.or(other.exit_status);
        if self.message.is_none() {
            self.message = other.message;
        }
    }
}

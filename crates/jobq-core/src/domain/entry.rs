//! Queue entry record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::QueueError;
use super::ids::EntryId;
use super::status::Status;

pub const DEFAULT_PPN: u32 = 1;
pub const DEFAULT_WALLTIME: &str = "10:00:00";

/// Execution parameters for one `generate_climos` run plus its PBS resources.
///
/// Fixed once the entry leaves NEW/HOLD.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecParams {
    /// Root of the Python virtual env holding `generate_climos`.
    pub py_venv: String,
    pub output_directory: String,
    pub convert_longitudes: bool,
    pub split_vars: bool,
    pub split_intervals: bool,
    /// Processors per node.
    pub ppn: u32,
    /// Maximum wall time, `[[HH:]MM:]SS`.
    pub walltime: String,
}

impl ExecParams {
    pub fn new(py_venv: impl Into<String>, output_directory: impl Into<String>) -> Self {
        Self {
            py_venv: py_venv.into(),
            output_directory: output_directory.into(),
            convert_longitudes: true,
            split_vars: true,
            split_intervals: true,
            ppn: DEFAULT_PPN,
            walltime: DEFAULT_WALLTIME.to_string(),
        }
    }

    pub fn validate(&self) -> Result<(), QueueError> {
        if self.ppn == 0 {
            return Err(QueueError::InvalidArgument("ppn must be at least 1".into()));
        }
        validate_walltime(&self.walltime)
    }
}

/// Accepts `SS`, `MM:SS` or `H:MM:SS`/`HH:MM:SS` style values.
pub fn validate_walltime(value: &str) -> Result<(), QueueError> {
    let parts: Vec<&str> = value.split(':').collect();
    let well_formed = (1..=3).contains(&parts.len())
        && parts.iter().enumerate().all(|(i, part)| {
            let digits_ok = !part.is_empty() && part.chars().all(|c| c.is_ascii_digit());
            // only the leading component may be a single digit or longer than two
            let width_ok = i == 0 || part.len() == 2;
            digits_ok && width_ok && part.len() <= 3
        });
    if well_formed {
        Ok(())
    } else {
        Err(QueueError::InvalidArgument(format!(
            "'{value}' is not a valid walltime value"
        )))
    }
}

/// Partial update of [`ExecParams`]. `None` fields are left alone.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamsPatch {
    pub py_venv: Option<String>,
    pub output_directory: Option<String>,
    pub convert_longitudes: Option<bool>,
    pub split_vars: Option<bool>,
    pub split_intervals: Option<bool>,
    pub ppn: Option<u32>,
    pub walltime: Option<String>,
}

impl ParamsPatch {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Returns the patched copy, validated.
    pub fn apply_to(&self, params: &ExecParams) -> Result<ExecParams, QueueError> {
        let mut next = params.clone();
        if let Some(v) = &self.py_venv {
            next.py_venv = v.clone();
        }
        if let Some(v) = &self.output_directory {
            next.output_directory = v.clone();
        }
        if let Some(v) = self.convert_longitudes {
            next.convert_longitudes = v;
        }
        if let Some(v) = self.split_vars {
            next.split_vars = v;
        }
        if let Some(v) = self.split_intervals {
            next.split_intervals = v;
        }
        if let Some(v) = self.ppn {
            next.ppn = v;
        }
        if let Some(v) = &self.walltime {
            next.walltime = v.clone();
        }
        next.validate()?;
        Ok(next)
    }
}

/// A job already handed to the scheduler outside this tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalSubmission {
    pub submitted_time: DateTime<Utc>,
    pub external_job_id: String,
}

impl ExternalSubmission {
    /// Both halves or neither.
    pub fn from_parts(
        submitted_time: Option<DateTime<Utc>>,
        external_job_id: Option<String>,
    ) -> Result<Option<Self>, QueueError> {
        match (submitted_time, external_job_id) {
            (Some(submitted_time), Some(external_job_id)) => Ok(Some(Self {
                submitted_time,
                external_job_id,
            })),
            (None, None) => Ok(None),
            _ => Err(QueueError::InvalidArgument(
                "submission time and external job id must be given together".into(),
            )),
        }
    }
}

/// Registration request for a new entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewEntry {
    pub input_path: String,
    pub params: ExecParams,
    pub external: Option<ExternalSubmission>,
}

impl NewEntry {
    pub fn new(input_path: impl Into<String>, params: ExecParams) -> Self {
        Self {
            input_path: input_path.into(),
            params,
            external: None,
        }
    }

    pub fn submitted_externally(mut self, submission: ExternalSubmission) -> Self {
        self.external = Some(submission);
        self
    }
}

/// One unit of queued work.
///
/// Status and the lifecycle fields change only through `domain::transition`;
/// the store owns `revision`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueEntry {
    pub id: EntryId,
    pub input_path: String,
    pub params: ExecParams,
    pub status: Status,
    pub added_time: DateTime<Utc>,
    pub submitted_time: Option<DateTime<Utc>>,
    pub external_job_id: Option<String>,
    pub started_time: Option<DateTime<Utc>>,
    pub completed_time: Option<DateTime<Utc>>,
    pub completion_message: Option<String>,
    /// Optimistic concurrency token, bumped by the store on every write.
    pub revision: u64,
}

impl QueueEntry {
    /// Build the initial record for a registration.
    pub fn create(id: EntryId, request: NewEntry, added_time: DateTime<Utc>) -> Self {
        let (status, submitted_time, external_job_id) = match request.external {
            Some(ext) => (
                Status::Submitted,
                Some(ext.submitted_time),
                Some(ext.external_job_id),
            ),
            None => (Status::New, None, None),
        };
        Self {
            id,
            input_path: request.input_path,
            params: request.params,
            status,
            added_time,
            submitted_time,
            external_job_id,
            started_time: None,
            completed_time: None,
            completion_message: None,
            revision: 0,
        }
    }

    /// File name part of `input_path`.
    pub fn input_file_name(&self) -> &str {
        self.input_path
            .rsplit('/')
            .next()
            .filter(|name| !name.is_empty())
            .unwrap_or(&self.input_path)
    }

    /// FIFO ordering key.
    pub fn fifo_key(&self) -> (DateTime<Utc>, EntryId) {
        (self.added_time, self.id)
    }
}

//! `qstat -f -1` status source.
//!
//! Output is a sequence of blocks:
//!
//! ```text
//! Job Id: 1234.server
//!     Job_Name = generate_climos:tasmax.nc
//!     start_time = Mon Oct 16 10:00:00 2017
//!     comp_time = Mon Oct 16 11:30:00 2017
//!     exit_status = 0
//! ```
//!
//! Times are in the scheduler host's local time zone.

use async_trait::async_trait;
use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use tokio::process::Command;

use crate::domain::StatusReport;
use crate::ports::{SourceError, StatusSource};

const QSTAT_TIME_FORMAT: &str = "%a %b %e %H:%M:%S %Y";

fn parse_time<Tz: TimeZone>(value: &str, tz: &Tz) -> Result<DateTime<Utc>, SourceError> {
    let naive = NaiveDateTime::parse_from_str(value.trim(), QSTAT_TIME_FORMAT)
        .map_err(|e| SourceError::Parse(format!("bad qstat time '{value}': {e}")))?;
    tz.from_local_datetime(&naive)
        .earliest()
        .map(|t| t.with_timezone(&Utc))
        .ok_or_else(|| SourceError::Parse(format!("nonexistent local time '{value}'")))
}

/// Parse `qstat -f -1` output, reading times in `tz`.
pub fn parse_qstat_in<Tz: TimeZone>(text: &str, tz: &Tz) -> Result<Vec<StatusReport>, SourceError> {
    let mut reports = Vec::new();
    let mut current: Option<(StatusReport, Vec<String>)> = None;

    for line in text.lines() {
        if let Some(job_id) = line.strip_prefix("Job Id:") {
            if let Some((report, raw)) = current.take() {
                reports.push(report.with_message(raw.join("\n")));
            }
            current = Some((StatusReport::new(job_id.trim()), Vec::new()));
            continue;
        }
        let Some((report, raw)) = current.as_mut() else {
            continue;
        };
        let Some((key, value)) = line.split_once(" = ") else {
            continue;
        };
        let (key, value) = (key.trim(), value.trim());
        raw.push(format!("{key} = {value}"));
        match key {
            "start_time" => report.started_at = Some(parse_time(value, tz)?),
            "comp_time" => report.completed_at = Some(parse_time(value, tz)?),
            "exit_status" => {
                report.exit_status = Some(value.parse().map_err(|_| {
                    SourceError::Parse(format!("bad exit_status '{value}'"))
                })?)
            }
            _ => {}
        }
    }
    if let Some((report, raw)) = current {
        reports.push(report.with_message(raw.join("\n")));
    }
    Ok(reports)
}

/// Parse `qstat -f -1` output produced on this host.
pub fn parse_qstat(text: &str) -> Result<Vec<StatusReport>, SourceError> {
    parse_qstat_in(text, &Local)
}

/// Runs `qstat -f -1 <job id>` once per job.
#[derive(Debug, Clone)]
pub struct QstatSource {
    program: String,
    args: Vec<String>,
}

impl Default for QstatSource {
    fn default() -> Self {
        Self::new("qstat")
    }
}

impl QstatSource {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Arguments placed before `-f -1 <job id>`.
    pub fn with_args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    async fn query(&self, job_id: &str) -> Result<Vec<StatusReport>, SourceError> {
        let output = Command::new(&self.program)
            .args(&self.args)
            .args(["-f", "-1", job_id])
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| SourceError::Query(format!("failed to run {}: {e}", self.program)))?;

        if !output.status.success() {
            // finished jobs age out of qstat; nothing to report for them
            tracing::debug!(
                job_id = %job_id,
                stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                "qstat has no record of job"
            );
            return Ok(Vec::new());
        }
        parse_qstat(&String::from_utf8_lossy(&output.stdout))
    }
}

#[async_trait]
impl StatusSource for QstatSource {
    /// A job whose query or output fails is logged and skipped. Fails only
    /// when no job could be queried at all.
    async fn fetch(&self, job_ids: &[String]) -> Result<Vec<StatusReport>, SourceError> {
        let mut reports = Vec::new();
        let mut answered = 0usize;
        let mut last_error = None;
        for job_id in job_ids {
            match self.query(job_id).await {
                Ok(found) => {
                    answered += 1;
                    reports.extend(found);
                }
                Err(e) => {
                    tracing::warn!(job_id = %job_id, error = %e, "skipping job");
                    last_error = Some(e);
                }
            }
        }
        match last_error {
            Some(e) if answered == 0 => Err(e),
            _ => Ok(reports),
        }
    }
}

//! PBS notification mail (`-m abe`) parser.
//!
//! A start mail carries `Begun execution`, an end mail carries
//! `Execution terminated` followed by `Exit_status=N`. The event time is the
//! mail's `Date:` header, or `received_at` when there is none.

use chrono::{DateTime, Utc};

use crate::domain::StatusReport;
use crate::ports::SourceError;

const JOB_ID_MARKER: &str = "PBS Job Id:";
const BEGUN_MARKER: &str = "Begun execution";
const TERMINATED_MARKER: &str = "Execution terminated";
const EXIT_STATUS_MARKER: &str = "Exit_status=";

/// Split a raw message into (headers, body). Text without a header block is
/// treated as a bare body.
fn split_message(text: &str) -> (Vec<&str>, &str) {
    let first = text.lines().next().unwrap_or_default();
    let looks_like_header = first
        .split_once(':')
        .is_some_and(|(name, _)| !name.is_empty() && !name.contains(' '));
    if !looks_like_header {
        return (Vec::new(), text);
    }
    let boundary = text
        .find("\r\n\r\n")
        .map(|i| (i, 4))
        .or_else(|| text.find("\n\n").map(|i| (i, 2)));
    match boundary {
        Some((i, len)) => (text[..i].lines().collect(), &text[i + len..]),
        None => (text.lines().collect(), ""),
    }
}

fn header_date(headers: &[&str]) -> Option<DateTime<Utc>> {
    headers.iter().find_map(|line| {
        let (name, value) = line.split_once(':')?;
        if !name.eq_ignore_ascii_case("date") {
            return None;
        }
        DateTime::parse_from_rfc2822(value.trim())
            .ok()
            .map(|t| t.with_timezone(&Utc))
    })
}

/// Parse one notification mail into a report.
pub fn parse_notification_email(
    text: &str,
    received_at: DateTime<Utc>,
) -> Result<StatusReport, SourceError> {
    let (headers, body) = split_message(text);
    let at = header_date(&headers).unwrap_or(received_at);

    let job_id = body
        .lines()
        .find_map(|line| line.trim().strip_prefix(JOB_ID_MARKER))
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| SourceError::Parse(format!("no '{JOB_ID_MARKER}' line in mail")))?;

    let mut report = StatusReport::new(job_id);
    for line in body.lines().map(str::trim) {
        if line.starts_with(BEGUN_MARKER) {
            report.started_at = Some(at);
        } else if line.starts_with(TERMINATED_MARKER) {
            report.completed_at = Some(at);
        } else if let Some(code) = line.strip_prefix(EXIT_STATUS_MARKER) {
            report.exit_status = Some(code.trim().parse().map_err(|_| {
                SourceError::Parse(format!("bad exit status '{}'", code.trim()))
            })?);
        }
    }

    if report.started_at.is_none() && report.completed_at.is_none() {
        return Err(SourceError::Parse(format!(
            "mail for job {job_id} reports neither start nor termination"
        )));
    }
    Ok(report.with_message(body.trim()))
}

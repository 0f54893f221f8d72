//! Text rendering of listings, counts and per-entry outcomes.

use std::borrow::Cow;
use std::fmt::Write as _;

use anyhow::{Context, Result};
use chrono::{DateTime, Local, Utc};
use jobq_core::app::{DispatchOutcome, MutationOutcome, ReconcileChange, ReconcileOutcome};
use jobq_core::domain::{EntryId, QueueEntry, Status};
use jobq_core::observability::QueueCounts;
use regex::Regex;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ListStyle {
    #[default]
    Table,
    Compact,
    Full,
}

/// Regex search/replace applied to displayed paths.
#[derive(Debug, Clone)]
pub struct PathRewrite {
    search: Regex,
    replace: String,
}

impl PathRewrite {
    pub fn new(search: &str, replace: &str) -> Result<Self> {
        let search = Regex::new(search).with_context(|| format!("invalid pattern '{search}'"))?;
        Ok(Self {
            search,
            replace: replace.to_string(),
        })
    }

    pub fn apply<'a>(&self, path: &'a str) -> Cow<'a, str> {
        self.search.replace_all(path, self.replace.as_str())
    }
}

fn display_path<'a>(path: &'a str, rewrite: Option<&PathRewrite>) -> Cow<'a, str> {
    match rewrite {
        Some(r) => r.apply(path),
        None => Cow::Borrowed(path),
    }
}

fn short_time(t: Option<DateTime<Utc>>) -> String {
    t.map(|t| t.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "--".to_string())
}

fn opt_text(value: Option<&str>) -> &str {
    value.unwrap_or("--")
}

fn clip(value: &str, width: usize) -> &str {
    match value.char_indices().nth(width) {
        Some((i, _)) => &value[..i],
        None => value,
    }
}

pub fn render_entries(
    entries: &[QueueEntry],
    style: ListStyle,
    rewrite: Option<&PathRewrite>,
) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{} queue entries matched", entries.len());
    match style {
        ListStyle::Compact => {
            for e in entries {
                let _ = writeln!(
                    out,
                    "{}: {} ({})",
                    display_path(&e.input_path, rewrite),
                    e.status,
                    clip(e.external_job_id.as_deref().unwrap_or(""), 4)
                );
            }
        }
        ListStyle::Full => {
            for e in entries {
                let p = &e.params;
                let _ = writeln!(out, "{}:", display_path(&e.input_path, rewrite));
                let fields: [(&str, String); 15] = [
                    ("id", e.id.to_string()),
                    ("py_venv", p.py_venv.clone()),
                    ("output_directory", p.output_directory.clone()),
                    ("convert_longitudes", p.convert_longitudes.to_string()),
                    ("split_vars", p.split_vars.to_string()),
                    ("split_intervals", p.split_intervals.to_string()),
                    ("ppn", p.ppn.to_string()),
                    ("walltime", p.walltime.clone()),
                    ("status", e.status.to_string()),
                    ("added_time", e.added_time.to_rfc3339()),
                    ("submitted_time", opt_rfc3339(e.submitted_time)),
                    ("external_job_id", opt_text(e.external_job_id.as_deref()).to_string()),
                    ("started_time", opt_rfc3339(e.started_time)),
                    ("completed_time", opt_rfc3339(e.completed_time)),
                    (
                        "completion_message",
                        opt_text(e.completion_message.as_deref()).to_string(),
                    ),
                ];
                for (name, value) in fields {
                    let _ = writeln!(out, "    {name} = {value}");
                }
            }
        }
        ListStyle::Table => {
            let _ = writeln!(
                out,
                "  {:<16} | {:<9} | {:<16} | {:<4} | {:<16} | {:<16}",
                "Added time", "Status", "Submitted time", "JID", "Started time", "Completed time"
            );
            let rule = "-".repeat(16);
            let _ = writeln!(
                out,
                "  {rule} | {} | {rule} | {} | {rule} | {rule}",
                "-".repeat(9),
                "-".repeat(4)
            );
            for e in entries {
                let _ = writeln!(out, "{}:", display_path(&e.input_path, rewrite));
                let _ = writeln!(
                    out,
                    "  {:<16} | {:<9} | {:<16} | {:<4} | {:<16} | {:<16}",
                    short_time(Some(e.added_time)),
                    e.status.as_str(),
                    short_time(e.submitted_time),
                    clip(opt_text(e.external_job_id.as_deref()), 4),
                    short_time(e.started_time),
                    short_time(e.completed_time),
                );
            }
        }
    }
    out
}

fn opt_rfc3339(t: Option<DateTime<Utc>>) -> String {
    t.map(|t| t.to_rfc3339()).unwrap_or_else(|| "--".to_string())
}

pub fn render_counts(counts: &QueueCounts) -> String {
    let mut out = String::new();
    for (status, n) in counts.non_zero() {
        let _ = writeln!(out, "{status}: {n}");
    }
    out
}

pub fn render_dispatch(outcomes: &[DispatchOutcome]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{} entries dispatched", outcomes.len());
    for o in outcomes {
        match (&o.external_job_id, &o.error) {
            (_, Some(error)) => {
                let _ = writeln!(out, "{}: {} ({error})", o.input_path, o.status);
            }
            (Some(job_id), None) => {
                let _ = writeln!(out, "{}: {} as {job_id}", o.input_path, o.status);
            }
            (None, None) => {
                let _ = writeln!(out, "{}: {}", o.input_path, o.status);
            }
        }
    }
    out
}

pub fn render_reconcile(outcomes: &[ReconcileOutcome]) -> String {
    let mut out = String::new();
    for o in outcomes {
        let _ = match &o.change {
            ReconcileChange::Applied { from, to } => {
                writeln!(out, "{}: {from} -> {to}", o.external_job_id)
            }
            ReconcileChange::Unchanged { status } => {
                writeln!(out, "{}: unchanged ({status})", o.external_job_id)
            }
            ReconcileChange::Failed { error } => {
                writeln!(out, "{}: failed ({error})", o.external_job_id)
            }
        };
    }
    out
}

/// Serializable view of a [`MutationOutcome`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MutationLine {
    pub entry_id: EntryId,
    pub input_path: String,
    pub change: String,
    pub status: Option<Status>,
    pub error: Option<String>,
}

impl From<&MutationOutcome> for MutationLine {
    fn from(o: &MutationOutcome) -> Self {
        let (status, error) = match &o.result {
            Ok(entry) => (Some(entry.status), None),
            Err(e) => (None, Some(e.to_string())),
        };
        Self {
            entry_id: o.entry_id,
            input_path: o.input_path.clone(),
            change: o.change.describe(),
            status,
            error,
        }
    }
}

pub fn render_mutations(lines: &[MutationLine]) -> String {
    let mut out = String::new();
    for line in lines {
        let _ = match (&line.status, &line.error) {
            (_, Some(error)) => writeln!(out, "{}: {} failed: {error}", line.input_path, line.change),
            (Some(status), None) => writeln!(out, "{}: {} -> {status}", line.input_path, line.change),
            (None, None) => writeln!(out, "{}: {}", line.input_path, line.change),
        };
    }
    out
}

pub fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    let mut text = serde_json::to_string_pretty(value).context("failed to encode JSON")?;
    text.push('\n');
    Ok(text)
}

//! Command-line definition.

use std::path::PathBuf;

use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use clap::{Args, Parser, Subcommand};
use jobq_core::domain::{ParamsPatch, Status};

#[derive(Debug, Parser)]
#[command(
    name = "jobq",
    version,
    about = "Queue generate_climos runs and submit them to a PBS scheduler"
)]
pub struct Cli {
    /// Queue database file (overrides JQ_DATABASE and the config file).
    #[arg(short = 'd', long, global = true)]
    pub database: Option<PathBuf>,

    /// TOML settings file.
    #[arg(long, env = "JOBQ_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Log filter used when RUST_LOG is unset (e.g. `debug`, `jobq_core=trace`).
    #[arg(short = 'L', long = "log-level", global = true)]
    pub log_level: Option<String>,

    /// Print machine-readable JSON instead of text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Do not ask before changing each entry.
    #[arg(short = 'y', long, global = true)]
    pub yes: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Add a file to the queue.
    Add(AddArgs),
    /// List queue entries.
    List(ListArgs),
    /// Count entries per status.
    Summary {
        /// Only count entries whose path contains this text.
        input_filepath: Option<String>,
    },
    /// Print the job script for one entry.
    Script {
        /// Input filepath (full match).
        input_filepath: String,
        /// Render a script that performs no work.
        #[arg(long)]
        test_job: bool,
    },
    /// Put NEW entries on hold.
    Hold {
        /// Input filepath (partial match).
        input_filepath: String,
    },
    /// Release held entries back to NEW.
    Unhold {
        /// Input filepath (partial match).
        input_filepath: String,
    },
    /// Move an entry back to an earlier status.
    Reset(ResetArgs),
    /// Change execution parameters of NEW or HOLD entries.
    ///
    /// Every entry whose path contains the given text is changed.
    Alter(AlterArgs),
    /// Submit the oldest NEW entries.
    Submit {
        /// Number of entries to submit.
        #[arg(short = 'n', long = "number", default_value_t = 1)]
        number: usize,
        /// Submit jobs that perform no work.
        #[arg(long)]
        test_job: bool,
    },
    /// Bring entry statuses up to date with the scheduler.
    #[command(subcommand)]
    Update(UpdateSource),
}

#[derive(Debug, Subcommand)]
pub enum UpdateSource {
    /// Query `qstat` for every submitted or running job.
    Qstat,
    /// Read one PBS notification email from stdin.
    Email,
}

/// Execution parameters shared by `add` and `alter`.
#[derive(Debug, Clone, Default, Args)]
pub struct ParamArgs {
    /// Python virtual env containing generate_climos.
    #[arg(short = 'P', long)]
    pub py_venv: Option<String>,

    /// Transform longitudes from [0, 360) to [-180, 180).
    #[arg(short = 'g', long, value_parser = parse_flag)]
    pub convert_longitudes: Option<bool>,

    /// One output file per dependent variable.
    #[arg(short = 'v', long, value_parser = parse_flag)]
    pub split_vars: Option<bool>,

    /// One output file per climatological period.
    #[arg(short = 'i', long, value_parser = parse_flag)]
    pub split_intervals: Option<bool>,

    /// Processors per node.
    #[arg(short = 'p', long)]
    pub ppn: Option<u32>,

    /// Maximum wall time.
    #[arg(short = 'w', long)]
    pub walltime: Option<String>,
}

impl ParamArgs {
    pub fn patch(&self, output_directory: Option<String>) -> ParamsPatch {
        ParamsPatch {
            py_venv: self.py_venv.clone(),
            output_directory,
            convert_longitudes: self.convert_longitudes,
            split_vars: self.split_vars,
            split_intervals: self.split_intervals,
            ppn: self.ppn,
            walltime: self.walltime.clone(),
        }
    }
}

#[derive(Debug, Args)]
pub struct AddArgs {
    /// File to queue.
    pub input_filepath: String,

    /// Directory for output files.
    #[arg(short = 'o', long)]
    pub output_directory: String,

    #[command(flatten)]
    pub params: ParamArgs,

    /// Add even if an active entry for this file exists.
    #[arg(short = 'f', long)]
    pub force: bool,

    /// Time the job was submitted outside the queue.
    #[arg(short = 's', long, value_parser = parse_time, requires = "job_id")]
    pub submitted: Option<DateTime<Utc>>,

    /// Scheduler job id of that submission.
    #[arg(short = 'j', long, requires = "submitted")]
    pub job_id: Option<String>,
}

#[derive(Debug, Args)]
pub struct ListArgs {
    /// Input filepath (partial match).
    #[arg(short = 'i', long)]
    pub input_filepath: Option<String>,

    /// Scheduler job id (partial match).
    #[arg(short = 'j', long)]
    pub job_id: Option<String>,

    #[arg(short = 's', long)]
    pub status: Option<Status>,

    /// One line per entry.
    #[arg(short = 'C', long, conflicts_with = "full")]
    pub compact: bool,

    /// Every field of every entry.
    #[arg(short = 'F', long)]
    pub full: bool,

    /// Regex search/replace on displayed paths.
    #[arg(
        short = 'f',
        long,
        num_args = 2,
        value_names = ["SEARCH", "REPLACE"]
    )]
    pub filepath_replace: Option<Vec<String>>,
}

#[derive(Debug, Args)]
pub struct ResetArgs {
    /// Input filepath (full match).
    pub input_filepath: String,

    /// Status to reset to.
    #[arg(short = 's', long, default_value_t = Status::New)]
    pub status: Status,

    /// Reset every entry for the path instead of requiring exactly one.
    #[arg(long)]
    pub all: bool,
}

#[derive(Debug, Args)]
pub struct AlterArgs {
    /// Input filepath (partial match).
    pub input_filepath: String,

    /// Directory for output files.
    #[arg(short = 'o', long)]
    pub output_directory: Option<String>,

    #[command(flatten)]
    pub params: ParamArgs,
}

/// `true`, `t`, `yes` and `1` (any case) are true; anything else is false.
fn parse_flag(value: &str) -> Result<bool, String> {
    Ok(matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "true" | "t" | "yes" | "1"
    ))
}

const LOCAL_TIME_FORMATS: [&str; 3] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"];

/// RFC 3339, or a local wall-clock time such as `2017-10-16 10:00:00`.
fn parse_time(value: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(t) = DateTime::parse_from_rfc3339(value) {
        return Ok(t.with_timezone(&Utc));
    }
    LOCAL_TIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .and_then(|naive| Local.from_local_datetime(&naive).earliest())
        .map(|t| t.with_timezone(&Utc))
        .ok_or_else(|| format!("'{value}' is not a recognised date/time"))
}

//! Operation settings. Durations are whole seconds so they read naturally in TOML.

use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const DEFAULT_SUBMIT_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_LEASE_TTL_SECS: u64 = 600;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Upper bound on one submitter call.
    pub submit_timeout_secs: u64,
    /// How long a dispatch lease hides an entry from other dispatchers.
    pub lease_ttl_secs: u64,
    /// Lease holder name, unique per dispatcher process.
    pub holder: String,
    /// Render the echo-only script variant.
    pub test_job: bool,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            submit_timeout_secs: DEFAULT_SUBMIT_TIMEOUT_SECS,
            lease_ttl_secs: DEFAULT_LEASE_TTL_SECS,
            holder: default_holder(),
            test_job: false,
        }
    }
}

impl DispatchConfig {
    pub fn submit_timeout(&self) -> Duration {
        Duration::from_secs(self.submit_timeout_secs)
    }

    pub fn lease_ttl(&self) -> chrono::Duration {
        let secs = i64::try_from(self.lease_ttl_secs).unwrap_or(i64::MAX);
        chrono::Duration::try_seconds(secs).unwrap_or_else(|| chrono::Duration::days(36_500))
    }
}

fn default_holder() -> String {
    format!("jobq-{}", std::process::id())
}

/// What a completion report means for an entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionRouting {
    /// Every completion is RUNNING -> SUCCESS.
    #[default]
    AlwaysSuccess,
    /// A non-zero reported exit status is RUNNING -> ERROR.
    ExitStatus,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcileConfig {
    pub completion: CompletionRouting,
}

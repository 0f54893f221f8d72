//! `qsub` submitter: the script goes to the child's stdin, the job id comes
//! back on stdout.

use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::domain::QueueEntry;
use crate::ports::{SubmitError, Submitter};

#[derive(Debug, Clone)]
pub struct QsubSubmitter {
    program: String,
    args: Vec<String>,
}

impl Default for QsubSubmitter {
    fn default() -> Self {
        Self::new("qsub")
    }
}

impl QsubSubmitter {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn with_args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    fn io_error(&self, e: std::io::Error) -> SubmitError {
        SubmitError::Io {
            program: self.program.clone(),
            reason: e.to_string(),
        }
    }
}

#[async_trait]
impl Submitter for QsubSubmitter {
    async fn submit(&self, entry: &QueueEntry, script: &str) -> Result<String, SubmitError> {
        tracing::debug!(program = %self.program, entry = %entry.id, "spawning submitter");

        // dropping the child (e.g. on dispatch timeout) kills it
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| SubmitError::Spawn {
                program: self.program.clone(),
                reason: e.to_string(),
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(script.as_bytes())
                .await
                .map_err(|e| self.io_error(e))?;
            // closing stdin lets qsub see EOF
            drop(stdin);
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| self.io_error(e))?;

        if !output.status.success() {
            return Err(SubmitError::Exit {
                program: self.program.clone(),
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let job_id = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if job_id.is_empty() {
            return Err(SubmitError::EmptyJobId {
                program: self.program.clone(),
            });
        }
        Ok(job_id)
    }
}

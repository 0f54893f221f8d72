//! Submitter port - 外部スケジューラへのジョブ投入
//!
//! # 実装
//! - `impls::QsubSubmitter`: `qsub` にスクリプトを標準入力で渡す
//!
//! 投入失敗は例外ではなく日常的な失敗として扱う（dispatch が ERROR に記録）。

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::QueueEntry;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubmitError {
    #[error("failed to start {program}: {reason}")]
    Spawn { program: String, reason: String },

    #[error("{program} exited with status {code:?}: {stderr}")]
    Exit {
        program: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("{program} returned no job id")]
    EmptyJobId { program: String },

    #[error("submission timed out after {seconds}s")]
    Timeout { seconds: u64 },

    #[error("i/o error talking to {program}: {reason}")]
    Io { program: String, reason: String },
}

#[async_trait]
pub trait Submitter: Send + Sync {
    /// Submit `script` for `entry`; returns the scheduler's job identifier.
    async fn submit(&self, entry: &QueueEntry, script: &str) -> Result<String, SubmitError>;
}

#[async_trait]
impl<S: Submitter + ?Sized> Submitter for std::sync::Arc<S> {
    async fn submit(&self, entry: &QueueEntry, script: &str) -> Result<String, SubmitError> {
        (**self).submit(entry, script).await
    }
}

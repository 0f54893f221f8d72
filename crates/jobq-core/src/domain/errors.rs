//! Errors - エラー型と分類
//!
//! - 遷移エラー（InvalidTransition / UnreachableTarget）: 変更は一切適用されない
//! - 検索エラー（NotFound / AmbiguousMatch）: 呼び出し側に報告
//! - ストアエラー: 現在の操作を中断（部分コミットなし）
//!
//! 投入失敗（SubmitError）はここには含めない。dispatch がエントリの ERROR 遷移として記録する。

use thiserror::Error;

use super::ids::EntryId;
use super::status::Status;

/// Failures at the entry-store boundary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The entry changed since it was loaded (revision mismatch) or no longer exists.
    #[error("entry {id} was modified concurrently")]
    Conflict { id: EntryId },

    /// Another dispatcher holds an unexpired lease on the entry.
    #[error("entry {id} is being submitted by {holder}")]
    Leased { id: EntryId, holder: String },

    #[error("store backend failure: {0}")]
    Backend(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    #[error("invalid transition {from} -> {to}")]
    InvalidTransition { from: Status, to: Status },

    #[error("cannot reset from {from} to {target}")]
    UnreachableTarget { from: Status, target: Status },

    #[error("no queue entry matches {0}")]
    NotFound(String),

    #[error("{count} queue entries match {selector}; expected exactly one")]
    AmbiguousMatch { selector: String, count: usize },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl QueueError {
    /// Lookup failures that should end a command with a non-zero exit.
    pub fn is_lookup_failure(&self) -> bool {
        matches!(self, Self::NotFound(_) | Self::AmbiguousMatch { .. })
    }
}

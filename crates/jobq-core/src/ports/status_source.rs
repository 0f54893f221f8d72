//! StatusSource port - スケジューラ状態の取得
//!
//! # 実装
//! - `impls::QstatSource`: `qstat -f -1` をジョブごとに呼ぶ
//! - 通知メールは `impls::email::parse_notification_email` で同じ形に変換する

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::StatusReport;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceError {
    #[error("failed to query scheduler: {0}")]
    Query(String),

    #[error("unparseable scheduler output: {0}")]
    Parse(String),
}

#[async_trait]
pub trait StatusSource: Send + Sync {
    /// Reports for the given external job ids. Jobs the scheduler no longer
    /// knows about are simply absent from the result.
    async fn fetch(&self, job_ids: &[String]) -> Result<Vec<StatusReport>, SourceError>;
}

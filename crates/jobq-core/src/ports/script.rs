//! ScriptRenderer port - ジョブ投入スクリプトの生成（テンプレート処理）

use crate::domain::QueueEntry;

pub trait ScriptRenderer: Send + Sync {
    /// `test_job` renders a variant that only echoes the work it would do.
    fn render(&self, entry: &QueueEntry, test_job: bool) -> String;
}

impl<R: ScriptRenderer + ?Sized> ScriptRenderer for std::sync::Arc<R> {
    fn render(&self, entry: &QueueEntry, test_job: bool) -> String {
        (**self).render(entry, test_job)
    }
}

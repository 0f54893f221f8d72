//! App - アプリケーション層
//!
//! ports を組み合わせてキュー操作を実装する。
//!
//! # 主要コンポーネント
//! - **AppBuilder / QueueApp**: ワイヤリングと操作の入口
//! - **register**: エントリ登録（重複チェック付き）
//! - **dispatch**: NEW エントリの投入（lease + timeout）
//! - **reconcile**: スケジューラ報告の反映
//! - **reset**: 巻き戻し（一本化されたアルゴリズム）
//! - **pending**: 確認付きバッチ操作（hold / unhold / reset / alter）
//! - **query**: 一覧・集計・スクリプト表示

pub mod builder;
pub mod config;
pub mod dispatch;
pub mod pending;
pub mod query;
pub mod reconcile;
pub mod register;
pub mod reset;

#[cfg(test)]
pub(crate) mod testing;

pub use self::builder::{AppBuilder, BuildError, QueueApp};
pub use self::config::{CompletionRouting, DispatchConfig, ReconcileConfig};
pub use self::dispatch::DispatchOutcome;
pub use self::pending::{Change, MutationOutcome, PendingBatch, PendingMutation};
pub use self::query::EntrySelector;
pub use self::reconcile::{ReconcileChange, ReconcileOutcome};
pub use self::register::RegisterOutcome;
pub use self::reset::{ResetPlan, plan_reset, reset_to};

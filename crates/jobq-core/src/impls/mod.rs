//! Impls - ports の実装
//!
//! # 含まれる実装
//! - **MemoryEntryStore**: テスト・開発用の正本
//! - **QsubSubmitter**: `qsub` 経由の投入
//! - **PbsScriptRenderer**: PBS ジョブスクリプト
//! - **QstatSource / parse_qstat**: `qstat -f -1` の解析
//! - **parse_notification_email**: PBS 通知メールの解析
//! - **TracingEventSink**: DomainEvent を tracing に流す
//!
//! # 本番用ストア
//! 永続化ストアは別クレートに配置する：
//! - `jobq-sqlite`: SqliteEntryStore

pub mod email;
pub mod memory_store;
pub mod pbs_script;
pub mod qstat;
pub mod qsub;
pub mod tracing_sink;

pub use self::email::parse_notification_email;
pub use self::memory_store::MemoryEntryStore;
pub use self::pbs_script::PbsScriptRenderer;
pub use self::qstat::{QstatSource, parse_qstat, parse_qstat_in};
pub use self::qsub::QsubSubmitter;
pub use self::tracing_sink::TracingEventSink;

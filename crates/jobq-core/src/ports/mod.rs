//! Ports - 抽象化レイヤー
//!
//! Hexagonal Architecture の「ポート」。コアはこれらの trait だけに依存する。
//!
//! # 設計原則
//! - EntryStore が source of truth（正本）
//! - Submitter / StatusSource は外部スケジューラ（PBS）の境界
//! - ログは EventSink で注入する

pub mod clock;
pub mod entry_store;
pub mod event_sink;
pub mod id_generator;
pub mod script;
pub mod status_source;
pub mod submitter;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::entry_store::{CommitGuard, DispatchLease, EntryFilter, EntryStore};
pub use self::event_sink::{EventSink, MemoryEventSink, NoopEventSink};
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::script::ScriptRenderer;
pub use self::status_source::{SourceError, StatusSource};
pub use self::submitter::{SubmitError, Submitter};

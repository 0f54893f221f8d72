//! jobq-core
//!
//! Core of the `generate_climos` job queue: a persistent FIFO of work items
//! handed to a PBS-style batch scheduler.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, status, entry, transition, report, events, errors）
//! - **ports**: 抽象化レイヤー（EntryStore, Submitter, ScriptRenderer, StatusSource, Clock, IdGenerator, EventSink）
//! - **app**: アプリケーションロジック（builder, register, dispatch, reconcile, reset, pending, query）
//! - **impls**: 実装（MemoryEntryStore, QsubSubmitter, PbsScriptRenderer, qstat / メール解析, TracingEventSink）
//! - **observability**: ステータス別の集計

pub mod app;
pub mod domain;
pub mod impls;
pub mod observability;
pub mod ports;

//! AppBuilder - アプリケーションの構築とワイヤリング
//!
//! # 方針
//! - 起動時検証（Fail-fast）: 必須の port が欠けていれば build() が BuildError を返す
//! - 省略可能な port は本番用のデフォルトで埋める

use std::sync::Arc;

use crate::app::config::{DispatchConfig, ReconcileConfig};
use crate::impls::{PbsScriptRenderer, QsubSubmitter};
use crate::ports::{
    Clock, EntryStore, EventSink, IdGenerator, NoopEventSink, ScriptRenderer, Submitter,
    SystemClock, UlidGenerator,
};

/// Wires ports into a [`QueueApp`].
///
/// ```ignore
/// let app = AppBuilder::new()
///     .store(SqliteEntryStore::connect(&url).await?)
///     .events(TracingEventSink)
///     .build()?;
/// ```
#[derive(Default)]
pub struct AppBuilder {
    store: Option<Arc<dyn EntryStore>>,
    clock: Option<Arc<dyn Clock>>,
    ids: Option<Arc<dyn IdGenerator>>,
    events: Option<Arc<dyn EventSink>>,
    submitter: Option<Arc<dyn Submitter>>,
    renderer: Option<Arc<dyn ScriptRenderer>>,
    dispatch: DispatchConfig,
    reconcile: ReconcileConfig,
}

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("missing {0}; it has no default and must be provided")]
    MissingComponent(&'static str),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl AppBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store(mut self, store: impl EntryStore + 'static) -> Self {
        self.store = Some(Arc::new(store));
        self
    }

    pub fn clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Some(Arc::new(clock));
        self
    }

    pub fn ids(mut self, ids: impl IdGenerator + 'static) -> Self {
        self.ids = Some(Arc::new(ids));
        self
    }

    pub fn events(mut self, events: impl EventSink + 'static) -> Self {
        self.events = Some(Arc::new(events));
        self
    }

    pub fn submitter(mut self, submitter: impl Submitter + 'static) -> Self {
        self.submitter = Some(Arc::new(submitter));
        self
    }

    pub fn renderer(mut self, renderer: impl ScriptRenderer + 'static) -> Self {
        self.renderer = Some(Arc::new(renderer));
        self
    }

    pub fn dispatch_config(mut self, config: DispatchConfig) -> Self {
        self.dispatch = config;
        self
    }

    pub fn reconcile_config(mut self, config: ReconcileConfig) -> Self {
        self.reconcile = config;
        self
    }

    /// # 検証
    /// - store は必須
    /// - submit_timeout / lease_ttl は 0 秒不可、holder は空文字不可
    pub fn build(self) -> Result<QueueApp, BuildError> {
        let store = self
            .store
            .ok_or(BuildError::MissingComponent("entry store"))?;

        if self.dispatch.submit_timeout_secs == 0 {
            return Err(BuildError::InvalidConfig(
                "submit_timeout_secs must be positive".into(),
            ));
        }
        if self.dispatch.lease_ttl_secs == 0 {
            return Err(BuildError::InvalidConfig(
                "lease_ttl_secs must be positive".into(),
            ));
        }
        if self.dispatch.holder.trim().is_empty() {
            return Err(BuildError::InvalidConfig(
                "dispatch holder must not be empty".into(),
            ));
        }

        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let ids = self
            .ids
            .unwrap_or_else(|| Arc::new(UlidGenerator::new(Arc::clone(&clock))));

        Ok(QueueApp {
            store,
            clock,
            ids,
            events: self.events.unwrap_or_else(|| Arc::new(NoopEventSink)),
            submitter: self
                .submitter
                .unwrap_or_else(|| Arc::new(QsubSubmitter::default())),
            renderer: self
                .renderer
                .unwrap_or_else(|| Arc::new(PbsScriptRenderer)),
            dispatch: self.dispatch,
            reconcile: self.reconcile,
        })
    }
}

/// The queue core. Operations live in the sibling modules
/// (`register`, `dispatch`, `reconcile`, `reset`, `pending`, `query`).
pub struct QueueApp {
    pub(crate) store: Arc<dyn EntryStore>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) ids: Arc<dyn IdGenerator>,
    pub(crate) events: Arc<dyn EventSink>,
    pub(crate) submitter: Arc<dyn Submitter>,
    pub(crate) renderer: Arc<dyn ScriptRenderer>,
    pub(crate) dispatch: DispatchConfig,
    pub(crate) reconcile: ReconcileConfig,
}

impl QueueApp {
    pub fn dispatch_config(&self) -> &DispatchConfig {
        &self.dispatch
    }

    pub fn reconcile_config(&self) -> &ReconcileConfig {
        &self.reconcile
    }

    pub(crate) fn emit(&self, event: crate::domain::DomainEvent) {
        self.events.emit(event);
    }

    /// Guard for writes that do not hold a dispatch lease.
    pub(crate) fn writer(&self) -> crate::ports::CommitGuard {
        crate::ports::CommitGuard::writer(self.clock.now())
    }
}

//! EventSink port - イベント記録の抽象化
//!
//! 各操作にはグローバルなロガーではなく、この sink を渡す。
//!
//! # 実装
//! - NoopEventSink: 何もしない
//! - MemoryEventSink: テスト用に記録する
//! - `impls::TracingEventSink`: tracing に流す

use std::sync::Mutex;

use crate::domain::DomainEvent;

pub trait EventSink: Send + Sync {
    fn emit(&self, event: DomainEvent);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopEventSink;

impl EventSink for NoopEventSink {
    fn emit(&self, _event: DomainEvent) {}
}

#[derive(Debug, Default)]
pub struct MemoryEventSink {
    events: Mutex<Vec<DomainEvent>>,
}

impl MemoryEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<DomainEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }
}

impl EventSink for MemoryEventSink {
    fn emit(&self, event: DomainEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

impl<S: EventSink + ?Sized> EventSink for std::sync::Arc<S> {
    fn emit(&self, event: DomainEvent) {
        (**self).emit(event)
    }
}

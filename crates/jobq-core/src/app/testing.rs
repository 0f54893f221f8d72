//! Shared fixtures for the app-layer tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::app::{AppBuilder, DispatchConfig, QueueApp, ReconcileConfig};
use crate::domain::entry::fixtures::at;
use crate::domain::{ExecParams, NewEntry, QueueEntry};
use crate::impls::MemoryEntryStore;
use crate::ports::{FixedClock, MemoryEventSink, SubmitError, Submitter};

/// Scripted submitter: pops one response per call, records what it saw.
#[derive(Default)]
pub struct FakeSubmitter {
    responses: Mutex<VecDeque<Result<String, SubmitError>>>,
    delay: Option<Duration>,
    seen: Mutex<Vec<(String, String)>>,
}

impl FakeSubmitter {
    pub fn replying(responses: impl IntoIterator<Item = Result<String, SubmitError>>) -> Self {
        Self {
            responses: Mutex::new(responses.into_iter().collect()),
            ..Self::default()
        }
    }

    pub fn sleeping(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    /// (input_path, script) per call.
    pub fn seen(&self) -> Vec<(String, String)> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl Submitter for FakeSubmitter {
    async fn submit(&self, entry: &QueueEntry, script: &str) -> Result<String, SubmitError> {
        self.seen
            .lock()
            .unwrap()
            .push((entry.input_path.clone(), script.to_string()));
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(format!("{}.server", self.seen.lock().unwrap().len())))
    }
}

pub struct Harness {
    pub app: QueueApp,
    pub store: MemoryEntryStore,
    pub clock: Arc<FixedClock>,
    pub events: Arc<MemoryEventSink>,
    pub submitter: Arc<FakeSubmitter>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with(FakeSubmitter::default(), DispatchConfig::default(), ReconcileConfig::default())
    }

    pub fn with_submitter(submitter: FakeSubmitter) -> Self {
        Self::with(submitter, DispatchConfig::default(), ReconcileConfig::default())
    }

    pub fn with(
        submitter: FakeSubmitter,
        dispatch: DispatchConfig,
        reconcile: ReconcileConfig,
    ) -> Self {
        let store = MemoryEntryStore::new();
        let clock = Arc::new(FixedClock::new(at(0)));
        let events = Arc::new(MemoryEventSink::new());
        let submitter = Arc::new(submitter);
        let app = AppBuilder::new()
            .store(store.clone())
            .clock(Arc::clone(&clock))
            .events(Arc::clone(&events))
            .submitter(Arc::clone(&submitter))
            .dispatch_config(dispatch)
            .reconcile_config(reconcile)
            .build()
            .unwrap();
        Self {
            app,
            store,
            clock,
            events,
            submitter,
        }
    }

    /// Register `path` at minute `minute`, returning the stored entry.
    pub async fn add(&self, path: &str, minute: u32) -> QueueEntry {
        self.clock.set(at(minute));
        self.app
            .register(NewEntry::new(path, ExecParams::new("/opt/venv", "/out")), false)
            .await
            .unwrap()
            .into_entry()
    }
}

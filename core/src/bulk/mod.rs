//! Bulk orchestration: one backend job per batch when the backend path is
//! available, otherwise an in-process bounded worker pool.

mod autoscore;
mod pool;
pub(crate) mod rewrite;

use crate::collaborators::ItemPersister;
use crate::collaborators::ItemStore;
use crate::collaborators::Notifier;
use crate::collaborators::NullNotifier;
use crate::context::RunContext;
use curator_api::AiClient;
use curator_api::KeyCipher;
use curator_backend_client::BackendClient;
use curator_client::HttpTransport;
use curator_protocol::ReviewItem;
use serde_json::Value;
use std::sync::Arc;
use tracing::warn;

/// `{current, total}` as shown in the UI; `current` is monotonically
/// non-decreasing within one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BulkProgress {
    pub current: usize,
    pub total: usize,
}

pub trait BulkProgressReporter: Send + Sync {
    fn on_progress(&self, progress: BulkProgress);
}

pub struct NullBulkReporter;

impl BulkProgressReporter for NullBulkReporter {
    fn on_progress(&self, _progress: BulkProgress) {}
}

/// Counts surfaced in the completion toast.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BulkSummary {
    pub succeeded: usize,
    pub failed: usize,
}

impl BulkSummary {
    /// Reads the counters a backend job stores in its result payload.
    pub(crate) fn from_job_result(result: &Value) -> Self {
        let read = |key: &str| {
            result
                .get(key)
                .and_then(Value::as_u64)
                .unwrap_or_default() as usize
        };
        Self {
            succeeded: read("succeeded"),
            failed: read("failed"),
        }
    }
}

/// Drives bulk rewrite and autoscore runs against the item collection.
pub struct Orchestrator<T: HttpTransport> {
    pub(crate) ai: Arc<AiClient<T>>,
    pub(crate) backend: Option<Arc<BackendClient>>,
    pub(crate) store: Arc<dyn ItemStore>,
    pub(crate) persister: Option<Arc<dyn ItemPersister>>,
    pub(crate) notifier: Arc<dyn Notifier>,
    pub(crate) cipher: Arc<dyn KeyCipher>,
}

impl<T: HttpTransport> Orchestrator<T> {
    pub fn new(
        ai: Arc<AiClient<T>>,
        store: Arc<dyn ItemStore>,
        cipher: Arc<dyn KeyCipher>,
    ) -> Self {
        Self {
            ai,
            backend: None,
            store,
            persister: None,
            notifier: Arc::new(NullNotifier),
            cipher,
        }
    }

    pub fn with_backend(mut self, backend: Arc<BackendClient>) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn with_persister(mut self, persister: Arc<dyn ItemPersister>) -> Self {
        self.persister = Some(persister);
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Persists one updated item, detached from the pool's own progress:
    /// a failed auto-save is logged and never halts the run.
    pub(crate) fn persist_detached(&self, ctx: &RunContext, item: ReviewItem) {
        if !ctx.persists_updates() {
            return;
        }
        let Some(persister) = self.persister.clone() else {
            return;
        };
        tokio::spawn(async move {
            if let Err(err) = persister.persist(&item).await {
                warn!(item = %item.id, error = %err, "auto-save failed");
            }
        });
    }
}

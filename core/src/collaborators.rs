//! Seams to the embedding layer: item storage, persistence, and
//! user-visible notifications. The orchestrators never assume a concrete
//! storage engine or UI behind these traits.

use async_trait::async_trait;
use curator_protocol::ReviewItem;
use std::sync::Mutex;
use thiserror::Error;
use tracing::warn;

/// The shared item collection.
///
/// Implementations serialize access internally; orchestrator workers only
/// ever read an item and put back a fully-updated copy, so the store is the
/// single writer of record and the last put for an id wins.
#[async_trait]
pub trait ItemStore: Send + Sync {
    async fn get_all(&self) -> Vec<ReviewItem>;
    async fn get(&self, id: &str) -> Option<ReviewItem>;
    /// Replaces the item with the same id, or appends if absent.
    async fn put(&self, item: ReviewItem);
    async fn replace_all(&self, items: Vec<ReviewItem>);
}

#[derive(Debug, Error)]
#[error("{0}")]
pub struct PersistError(pub String);

/// Idempotent upsert of one item into durable storage.
///
/// Callers treat failures as non-fatal: a failed auto-save is logged and
/// the in-memory update stands.
#[async_trait]
pub trait ItemPersister: Send + Sync {
    async fn persist(&self, item: &ReviewItem) -> Result<(), PersistError>;
}

/// Fire-and-forget user notifications; the orchestrators never block on
/// these.
pub trait Notifier: Send + Sync {
    fn success(&self, message: &str);
    fn error(&self, message: &str);
    fn info(&self, message: &str);
    fn warning(&self, message: &str);
}

/// Notifier that routes everything into the log.
pub struct NullNotifier;

impl Notifier for NullNotifier {
    fn success(&self, message: &str) {
        tracing::info!("{message}");
    }

    fn error(&self, message: &str) {
        warn!("{message}");
    }

    fn info(&self, message: &str) {
        tracing::info!("{message}");
    }

    fn warning(&self, message: &str) {
        warn!("{message}");
    }
}

/// In-memory [`ItemStore`] used by tests and file-backed sessions.
#[derive(Default)]
pub struct MemoryStore {
    items: Mutex<Vec<ReviewItem>>,
}

impl MemoryStore {
    pub fn new(items: Vec<ReviewItem>) -> Self {
        Self {
            items: Mutex::new(items),
        }
    }
}

#[async_trait]
impl ItemStore for MemoryStore {
    async fn get_all(&self) -> Vec<ReviewItem> {
        self.items.lock().map(|items| items.clone()).unwrap_or_default()
    }

    async fn get(&self, id: &str) -> Option<ReviewItem> {
        self.items
            .lock()
            .ok()
            .and_then(|items| items.iter().find(|item| item.id == id).cloned())
    }

    async fn put(&self, item: ReviewItem) {
        if let Ok(mut items) = self.items.lock() {
            match items.iter_mut().find(|existing| existing.id == item.id) {
                Some(existing) => *existing = item,
                None => items.push(item),
            }
        }
    }

    async fn replace_all(&self, items: Vec<ReviewItem>) {
        if let Ok(mut guard) = self.items.lock() {
            *guard = items;
        }
    }
}

/// Where the item collection currently lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataSource {
    /// Imported from local JSON/JSONL files; no persistence.
    Files,
    /// The database-backed service; items can be persisted and backend
    /// jobs can operate on them server-side.
    Database,
    /// A hosted dataset hub snapshot; read-only.
    DatasetHub,
}

/// Which sessions the current selection spans.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionSelection {
    /// Items from every session are in view; no single session resolves.
    All,
    Session(String),
}

impl SessionSelection {
    pub fn resolved_uid(&self) -> Option<&str> {
        match self {
            SessionSelection::All => None,
            SessionSelection::Session(uid) => Some(uid),
        }
    }
}

/// Ambient facts about the run a bulk action executes under.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub source: DataSource,
    pub session: SessionSelection,
    /// Persist each updated item as soon as it changes.
    pub auto_save: bool,
}

impl RunContext {
    /// Persistence applies only to database-backed items with auto-save on.
    pub fn persists_updates(&self) -> bool {
        self.auto_save && self.source == DataSource::Database
    }
}

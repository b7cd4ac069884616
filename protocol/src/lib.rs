//! Shared data model for the curator workspace.
//!
//! Pure value objects: review items, chat messages, rewrite targets, job
//! lifecycle types, and per-run configuration. No I/O lives here.

mod config;
mod items;
mod jobs;
mod rewrite;

pub use config::AutoscoreConfig;
pub use config::GenerationParams;
pub use config::RewriterConfig;
pub use items::ChatMessage;
pub use items::ReviewItem;
pub use items::Role;
pub use items::RoleParseError;
pub use jobs::Job;
pub use jobs::JobProgress;
pub use jobs::JobStatus;
pub use jobs::JobType;
pub use rewrite::RewriteField;
pub use rewrite::RewriteTarget;

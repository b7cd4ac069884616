//! Client for the curator backend's asynchronous job API.
//!
//! Jobs are started with one POST, observed by polling, and cancelled or
//! rerun on request; the backend owns all job state. Underneath sits host
//! discovery: the backend is a local service that may restart on a
//! different port, so every request path can invalidate its cached base
//! URL and re-resolve before retrying.

mod client;
mod discovery;
mod error;
mod types;

pub use client::BackendClient;
pub use client::JobProgressReporter;
pub use client::NullProgressReporter;
pub use discovery::DiscoveryConfig;
pub use discovery::HostResolver;
pub use discovery::SERVICE_FINGERPRINT;
pub use error::BackendError;
pub use types::AutoscoreJobParams;
pub use types::MigrateReasoningJobParams;
pub use types::RemoveItemsJobParams;
pub use types::RewriteJobParams;

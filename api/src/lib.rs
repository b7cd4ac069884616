//! Streaming model-call clients.
//!
//! One HTTP POST per call with `Accept: text/event-stream`, decoded into a
//! lazy sequence of typed events by the [`sse`] module. Cancellation is
//! cooperative via [`tokio_util::sync::CancellationToken`]; any failure
//! caused by an abort is normalized to [`ApiError::Aborted`] so callers
//! never distinguish "user cancelled" from "connection dropped because
//! cancelled."

mod auth;
mod common;
mod endpoint;
mod error;
pub mod provider;
pub mod sse;

pub use auth::KeyCipher;
pub use auth::KeyCipherError;
pub use auth::StreamAuth;
pub use common::ChatStreamRequest;
pub use common::ChunkChannel;
pub use common::EventStream;
pub use common::GenerateStreamRequest;
pub use common::RewriteStreamRequest;
pub use common::StreamChunk;
pub use common::StreamEvent;
pub use common::StreamOutcome;
pub use common::TokenUsage;
pub use common::ToolCall;
pub use endpoint::AiClient;
pub use error::ApiError;
pub use provider::Provider;
pub use provider::RetryConfig;
pub use sse::collect_stream;

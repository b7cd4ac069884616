use curator_api::ApiError;
use curator_backend_client::BackendError;
use curator_protocol::RewriteTarget;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error("select a specific session before starting a backend job")]
    NoSessionSelected,

    #[error("bulk operations do not support the {0:?} target")]
    UnsupportedTarget(RewriteTarget),

    #[error("item {0} not found")]
    ItemNotFound(String),

    #[error("item {item_id} has no message at index {index}")]
    MessageIndexOutOfRange { item_id: String, index: usize },

    #[error("reasoning can only be attached to assistant messages")]
    ReasoningOnNonAssistant,
}

impl CoreError {
    /// True when the underlying cause was a cooperative cancel rather
    /// than a failure.
    pub fn is_abort(&self) -> bool {
        matches!(self, CoreError::Api(err) if err.is_abort())
    }
}

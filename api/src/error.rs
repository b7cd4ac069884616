use curator_client::TransportError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("stream error: {0}")]
    Stream(String),

    /// An `error` event reported by the server mid-stream.
    #[error("{message}")]
    Server {
        code: String,
        message: String,
        retryable: bool,
    },

    /// The call was cancelled, either explicitly or by the connection being
    /// torn down as a consequence of a cancel.
    #[error("request aborted")]
    Aborted,

    #[error("an API key is required but none was provided")]
    MissingApiKey,

    #[error("key wrapping failed: {0}")]
    KeyCipher(String),
}

impl ApiError {
    pub fn is_retryable(&self) -> bool {
        match self {
            ApiError::Server { retryable, .. } => *retryable,
            ApiError::Transport(TransportError::Network(_) | TransportError::Timeout) => true,
            _ => false,
        }
    }

    pub fn is_abort(&self) -> bool {
        matches!(
            self,
            ApiError::Aborted | ApiError::Transport(TransportError::Aborted)
        )
    }
}

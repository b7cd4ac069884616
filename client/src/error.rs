use http::StatusCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to build request: {0}")]
    Build(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("request timed out")]
    Timeout,

    /// The request was cancelled cooperatively. Covers both an explicit
    /// abort and the connection drop that follows one; callers never need
    /// to tell the two apart.
    #[error("request aborted")]
    Aborted,

    #[error("unexpected status {status}: {}", body.as_deref().unwrap_or("<no body>"))]
    Http {
        status: StatusCode,
        url: Option<String>,
        body: Option<String>,
    },
}

impl TransportError {
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            TransportError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

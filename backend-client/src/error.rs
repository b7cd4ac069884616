use curator_protocol::JobType;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("no backend host could be resolved: {0}")]
    Discovery(String),

    #[error("backend request to {url} failed: {message}")]
    Request { url: String, message: String },

    #[error("backend returned {status} from {url}: {body}")]
    Http {
        status: u16,
        url: String,
        body: String,
    },

    #[error("failed to decode backend response from {url}: {message}")]
    Decode { url: String, message: String },

    #[error("failed to encode job params: {0}")]
    Encode(String),

    #[error("job {id} failed: {message}")]
    JobFailed { id: String, message: String },

    #[error("job {id} was cancelled")]
    JobCancelled { id: String },

    #[error("job {id} has no stored params and cannot be rerun")]
    MissingParams { id: String },

    #[error("jobs of type {job_type} cannot be rerun")]
    UnsupportedRerun { job_type: JobType },

    #[error("gave up polling job {id} after {}s", ceiling.as_secs())]
    PollCeilingExceeded { id: String, ceiling: Duration },
}

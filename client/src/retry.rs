use crate::error::TransportError;
use std::time::Duration;
use tracing::debug;

/// Which failure classes a retry loop is willing to retry.
#[derive(Debug, Clone, Copy)]
pub struct RetryOn {
    pub retry_429: bool,
    pub retry_5xx: bool,
    pub retry_transport: bool,
}

/// Fixed-delay retry policy for transport calls.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u64,
    pub base_delay: Duration,
    pub retry_on: RetryOn,
}

impl RetryPolicy {
    fn should_retry(&self, err: &TransportError) -> bool {
        match err {
            TransportError::Http { status, .. } => {
                (status.as_u16() == 429 && self.retry_on.retry_429)
                    || (status.is_server_error() && self.retry_on.retry_5xx)
            }
            TransportError::Network(_) | TransportError::Timeout => self.retry_on.retry_transport,
            TransportError::Build(_) | TransportError::Aborted => false,
        }
    }
}

/// Drives `op` to completion under `policy`.
///
/// `op` is invoked fresh on each attempt so the caller rebuilds the request
/// (and re-resolves anything cached) every time.
pub async fn run_with_retry<T, F, Fut>(
    policy: RetryPolicy,
    mut op: F,
) -> Result<T, TransportError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, TransportError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0u64;
    loop {
        attempt += 1;
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if attempt >= max_attempts || !policy.should_retry(&err) {
                    return Err(err);
                }
                debug!(attempt, error = %err, "retrying request");
                tokio::time::sleep(policy.base_delay).await;
            }
        }
    }
}

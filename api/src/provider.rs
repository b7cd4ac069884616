use curator_client::Request;
use curator_client::RetryOn;
use curator_client::RetryPolicy;
use http::Method;
use http::header::HeaderMap;
use std::time::Duration;

/// Reads that produce no data for this long are treated as the model
/// thinking, not as a failure.
pub const STREAM_IDLE_GRACE: Duration = Duration::from_secs(5);

/// High-level retry configuration for a provider, converted into the
/// transport-level [`RetryPolicy`] that drives stream connects.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_attempts: u64,
    pub base_delay: Duration,
    pub retry_429: bool,
    pub retry_5xx: bool,
    pub retry_transport: bool,
}

impl RetryConfig {
    pub fn to_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay: self.base_delay,
            retry_on: RetryOn {
                retry_429: self.retry_429,
                retry_5xx: self.retry_5xx,
                retry_transport: self.retry_transport,
            },
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            retry_429: true,
            retry_5xx: true,
            retry_transport: true,
        }
    }
}

/// HTTP endpoint configuration for one API deployment: base URL, default
/// headers, retry policy, and the idle grace applied to stream reads.
#[derive(Debug, Clone)]
pub struct Provider {
    pub name: String,
    pub base_url: String,
    pub headers: HeaderMap,
    pub retry: RetryConfig,
    pub stream_idle_grace: Duration,
}

impl Provider {
    pub fn new(name: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into(),
            headers: HeaderMap::new(),
            retry: RetryConfig::default(),
            stream_idle_grace: STREAM_IDLE_GRACE,
        }
    }

    pub fn url_for_path(&self, path: &str) -> String {
        let base = self.base_url.trim_end_matches('/');
        let path = path.trim_start_matches('/');
        if path.is_empty() {
            base.to_string()
        } else {
            format!("{base}/{path}")
        }
    }

    pub fn build_request(&self, method: Method, path: &str) -> Request {
        Request {
            method,
            url: self.url_for_path(path),
            headers: self.headers.clone(),
            body: None,
            timeout: None,
        }
    }
}

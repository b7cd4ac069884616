const USER_AGENT: &str = concat!("curator/", env!("CARGO_PKG_VERSION"));

/// Builds the shared reqwest client.
///
/// Idle connection pooling is disabled: every request here is either a
/// long-lived SSE stream or a small job-control call, and keepalive reuse
/// against a backend that may restart on a different port does more harm
/// than good.
pub fn build_http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .pool_max_idle_per_host(0)
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}

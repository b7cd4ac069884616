//! Backend host discovery.
//!
//! The backend runs as a local service whose port is not fixed. Resolution
//! tries, in order: an override handed over by the embedding shell, a
//! well-known discovery endpoint, the previously cached answer, the
//! configured default, and finally a bounded port scan. The default and
//! every scanned candidate must pass the fingerprint probe; a health
//! response without the expected `service` value is rejected even when it
//! reports `ok: true`, so an unrelated service on the same port is never
//! mistaken for the backend.

use crate::error::BackendError;
use serde::Deserialize;
use std::sync::Mutex;
use std::time::Duration;
use tracing::debug;
use tracing::trace;

/// Value of the `service` field a genuine backend health response carries.
pub const SERVICE_FINGERPRINT: &str = "curator-backend";

pub const DEFAULT_PORT: u16 = 8787;

#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    /// Base URL handed over by an embedding shell over its IPC channel.
    /// Trusted as-is and checked first.
    pub host_hint: Option<String>,
    /// Well-known local endpoint answering `{"base_url": ...}`.
    pub discovery_url: Option<String>,
    /// Configured default; accepted only after the fingerprint probe.
    pub default_base_url: String,
    pub scan_host: String,
    pub scan_start_port: u16,
    /// Number of consecutive ports probed beyond the start port.
    pub scan_port_span: u16,
    pub probe_timeout: Duration,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            host_hint: None,
            discovery_url: None,
            default_base_url: format!("http://127.0.0.1:{DEFAULT_PORT}"),
            scan_host: "127.0.0.1".to_string(),
            scan_start_port: DEFAULT_PORT,
            scan_port_span: 10,
            probe_timeout: Duration::from_millis(750),
        }
    }
}

#[derive(Debug, Deserialize)]
struct HealthResponse {
    #[serde(default)]
    ok: bool,
    #[serde(default)]
    service: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DiscoveryResponse {
    base_url: String,
}

pub struct HostResolver {
    config: DiscoveryConfig,
    http: reqwest::Client,
    cached: Mutex<Option<String>>,
}

impl HostResolver {
    pub fn new(config: DiscoveryConfig) -> Self {
        Self {
            config,
            http: curator_client::build_http_client(),
            cached: Mutex::new(None),
        }
    }

    /// Resolves the backend base URL, caching the answer.
    pub async fn resolve(&self) -> Result<String, BackendError> {
        if let Some(hint) = &self.config.host_hint {
            return Ok(normalize(hint));
        }

        if let Some(discovery_url) = &self.config.discovery_url
            && let Some(base) = self.query_discovery_endpoint(discovery_url).await
        {
            return Ok(self.remember(base));
        }

        if let Some(cached) = self.cached_base() {
            return Ok(cached);
        }

        let default_base = normalize(&self.config.default_base_url);
        if self.probe(&default_base).await {
            return Ok(self.remember(default_base));
        }

        let start = self.config.scan_start_port;
        let end = start.saturating_add(self.config.scan_port_span);
        for port in start..=end {
            let candidate = format!("http://{}:{port}", self.config.scan_host);
            if candidate == default_base {
                continue;
            }
            if self.probe(&candidate).await {
                return Ok(self.remember(candidate));
            }
        }

        Err(BackendError::Discovery(format!(
            "no healthy backend at {default_base} or ports {start}-{end}"
        )))
    }

    /// Drops the cached base URL so the next request re-resolves; called
    /// after a request failure in case the backend restarted elsewhere.
    pub fn invalidate(&self) {
        if let Ok(mut cached) = self.cached.lock() {
            *cached = None;
        }
    }

    pub fn cached_base(&self) -> Option<String> {
        self.cached.lock().ok().and_then(|cached| cached.clone())
    }

    fn remember(&self, base: String) -> String {
        if let Ok(mut cached) = self.cached.lock() {
            *cached = Some(base.clone());
        }
        base
    }

    async fn query_discovery_endpoint(&self, discovery_url: &str) -> Option<String> {
        let resp = self
            .http
            .get(discovery_url)
            .timeout(self.config.probe_timeout)
            .send()
            .await
            .ok()?;
        if !resp.status().is_success() {
            return None;
        }
        let body: DiscoveryResponse = resp.json().await.ok()?;
        Some(normalize(&body.base_url))
    }

    /// Fingerprinted health probe; `ok` alone is not enough.
    async fn probe(&self, base_url: &str) -> bool {
        let url = format!("{base_url}/health");
        let resp = match self
            .http
            .get(&url)
            .timeout(self.config.probe_timeout)
            .send()
            .await
        {
            Ok(resp) => resp,
            Err(err) => {
                trace!("health probe {url} unreachable: {err}");
                return false;
            }
        };
        if !resp.status().is_success() {
            return false;
        }
        match resp.json::<HealthResponse>().await {
            Ok(health) => {
                let matched =
                    health.ok && health.service.as_deref() == Some(SERVICE_FINGERPRINT);
                if !matched {
                    debug!(
                        "rejecting {url}: ok={}, service={:?}",
                        health.ok, health.service
                    );
                }
                matched
            }
            Err(err) => {
                debug!("rejecting {url}: undecodable health body: {err}");
                false
            }
        }
    }
}

fn normalize(base_url: &str) -> String {
    base_url.trim_end_matches('/').to_string()
}

use std::time::Duration;

/// Sampling parameters forwarded to the model call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenerationParams {
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

/// Immutable configuration for one bulk rewrite run.
///
/// Created once per run and never mutated mid-run; workers share it by
/// reference.
#[derive(Debug, Clone)]
pub struct RewriterConfig {
    pub provider: String,
    pub model: String,
    pub base_url: String,
    /// Raw API key; wrapped by the key cipher before any network send.
    pub api_key: String,
    /// Maximum simultaneously in-flight model calls.
    pub concurrency: usize,
    /// Retries per item for retryable stream errors.
    pub max_retries: u32,
    pub retry_delay: Duration,
    /// Pause between a worker finishing one item and claiming the next.
    pub delay_between_calls: Duration,
    pub params: GenerationParams,
    /// When set, a combined rewrite asks the server for an explicit
    /// reasoning/answer split instead of splitting the raw text locally.
    pub split_fields: bool,
}

impl Default for RewriterConfig {
    fn default() -> Self {
        Self {
            provider: String::new(),
            model: String::new(),
            base_url: String::new(),
            api_key: String::new(),
            concurrency: 5,
            max_retries: 2,
            retry_delay: Duration::from_secs(1),
            delay_between_calls: Duration::ZERO,
            params: GenerationParams::default(),
            split_fields: false,
        }
    }
}

/// Immutable configuration for one bulk autoscore run.
#[derive(Debug, Clone)]
pub struct AutoscoreConfig {
    pub provider: String,
    pub model: String,
    pub base_url: String,
    pub api_key: String,
    pub concurrency: usize,
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub delay_between_calls: Duration,
    pub params: GenerationParams,
}

impl Default for AutoscoreConfig {
    fn default() -> Self {
        Self {
            provider: String::new(),
            model: String::new(),
            base_url: String::new(),
            api_key: String::new(),
            concurrency: 5,
            max_retries: 2,
            retry_delay: Duration::from_secs(1),
            delay_between_calls: Duration::ZERO,
            params: GenerationParams::default(),
        }
    }
}

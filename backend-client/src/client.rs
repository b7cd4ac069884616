use crate::discovery::DiscoveryConfig;
use crate::discovery::HostResolver;
use crate::error::BackendError;
use crate::types::AutoscoreJobParams;
use crate::types::MigrateReasoningJobParams;
use crate::types::RemoveItemsJobParams;
use crate::types::RewriteJobParams;
use crate::types::StartJobResponse;
use curator_protocol::Job;
use curator_protocol::JobProgress;
use curator_protocol::JobStatus;
use curator_protocol::JobType;
use http::Method;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;
use std::time::Instant;
use tokio::time::sleep;
use tracing::warn;

const REQUEST_ATTEMPTS: u32 = 3;
const REQUEST_RETRY_DELAY: Duration = Duration::from_millis(500);
const POLL_INTERVAL: Duration = Duration::from_secs(5);

const REWRITE_JOB_PATH: &str = "api/jobs/rewrite";
const AUTOSCORE_JOB_PATH: &str = "api/jobs/autoscore";
const MIGRATE_REASONING_JOB_PATH: &str = "api/jobs/migrate_reasoning";
const REMOVE_ITEMS_JOB_PATH: &str = "api/jobs/remove_items";

/// Receives each non-terminal job snapshot's progress while polling.
pub trait JobProgressReporter: Send + Sync {
    fn on_progress(&self, progress: &JobProgress);
}

/// Reporter for callers that only care about the terminal result.
pub struct NullProgressReporter;

impl JobProgressReporter for NullProgressReporter {
    fn on_progress(&self, _progress: &JobProgress) {}
}

pub struct BackendClient {
    resolver: HostResolver,
    http: reqwest::Client,
    poll_interval: Duration,
    /// Optional wall-clock ceiling on a poll loop. Jobs may legitimately
    /// run for a very long time, so there is no default.
    poll_ceiling: Option<Duration>,
}

impl BackendClient {
    pub fn new(config: DiscoveryConfig) -> Self {
        Self {
            resolver: HostResolver::new(config),
            http: curator_client::build_http_client(),
            poll_interval: POLL_INTERVAL,
            poll_ceiling: None,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_poll_ceiling(mut self, ceiling: Option<Duration>) -> Self {
        self.poll_ceiling = ceiling;
        self
    }

    pub fn resolver(&self) -> &HostResolver {
        &self.resolver
    }

    pub async fn start_rewrite(&self, params: &RewriteJobParams) -> Result<String, BackendError> {
        self.start_job(REWRITE_JOB_PATH, to_params_value(params)?).await
    }

    pub async fn start_autoscore(
        &self,
        params: &AutoscoreJobParams,
    ) -> Result<String, BackendError> {
        self.start_job(AUTOSCORE_JOB_PATH, to_params_value(params)?)
            .await
    }

    pub async fn start_migrate_reasoning(
        &self,
        params: &MigrateReasoningJobParams,
    ) -> Result<String, BackendError> {
        self.start_job(MIGRATE_REASONING_JOB_PATH, to_params_value(params)?)
            .await
    }

    pub async fn start_remove_items(
        &self,
        params: &RemoveItemsJobParams,
    ) -> Result<String, BackendError> {
        self.start_job(REMOVE_ITEMS_JOB_PATH, to_params_value(params)?)
            .await
    }

    pub async fn fetch_job(&self, id: &str) -> Result<Job, BackendError> {
        self.request_json(Method::GET, &format!("api/jobs/{id}"), None)
            .await
    }

    /// Polls `id` to a terminal status.
    ///
    /// Each non-terminal snapshot's progress goes to `reporter`; the loop
    /// runs until the job terminates (or the optional ceiling elapses).
    /// Dropping the future abandons polling cleanly.
    pub async fn poll_job(
        &self,
        id: &str,
        reporter: &dyn JobProgressReporter,
    ) -> Result<Value, BackendError> {
        let started = Instant::now();
        loop {
            let job = self.fetch_job(id).await?;
            match job.status {
                JobStatus::Completed => return Ok(job.result.unwrap_or(Value::Null)),
                JobStatus::Failed => {
                    return Err(BackendError::JobFailed {
                        id: id.to_string(),
                        message: job
                            .error
                            .unwrap_or_else(|| "job failed without a stored error".to_string()),
                    });
                }
                JobStatus::Cancelled => {
                    return Err(BackendError::JobCancelled { id: id.to_string() });
                }
                JobStatus::Pending | JobStatus::Running => {
                    reporter.on_progress(&job.progress);
                    if let Some(ceiling) = self.poll_ceiling
                        && started.elapsed() >= ceiling
                    {
                        return Err(BackendError::PollCeilingExceeded {
                            id: id.to_string(),
                            ceiling,
                        });
                    }
                    sleep(self.poll_interval).await;
                }
            }
        }
    }

    pub async fn cancel_job(&self, id: &str) -> Result<(), BackendError> {
        let _: Value = self
            .request_json(
                Method::POST,
                &format!("api/jobs/{id}/cancel"),
                Some(Value::Object(serde_json::Map::new())),
            )
            .await?;
        Ok(())
    }

    /// Resubmits a finished job from its stored params.
    ///
    /// Takes the caller's job snapshot so that a job without reusable
    /// params is rejected before any network traffic. The fresh wrapped
    /// API key replaces the stored one for job types that carry
    /// credentials; the request goes to the start endpoint matching the
    /// job's type.
    pub async fn rerun_job(
        &self,
        job: &Job,
        fresh_wrapped_key: &str,
    ) -> Result<String, BackendError> {
        let Some(params) = job.params.clone() else {
            return Err(BackendError::MissingParams {
                id: job.id.clone(),
            });
        };

        let path = match job.job_type {
            JobType::Rewrite => REWRITE_JOB_PATH,
            JobType::Autoscore => AUTOSCORE_JOB_PATH,
            JobType::MigrateReasoning => MIGRATE_REASONING_JOB_PATH,
            JobType::RemoveItems => REMOVE_ITEMS_JOB_PATH,
            JobType::OrphanCheck | JobType::OrphanSync => {
                return Err(BackendError::UnsupportedRerun {
                    job_type: job.job_type,
                });
            }
        };

        let mut params = params;
        if matches!(job.job_type, JobType::Rewrite | JobType::Autoscore)
            && let Some(map) = params.as_object_mut()
        {
            map.insert(
                "api_key".to_string(),
                Value::String(fresh_wrapped_key.to_string()),
            );
        }

        self.start_job(path, params).await
    }

    async fn start_job(&self, path: &str, params: Value) -> Result<String, BackendError> {
        let resp: StartJobResponse = self
            .request_json(Method::POST, path, Some(params))
            .await?;
        Ok(resp.job_id)
    }

    /// One backend request under the fixed retry budget.
    ///
    /// The first failure invalidates the cached base URL so the next
    /// attempt re-resolves it — the backend may have restarted on a
    /// different port.
    async fn request_json<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<T, BackendError> {
        let mut last_err: Option<BackendError> = None;
        for attempt in 0..REQUEST_ATTEMPTS {
            if attempt > 0 {
                sleep(REQUEST_RETRY_DELAY).await;
            }
            match self.try_request(method.clone(), path, body.as_ref()).await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    warn!(attempt, path, error = %err, "backend request failed");
                    if attempt == 0 {
                        self.resolver.invalidate();
                    }
                    last_err = Some(err);
                }
            }
        }
        Err(last_err
            .unwrap_or_else(|| BackendError::Discovery("request made no attempts".to_string())))
    }

    async fn try_request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<T, BackendError> {
        let base = self.resolver.resolve().await?;
        let url = format!("{base}/{}", path.trim_start_matches('/'));

        let mut req = self.http.request(method, &url);
        if let Some(body) = body {
            req = req.json(body);
        }

        let resp = req.send().await.map_err(|err| BackendError::Request {
            url: url.clone(),
            message: err.to_string(),
        })?;
        let status = resp.status();
        let text = resp.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(BackendError::Http {
                status: status.as_u16(),
                url,
                body: text,
            });
        }
        serde_json::from_str(&text).map_err(|err| BackendError::Decode {
            url,
            message: err.to_string(),
        })
    }
}

fn to_params_value<P: Serialize>(params: &P) -> Result<Value, BackendError> {
    serde_json::to_value(params).map_err(|err| BackendError::Encode(err.to_string()))
}

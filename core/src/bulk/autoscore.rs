use crate::bulk::BulkProgress;
use crate::bulk::BulkProgressReporter;
use crate::bulk::BulkSummary;
use crate::bulk::Orchestrator;
use crate::bulk::pool::run_claim_pool;
use crate::bulk::rewrite::JobToBulkProgress;
use crate::context::DataSource;
use crate::context::RunContext;
use crate::error::CoreError;
use crate::extract;
use curator_api::ApiError;
use curator_api::GenerateStreamRequest;
use curator_api::StreamAuth;
use curator_backend_client::AutoscoreJobParams;
use curator_client::HttpTransport;
use curator_protocol::AutoscoreConfig;
use curator_protocol::ReviewItem;
use std::ops::ControlFlow;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::warn;

impl<T: HttpTransport> Orchestrator<T> {
    /// Scores the selected items 1-5 with one model call each.
    ///
    /// Same routing and pool shape as `bulk_rewrite`; a response with no
    /// usable 1-5 digit scores 0 and leaves the item unmodified, which
    /// counts as a failure but not an error.
    pub async fn bulk_autoscore(
        &self,
        ctx: &RunContext,
        item_ids: &[String],
        config: &AutoscoreConfig,
        reporter: &dyn BulkProgressReporter,
    ) -> Result<BulkSummary, CoreError> {
        if item_ids.is_empty() {
            return Ok(BulkSummary::default());
        }

        if let Some(backend) = self.backend.clone()
            && ctx.source == DataSource::Database
        {
            let session_uid = ctx
                .session
                .resolved_uid()
                .ok_or(CoreError::NoSessionSelected)?;

            let wrapped_key = self
                .cipher
                .wrap(&config.api_key)
                .map_err(|err| ApiError::KeyCipher(err.to_string()))?;
            let params = AutoscoreJobParams {
                session_uid: session_uid.to_string(),
                item_ids: item_ids.to_vec(),
                provider: config.provider.clone(),
                model: config.model.clone(),
                base_url: config.base_url.clone(),
                api_key: wrapped_key,
                temperature: config.params.temperature,
                max_tokens: config.params.max_tokens,
            };

            let job_id = backend.start_autoscore(&params).await?;
            debug!(%job_id, items = item_ids.len(), "autoscore delegated to backend");
            match backend.poll_job(&job_id, &JobToBulkProgress(reporter)).await {
                Ok(result) => {
                    let summary = BulkSummary::from_job_result(&result);
                    self.notifier.success(&format!(
                        "Autoscore finished: {} scored, {} failed",
                        summary.succeeded, summary.failed
                    ));
                    return Ok(summary);
                }
                Err(err) => {
                    self.notifier.error(&format!("Autoscore job failed: {err}"));
                    return Err(err.into());
                }
            }
        }

        let total = item_ids.len();
        let progress = AtomicUsize::new(0);
        let succeeded = AtomicUsize::new(0);
        let failed = AtomicUsize::new(0);

        let work = |index: usize| {
            let progress = &progress;
            let succeeded = &succeeded;
            let failed = &failed;
            let id = &item_ids[index];
            async move {
                match self.score_one(ctx, id, config).await {
                    Ok(score) if score > 0 => {
                        succeeded.fetch_add(1, Ordering::SeqCst);
                    }
                    Ok(_) => {
                        debug!(item = %id, "no usable score in response");
                        failed.fetch_add(1, Ordering::SeqCst);
                    }
                    Err(err) => {
                        warn!(item = %id, error = %err, "autoscore item failed");
                        failed.fetch_add(1, Ordering::SeqCst);
                    }
                }
                let current = progress.fetch_add(1, Ordering::SeqCst) + 1;
                reporter.on_progress(BulkProgress { current, total });
            }
        };
        run_claim_pool(total, config.concurrency, config.delay_between_calls, work).await;

        let summary = BulkSummary {
            succeeded: succeeded.load(Ordering::SeqCst),
            failed: failed.load(Ordering::SeqCst),
        };
        if summary.failed == 0 {
            self.notifier
                .success(&format!("Scored {} items", summary.succeeded));
        } else {
            self.notifier.warning(&format!(
                "Scored {} items, {} failed",
                summary.succeeded, summary.failed
            ));
        }
        Ok(summary)
    }

    /// Returns the extracted score; 0 means the response held no 1-5 digit
    /// and the item was left untouched.
    async fn score_one(
        &self,
        ctx: &RunContext,
        id: &str,
        config: &AutoscoreConfig,
    ) -> Result<u8, CoreError> {
        let item = self
            .store
            .get(id)
            .await
            .ok_or_else(|| CoreError::ItemNotFound(id.to_string()))?;

        let request = build_score_request(&item, config);
        let text = self.call_generate_with_retry(&request, config).await?;

        let score = extract::first_score_digit(&text);
        if score > 0 {
            let mut updated = item;
            updated.set_score(score);
            self.store.put(updated.clone()).await;
            self.persist_detached(ctx, updated);
        }
        Ok(score)
    }

    async fn call_generate_with_retry(
        &self,
        request: &GenerateStreamRequest,
        config: &AutoscoreConfig,
    ) -> Result<String, ApiError> {
        let auth = StreamAuth {
            cipher: self.cipher.as_ref(),
            api_key: &config.api_key,
        };
        let mut attempt = 0u32;
        loop {
            let cancel = CancellationToken::new();
            let mut accumulated = String::new();
            let result = self
                .ai
                .stream_generate(request, auth, &cancel, |chunk| {
                    accumulated.push_str(&chunk.text);
                    ControlFlow::Continue(())
                })
                .await;
            match result {
                Ok(outcome) => {
                    return Ok(if outcome.content.is_empty() {
                        accumulated
                    } else {
                        outcome.content
                    });
                }
                Err(err) if err.is_retryable() && attempt < config.max_retries => {
                    attempt += 1;
                    debug!(attempt, error = %err, "retrying autoscore call");
                    sleep(config.retry_delay).await;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

fn build_score_request(item: &ReviewItem, config: &AutoscoreConfig) -> GenerateStreamRequest {
    GenerateStreamRequest {
        model: config.model.clone(),
        prompt: format!(
            "Rate the quality of this training example on a scale of 1 to 5, \
             where 5 means the reasoning fully supports a correct, well-formed \
             answer. Respond with a single digit.\n\n\
             Query:\n{}\n\nReasoning:\n{}\n\nAnswer:\n{}",
            item.query, item.reasoning, item.answer
        ),
        temperature: config.params.temperature,
        max_tokens: config.params.max_tokens,
        stream: true,
    }
}

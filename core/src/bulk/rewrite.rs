use crate::bulk::BulkProgress;
use crate::bulk::BulkProgressReporter;
use crate::bulk::BulkSummary;
use crate::bulk::Orchestrator;
use crate::bulk::pool::run_claim_pool;
use crate::context::DataSource;
use crate::context::RunContext;
use crate::error::CoreError;
use crate::extract;
use curator_api::ApiError;
use curator_api::RewriteStreamRequest;
use curator_api::StreamAuth;
use curator_api::StreamOutcome;
use curator_backend_client::JobProgressReporter;
use curator_backend_client::RewriteJobParams;
use curator_client::HttpTransport;
use curator_protocol::JobProgress;
use curator_protocol::ReviewItem;
use curator_protocol::RewriteField;
use curator_protocol::RewriteTarget;
use curator_protocol::RewriterConfig;
use std::ops::ControlFlow;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::warn;

/// Bridges backend job progress into the bulk progress callback.
pub(crate) struct JobToBulkProgress<'a>(pub &'a dyn BulkProgressReporter);

impl JobProgressReporter for JobToBulkProgress<'_> {
    fn on_progress(&self, progress: &JobProgress) {
        self.0.on_progress(BulkProgress {
            current: progress.current as usize,
            total: progress.total as usize,
        });
    }
}

impl<T: HttpTransport> Orchestrator<T> {
    /// Rewrites `target` across the selected items.
    ///
    /// With a backend configured, a database-backed source, and a concrete
    /// session in view, the whole batch becomes one backend job; otherwise
    /// an in-process pool of `min(concurrency, items)` workers streams one
    /// rewrite per item. The local pool is intentionally not cancellable
    /// mid-run — only the backend job path is (via `cancel_job`).
    pub async fn bulk_rewrite(
        &self,
        ctx: &RunContext,
        item_ids: &[String],
        target: RewriteTarget,
        config: &RewriterConfig,
        reporter: &dyn BulkProgressReporter,
    ) -> Result<BulkSummary, CoreError> {
        if target.is_message_target() {
            return Err(CoreError::UnsupportedTarget(target));
        }
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
            let params = RewriteJobParams {
                session_uid: session_uid.to_string(),
                item_ids: item_ids.to_vec(),
                fields: target.backend_fields(),
                provider: config.provider.clone(),
                model: config.model.clone(),
                base_url: config.base_url.clone(),
                api_key: wrapped_key,
                temperature: config.params.temperature,
                max_tokens: config.params.max_tokens,
            };

            let job_id = backend.start_rewrite(&params).await?;
            debug!(%job_id, items = item_ids.len(), "rewrite delegated to backend");
            match backend.poll_job(&job_id, &JobToBulkProgress(reporter)).await {
                Ok(result) => {
                    let summary = BulkSummary::from_job_result(&result);
                    self.notifier.success(&format!(
                        "Rewrite finished: {} updated, {} failed",
                        summary.succeeded, summary.failed
                    ));
                    return Ok(summary);
                }
                Err(err) => {
                    self.notifier.error(&format!("Rewrite job failed: {err}"));
                    return Err(err.into());
                }
            }
        }

        let summary = self
            .local_rewrite_pool(ctx, item_ids, target, config, reporter)
            .await;
        if summary.failed == 0 {
            self.notifier
                .success(&format!("Rewrote {} items", summary.succeeded));
        } else {
            self.notifier.warning(&format!(
                "Rewrote {} items, {} failed",
                summary.succeeded, summary.failed
            ));
        }
        Ok(summary)
    }

    async fn local_rewrite_pool(
        &self,
        ctx: &RunContext,
        item_ids: &[String],
        target: RewriteTarget,
        config: &RewriterConfig,
        reporter: &dyn BulkProgressReporter,
    ) -> BulkSummary {
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
                match self.rewrite_one(ctx, id, target, config).await {
                    Ok(()) => {
                        succeeded.fetch_add(1, Ordering::SeqCst);
                    }
                    Err(err) => {
                        // Per-item failures never stop the pool.
                        warn!(item = %id, error = %err, "bulk rewrite item failed");
                        failed.fetch_add(1, Ordering::SeqCst);
                    }
                }
                let current = progress.fetch_add(1, Ordering::SeqCst) + 1;
                reporter.on_progress(BulkProgress { current, total });
            }
        };
        run_claim_pool(total, config.concurrency, config.delay_between_calls, work).await;

        BulkSummary {
            succeeded: succeeded.load(Ordering::SeqCst),
            failed: failed.load(Ordering::SeqCst),
        }
    }

    async fn rewrite_one(
        &self,
        ctx: &RunContext,
        id: &str,
        target: RewriteTarget,
        config: &RewriterConfig,
    ) -> Result<(), CoreError> {
        let item = self
            .store
            .get(id)
            .await
            .ok_or_else(|| CoreError::ItemNotFound(id.to_string()))?;

        let request = if target.is_combined() {
            build_both_request(&item, config)
        } else {
            build_field_request(&item, target.fields()[0], config)
        };

        let outcome = self.call_rewrite_with_retry(&request, config).await?;

        let mut updated = item.clone();
        apply_item_rewrite(&mut updated, &item, target, &outcome);
        self.store.put(updated.clone()).await;
        self.persist_detached(ctx, updated);
        Ok(())
    }

    /// One streaming rewrite call, retried on retryable stream errors under
    /// the per-run retry budget.
    pub(crate) async fn call_rewrite_with_retry(
        &self,
        request: &RewriteStreamRequest,
        config: &RewriterConfig,
    ) -> Result<StreamOutcome, ApiError> {
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
                .stream_rewrite(request, auth, &cancel, |chunk| {
                    accumulated.push_str(&chunk.text);
                    ControlFlow::Continue(())
                })
                .await;
            match result {
                Ok(mut outcome) => {
                    if outcome.content.is_empty() {
                        outcome.content = accumulated;
                    }
                    return Ok(outcome);
                }
                Err(err) if err.is_retryable() && attempt < config.max_retries => {
                    attempt += 1;
                    debug!(attempt, error = %err, "retrying rewrite call");
                    sleep(config.retry_delay).await;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

/// Writes a rewrite outcome into `updated`, reading fallbacks from the
/// item's prior state.
pub(crate) fn apply_item_rewrite(
    updated: &mut ReviewItem,
    prior: &ReviewItem,
    target: RewriteTarget,
    outcome: &StreamOutcome,
) {
    if target.is_combined() {
        let (reasoning, answer) = decompose_both(outcome);
        // A split that produced only one usable side keeps the other
        // field's prior value instead of blanking it.
        let reasoning = reasoning.unwrap_or_else(|| prior.reasoning.clone());
        let answer = answer.unwrap_or_else(|| prior.answer.clone());
        updated.set_field(RewriteField::Reasoning, extract::strip_think_markup(&reasoning));
        updated.set_field(RewriteField::Answer, answer);
        return;
    }

    let field = target.fields()[0];
    let mut value = extract::field_value(&outcome.content, field);
    if field == RewriteField::Reasoning {
        value = extract::strip_think_markup(&value);
    }
    updated.set_field(field, value);
}

/// Splits a combined outcome into (reasoning, answer), preferring the
/// server's own decomposition over a local split of the raw text.
pub(crate) fn decompose_both(outcome: &StreamOutcome) -> (Option<String>, Option<String>) {
    if outcome.reasoning.is_some() || outcome.answer.is_some() {
        (outcome.reasoning.clone(), outcome.answer.clone())
    } else {
        extract::split_reasoning_answer(&outcome.content)
    }
}

pub(crate) fn build_field_request(
    item: &ReviewItem,
    field: RewriteField,
    config: &RewriterConfig,
) -> RewriteStreamRequest {
    let instruction = match field {
        RewriteField::Query => {
            "Rewrite the question to be clearer and more natural while keeping its intent."
        }
        RewriteField::Reasoning => {
            "Rewrite the reasoning into a clear step-by-step derivation of the answer."
        }
        RewriteField::Answer => "Rewrite the answer to be correct, concise, and well-formatted.",
    };
    RewriteStreamRequest {
        model: config.model.clone(),
        instruction: instruction.to_string(),
        input: item.field(field).to_string(),
        context: (field != RewriteField::Query).then(|| item.query.clone()),
        split_fields: false,
        temperature: config.params.temperature,
        max_tokens: config.params.max_tokens,
        stream: true,
    }
}

pub(crate) fn build_both_request(item: &ReviewItem, config: &RewriterConfig) -> RewriteStreamRequest {
    RewriteStreamRequest {
        model: config.model.clone(),
        instruction: "Rewrite both the reasoning and the answer for this question. \
                      Keep the reasoning a faithful derivation of the answer."
            .to_string(),
        input: format!("Reasoning:\n{}\n\nAnswer:\n{}", item.reasoning, item.answer),
        context: Some(item.query.clone()),
        split_fields: config.split_fields,
        temperature: config.params.temperature,
        max_tokens: config.params.max_tokens,
        stream: true,
    }
}

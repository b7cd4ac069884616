use crate::auth::StreamAuth;
use crate::auth::add_auth_header;
use crate::common::ChatStreamRequest;
use crate::common::EventStream;
use crate::common::GenerateStreamRequest;
use crate::common::RewriteStreamRequest;
use crate::common::StreamChunk;
use crate::common::StreamOutcome;
use crate::error::ApiError;
use crate::provider::Provider;
use crate::sse::collect_stream;
use crate::sse::spawn_event_stream;
use curator_client::HttpTransport;
use curator_client::run_with_retry;
use http::HeaderValue;
use http::Method;
use serde::Serialize;
use serde_json::Value;
use std::ops::ControlFlow;
use tokio_util::sync::CancellationToken;

const GENERATE_PATH: &str = "api/ai/generate/stream";
const CHAT_PATH: &str = "api/ai/chat/stream";
const REWRITE_PATH: &str = "api/ai/rewrite/stream";

/// Streaming model-call client over one [`HttpTransport`].
pub struct AiClient<T: HttpTransport> {
    transport: T,
    provider: Provider,
}

impl<T: HttpTransport> AiClient<T> {
    pub fn new(transport: T, provider: Provider) -> Self {
        Self {
            transport,
            provider,
        }
    }

    pub fn provider(&self) -> &Provider {
        &self.provider
    }

    pub async fn stream_generate<F>(
        &self,
        request: &GenerateStreamRequest,
        auth: StreamAuth<'_>,
        cancel: &CancellationToken,
        on_chunk: F,
    ) -> Result<StreamOutcome, ApiError>
    where
        F: FnMut(&StreamChunk) -> ControlFlow<()> + Send,
    {
        let body = encode_body(request, "generate")?;
        let stream = self.open_stream(GENERATE_PATH, body, auth, cancel).await?;
        collect_stream(stream, cancel, on_chunk).await
    }

    pub async fn stream_chat<F>(
        &self,
        request: &ChatStreamRequest,
        auth: StreamAuth<'_>,
        cancel: &CancellationToken,
        on_chunk: F,
    ) -> Result<StreamOutcome, ApiError>
    where
        F: FnMut(&StreamChunk) -> ControlFlow<()> + Send,
    {
        let body = encode_body(request, "chat")?;
        let stream = self.open_stream(CHAT_PATH, body, auth, cancel).await?;
        collect_stream(stream, cancel, on_chunk).await
    }

    pub async fn stream_rewrite<F>(
        &self,
        request: &RewriteStreamRequest,
        auth: StreamAuth<'_>,
        cancel: &CancellationToken,
        on_chunk: F,
    ) -> Result<StreamOutcome, ApiError>
    where
        F: FnMut(&StreamChunk) -> ControlFlow<()> + Send,
    {
        let body = encode_body(request, "rewrite")?;
        let stream = self.open_stream(REWRITE_PATH, body, auth, cancel).await?;
        collect_stream(stream, cancel, on_chunk).await
    }

    /// Opens the SSE connection and hands the byte stream to the decoder.
    ///
    /// The connect itself is retried under the provider policy and stays
    /// responsive to the cancel token; a non-2xx response surfaces the full
    /// body text before any stream parsing.
    async fn open_stream(
        &self,
        path: &str,
        body: Value,
        auth: StreamAuth<'_>,
        cancel: &CancellationToken,
    ) -> Result<EventStream, ApiError> {
        let wrapped_key = auth.wrapped()?;
        let policy = self.provider.retry.to_policy();

        let connect = run_with_retry(policy, || {
            let body = body.clone();
            let wrapped_key = wrapped_key.clone();
            async move {
                let mut req = self.provider.build_request(Method::POST, path);
                req.headers.insert(
                    http::header::ACCEPT,
                    HeaderValue::from_static("text/event-stream"),
                );
                add_auth_header(&mut req, &wrapped_key)
                    .map_err(|err| curator_client::TransportError::Build(err.to_string()))?;
                req.body = Some(body);
                self.transport.stream(req).await
            }
        });

        let stream_response = tokio::select! {
            _ = cancel.cancelled() => return Err(ApiError::Aborted),
            connected = connect => connected?,
        };

        Ok(spawn_event_stream(
            stream_response,
            self.provider.stream_idle_grace,
            cancel.child_token(),
        ))
    }
}

fn encode_body<R: Serialize>(request: &R, kind: &str) -> Result<Value, ApiError> {
    serde_json::to_value(request)
        .map_err(|err| ApiError::Stream(format!("failed to encode {kind} request: {err}")))
}

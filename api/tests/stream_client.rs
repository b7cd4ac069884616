use assert_matches::assert_matches;
use async_trait::async_trait;
use bytes::Bytes;
use curator_api::AiClient;
use curator_api::ApiError;
use curator_api::GenerateStreamRequest;
use curator_api::KeyCipher;
use curator_api::KeyCipherError;
use curator_api::Provider;
use curator_api::RetryConfig;
use curator_api::StreamAuth;
use curator_client::HttpTransport;
use curator_client::ReqwestTransport;
use curator_client::Request;
use curator_client::Response;
use curator_client::StreamResponse;
use curator_client::TransportError;
use http::HeaderMap;
use http::StatusCode;
use pretty_assertions::assert_eq;
use std::ops::ControlFlow;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use wiremock::Mock;
use wiremock::MockServer;
use wiremock::ResponseTemplate;
use wiremock::matchers::header;
use wiremock::matchers::method;
use wiremock::matchers::path;

struct TestCipher;

impl KeyCipher for TestCipher {
    fn wrap(&self, raw_key: &str) -> Result<String, KeyCipherError> {
        Ok(format!("wrapped:{raw_key}"))
    }
}

#[derive(Clone)]
struct FixtureSseTransport {
    body: String,
}

#[async_trait]
impl HttpTransport for FixtureSseTransport {
    async fn execute(&self, _req: Request) -> Result<Response, TransportError> {
        Err(TransportError::Build("execute should not run".to_string()))
    }

    async fn stream(&self, _req: Request) -> Result<StreamResponse, TransportError> {
        let stream = futures::stream::iter(vec![Ok::<Bytes, TransportError>(Bytes::from(
            self.body.clone(),
        ))]);
        Ok(StreamResponse {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            bytes: Box::pin(stream),
        })
    }
}

fn provider(base_url: &str) -> Provider {
    Provider {
        name: "test".to_string(),
        base_url: base_url.to_string(),
        headers: HeaderMap::new(),
        retry: RetryConfig {
            max_attempts: 1,
            base_delay: Duration::from_millis(1),
            retry_429: false,
            retry_5xx: false,
            retry_transport: false,
        },
        stream_idle_grace: Duration::from_millis(100),
    }
}

fn generate_request() -> GenerateStreamRequest {
    GenerateStreamRequest {
        model: "test-model".to_string(),
        prompt: "rate this".to_string(),
        temperature: None,
        max_tokens: None,
        stream: true,
    }
}

#[tokio::test]
async fn generate_stream_delivers_chunks_and_terminal_result() {
    let body = "event: chunk\ndata: {\"text\":\"4 ou\"}\n\n\
                event: chunk\ndata: {\"text\":\"t of 5\"}\n\n\
                event: done\ndata: {\"content\":\"4 out of 5\",\"usage\":{\"total_tokens\":12}}\n\n";
    let client = AiClient::new(
        FixtureSseTransport {
            body: body.to_string(),
        },
        provider("https://example.com"),
    );

    let cancel = CancellationToken::new();
    let mut accumulated = String::new();
    let outcome = client
        .stream_generate(
            &generate_request(),
            StreamAuth {
                cipher: &TestCipher,
                api_key: "sk-raw",
            },
            &cancel,
            |chunk| {
                accumulated.push_str(&chunk.text);
                ControlFlow::Continue(())
            },
        )
        .await
        .expect("stream");

    assert_eq!(accumulated, "4 out of 5");
    assert_eq!(outcome.content, "4 out of 5");
    assert_eq!(outcome.usage.map(|u| u.total_tokens), Some(12));
}

#[tokio::test]
async fn missing_api_key_fails_before_any_request() {
    let client = AiClient::new(
        FixtureSseTransport {
            body: String::new(),
        },
        provider("https://example.com"),
    );
    let cancel = CancellationToken::new();
    let err = client
        .stream_generate(
            &generate_request(),
            StreamAuth {
                cipher: &TestCipher,
                api_key: "",
            },
            &cancel,
            |_| ControlFlow::Continue(()),
        )
        .await
        .expect_err("must fail");
    assert_matches!(err, ApiError::MissingApiKey);
}

#[tokio::test]
async fn early_stop_returns_partial_result() {
    let body = "event: chunk\ndata: {\"text\":\"one\"}\n\n\
                event: chunk\ndata: {\"text\":\"two\"}\n\n\
                event: done\ndata: {\"content\":\"onetwo\"}\n\n";
    let client = AiClient::new(
        FixtureSseTransport {
            body: body.to_string(),
        },
        provider("https://example.com"),
    );

    let cancel = CancellationToken::new();
    let mut chunks = 0;
    let outcome = client
        .stream_generate(
            &generate_request(),
            StreamAuth {
                cipher: &TestCipher,
                api_key: "sk-raw",
            },
            &cancel,
            |_| {
                chunks += 1;
                ControlFlow::Break(())
            },
        )
        .await
        .expect("stream");

    assert_eq!(chunks, 1);
    // Stopped before the done event: empty-but-valid result.
    assert_eq!(outcome.content, "");
    assert!(cancel.is_cancelled());
}

#[tokio::test]
async fn non_2xx_reads_full_body_before_failing() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/ai/generate/stream"))
        .and(header("accept", "text/event-stream"))
        .and(header("authorization", "Bearer wrapped:sk-raw"))
        .respond_with(ResponseTemplate::new(401).set_body_string("invalid api key"))
        .mount(&server)
        .await;

    let client = AiClient::new(
        ReqwestTransport::new(curator_client::build_http_client()),
        provider(&server.uri()),
    );
    let cancel = CancellationToken::new();
    let err = client
        .stream_generate(
            &generate_request(),
            StreamAuth {
                cipher: &TestCipher,
                api_key: "sk-raw",
            },
            &cancel,
            |_| ControlFlow::Continue(()),
        )
        .await
        .expect_err("must fail");

    match err {
        ApiError::Transport(TransportError::Http { status, body, .. }) => {
            assert_eq!(status, StatusCode::UNAUTHORIZED);
            assert_eq!(body.as_deref(), Some("invalid api key"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

/// A transport whose stream errors with a generic network failure as soon
/// as the cancel token fires, mimicking a connection torn down mid-chunk.
struct DropOnCancelTransport {
    cancel: CancellationToken,
}

#[async_trait]
impl HttpTransport for DropOnCancelTransport {
    async fn execute(&self, _req: Request) -> Result<Response, TransportError> {
        Err(TransportError::Build("execute should not run".to_string()))
    }

    async fn stream(&self, _req: Request) -> Result<StreamResponse, TransportError> {
        let cancel = self.cancel.clone();
        let stream = futures::stream::once(async move {
            cancel.cancelled().await;
            Err::<Bytes, _>(TransportError::Network("connection reset".to_string()))
        });
        Ok(StreamResponse {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            bytes: Box::pin(stream),
        })
    }
}

#[tokio::test]
async fn cancel_mid_stream_is_normalized_to_aborted() {
    let cancel = CancellationToken::new();
    let client = AiClient::new(
        DropOnCancelTransport {
            cancel: cancel.clone(),
        },
        provider("https://example.com"),
    );

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        trigger.cancel();
    });

    let err = client
        .stream_generate(
            &generate_request(),
            StreamAuth {
                cipher: &TestCipher,
                api_key: "sk-raw",
            },
            &cancel,
            |_| ControlFlow::Continue(()),
        )
        .await
        .expect_err("must abort");

    // Whether the token or the dying connection is observed first, the
    // caller sees exactly one "aborted" error kind.
    assert!(err.is_abort(), "expected abort, got: {err:?}");
}

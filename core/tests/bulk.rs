use async_trait::async_trait;
use bytes::Bytes;
use curator_api::AiClient;
use curator_api::KeyCipher;
use curator_api::KeyCipherError;
use curator_api::Provider;
use curator_api::RetryConfig;
use curator_backend_client::BackendClient;
use curator_backend_client::DiscoveryConfig;
use curator_client::HttpTransport;
use curator_client::Request;
use curator_client::Response;
use curator_client::StreamResponse;
use curator_client::TransportError;
use curator_core::BulkProgress;
use curator_core::BulkProgressReporter;
use curator_core::CoreError;
use curator_core::DataSource;
use curator_core::ItemStore;
use curator_core::MemoryStore;
use curator_core::Orchestrator;
use curator_core::RunContext;
use curator_core::SessionSelection;
use curator_protocol::AutoscoreConfig;
use curator_protocol::ReviewItem;
use curator_protocol::RewriteTarget;
use curator_protocol::RewriterConfig;
use http::HeaderMap;
use http::StatusCode;
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::time::Duration;
use wiremock::Mock;
use wiremock::MockServer;
use wiremock::ResponseTemplate;
use wiremock::matchers::body_partial_json;
use wiremock::matchers::method;
use wiremock::matchers::path;

struct TestCipher;

impl KeyCipher for TestCipher {
    fn wrap(&self, raw_key: &str) -> Result<String, KeyCipherError> {
        Ok(format!("wrapped:{raw_key}"))
    }
}

type BodyFn = Box<dyn Fn(&Request) -> String + Send + Sync>;

/// Serves a canned SSE body per request and records how many streams are
/// in flight simultaneously.
struct FakeStreamTransport {
    body_for: BodyFn,
    in_flight: AtomicUsize,
    high_water: AtomicUsize,
}

impl FakeStreamTransport {
    fn new(body_for: BodyFn) -> Self {
        Self {
            body_for,
            in_flight: AtomicUsize::new(0),
            high_water: AtomicUsize::new(0),
        }
    }

    fn high_water(&self) -> usize {
        self.high_water.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HttpTransport for FakeStreamTransport {
    async fn execute(&self, _req: Request) -> Result<Response, TransportError> {
        Err(TransportError::Build("execute should not run".to_string()))
    }

    async fn stream(&self, req: Request) -> Result<StreamResponse, TransportError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.high_water.fetch_max(now, Ordering::SeqCst);
        // Hold the call open long enough for overlap to be observable.
        tokio::time::sleep(Duration::from_millis(5)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let body = (self.body_for)(&req);
        let stream =
            futures::stream::iter(vec![Ok::<Bytes, TransportError>(Bytes::from(body))]);
        Ok(StreamResponse {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            bytes: Box::pin(stream),
        })
    }
}

struct RecordingReporter {
    snapshots: Mutex<Vec<BulkProgress>>,
}

impl RecordingReporter {
    fn new() -> Self {
        Self {
            snapshots: Mutex::new(Vec::new()),
        }
    }

    fn progress(&self) -> Vec<BulkProgress> {
        self.snapshots.lock().expect("lock").clone()
    }
}

impl BulkProgressReporter for RecordingReporter {
    fn on_progress(&self, progress: BulkProgress) {
        self.snapshots.lock().expect("lock").push(progress);
    }
}

fn items(n: usize) -> Vec<ReviewItem> {
    (0..n)
        .map(|i| {
            let mut item = ReviewItem::new(format!("item-{i}"));
            item.query = format!("what is {i} + {i}?");
            item.reasoning = format!("add {i} and {i}");
            item.answer = format!("{}", i + i);
            item
        })
        .collect()
}

fn ids(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("item-{i}")).collect()
}

fn provider() -> Provider {
    Provider {
        name: "test".to_string(),
        base_url: "https://example.com".to_string(),
        headers: HeaderMap::new(),
        retry: RetryConfig {
            max_attempts: 1,
            base_delay: Duration::from_millis(1),
            retry_429: false,
            retry_5xx: false,
            retry_transport: false,
        },
        stream_idle_grace: Duration::from_millis(200),
    }
}

fn local_ctx() -> RunContext {
    RunContext {
        source: DataSource::Files,
        session: SessionSelection::All,
        auto_save: false,
    }
}

fn rewriter_config(concurrency: usize) -> RewriterConfig {
    RewriterConfig {
        model: "test-model".to_string(),
        api_key: "sk-test".to_string(),
        concurrency,
        max_retries: 0,
        retry_delay: Duration::from_millis(1),
        ..RewriterConfig::default()
    }
}

fn orchestrator(
    transport: Arc<FakeStreamTransport>,
    store: Arc<MemoryStore>,
) -> Orchestrator<Arc<FakeStreamTransport>> {
    Orchestrator::new(
        Arc::new(AiClient::new(transport, provider())),
        store,
        Arc::new(TestCipher),
    )
}

fn done_body(content: &str) -> String {
    format!("event: done\ndata: {}\n\n", json!({ "content": content }))
}

#[tokio::test]
async fn bulk_rewrite_both_updates_every_item_and_reports_progress() {
    let transport = Arc::new(FakeStreamTransport::new(Box::new(|_req| {
        done_body("Reasoning: improved derivation\nAnswer: improved answer")
    })));
    let store = Arc::new(MemoryStore::new(items(10)));
    let orchestrator = orchestrator(transport.clone(), store.clone());
    let reporter = RecordingReporter::new();

    let summary = orchestrator
        .bulk_rewrite(
            &local_ctx(),
            &ids(10),
            RewriteTarget::Both,
            &rewriter_config(3),
            &reporter,
        )
        .await
        .expect("bulk rewrite");

    assert_eq!(summary.succeeded, 10);
    assert_eq!(summary.failed, 0);

    // Exactly one progress increment per item, ending at current == total.
    let progress = reporter.progress();
    assert_eq!(progress.len(), 10);
    assert_eq!(progress.last(), Some(&BulkProgress { current: 10, total: 10 }));
    let mut last = 0;
    for snapshot in &progress {
        assert!(snapshot.current > last, "progress must be monotonic");
        last = snapshot.current;
        assert_eq!(snapshot.total, 10);
    }

    for item in store.get_all().await {
        assert!(item.has_unsaved_changes, "item {} must be dirty", item.id);
        assert_eq!(item.reasoning, "improved derivation");
        assert_eq!(item.answer, "improved answer");
    }
}

#[tokio::test]
async fn bulk_rewrite_keeps_at_most_concurrency_calls_in_flight() {
    let transport = Arc::new(FakeStreamTransport::new(Box::new(|_req| {
        done_body("Reasoning: r\nAnswer: a")
    })));
    let store = Arc::new(MemoryStore::new(items(12)));
    let orchestrator = orchestrator(transport.clone(), store);

    orchestrator
        .bulk_rewrite(
            &local_ctx(),
            &ids(12),
            RewriteTarget::Both,
            &rewriter_config(3),
            &curator_core::NullBulkReporter,
        )
        .await
        .expect("bulk rewrite");

    assert!(
        transport.high_water() <= 3,
        "observed {} concurrent calls",
        transport.high_water()
    );
}

#[tokio::test]
async fn per_item_failures_do_not_stop_the_pool() {
    let transport = Arc::new(FakeStreamTransport::new(Box::new(|req| {
        let body = req.body.as_ref().map(ToString::to_string).unwrap_or_default();
        if body.contains("what is 3 + 3?") {
            format!(
                "event: error\ndata: {}\n\n",
                json!({"code": "bad_request", "message": "boom", "retryable": false})
            )
        } else {
            done_body("Reasoning: r\nAnswer: a")
        }
    })));
    let store = Arc::new(MemoryStore::new(items(6)));
    let orchestrator = orchestrator(transport, store.clone());
    let reporter = RecordingReporter::new();

    let summary = orchestrator
        .bulk_rewrite(
            &local_ctx(),
            &ids(6),
            RewriteTarget::Both,
            &rewriter_config(2),
            &reporter,
        )
        .await
        .expect("bulk rewrite");

    assert_eq!(summary.succeeded, 5);
    assert_eq!(summary.failed, 1);
    // The failed item still advances the counter.
    assert_eq!(reporter.progress().len(), 6);

    let failed_item = store.get("item-3").await.expect("item");
    assert!(!failed_item.has_unsaved_changes, "failed item is untouched");
}

#[tokio::test]
async fn single_field_rewrite_prefers_embedded_json() {
    let transport = Arc::new(FakeStreamTransport::new(Box::new(|_req| {
        done_body(r#"{"query": "What is two plus two?"}"#)
    })));
    let store = Arc::new(MemoryStore::new(items(1)));
    let orchestrator = orchestrator(transport, store.clone());

    orchestrator
        .bulk_rewrite(
            &local_ctx(),
            &ids(1),
            RewriteTarget::Query,
            &rewriter_config(1),
            &curator_core::NullBulkReporter,
        )
        .await
        .expect("bulk rewrite");

    let item = store.get("item-0").await.expect("item");
    assert_eq!(item.query, "What is two plus two?");
}

#[tokio::test]
async fn message_targets_are_rejected_for_bulk_runs() {
    let transport = Arc::new(FakeStreamTransport::new(Box::new(|_req| done_body(""))));
    let store = Arc::new(MemoryStore::new(items(1)));
    let orchestrator = orchestrator(transport, store);

    let err = orchestrator
        .bulk_rewrite(
            &local_ctx(),
            &ids(1),
            RewriteTarget::MessageBoth,
            &rewriter_config(1),
            &curator_core::NullBulkReporter,
        )
        .await
        .expect_err("must fail");
    assert!(matches!(err, CoreError::UnsupportedTarget(_)));
}

#[tokio::test]
async fn autoscore_writes_extracted_scores_and_skips_unusable_ones() {
    let transport = Arc::new(FakeStreamTransport::new(Box::new(|req| {
        let body = req.body.as_ref().map(ToString::to_string).unwrap_or_default();
        if body.contains("what is 1 + 1?") {
            done_body("I cannot rate this example.")
        } else {
            done_body("Quality score: 4 out of 5")
        }
    })));
    let store = Arc::new(MemoryStore::new(items(3)));
    let orchestrator = orchestrator(transport, store.clone());
    let reporter = RecordingReporter::new();

    let config = AutoscoreConfig {
        model: "test-model".to_string(),
        api_key: "sk-test".to_string(),
        concurrency: 2,
        max_retries: 0,
        ..AutoscoreConfig::default()
    };
    let summary = orchestrator
        .bulk_autoscore(&local_ctx(), &ids(3), &config, &reporter)
        .await
        .expect("autoscore");

    assert_eq!(summary.succeeded, 2);
    assert_eq!(summary.failed, 1);
    assert_eq!(reporter.progress().len(), 3);

    let scored = store.get("item-0").await.expect("item");
    assert_eq!(scored.score, 4);
    assert!(scored.has_unsaved_changes);

    // No usable digit: score stays 0 and the item is untouched.
    let unscored = store.get("item-1").await.expect("item");
    assert_eq!(unscored.score, 0);
    assert!(!unscored.has_unsaved_changes);
}

#[tokio::test]
async fn database_source_with_backend_requires_a_concrete_session() {
    let server = MockServer::start().await;
    let backend = Arc::new(
        BackendClient::new(DiscoveryConfig {
            host_hint: Some(server.uri()),
            ..DiscoveryConfig::default()
        })
        .with_poll_interval(Duration::from_millis(10)),
    );

    let transport = Arc::new(FakeStreamTransport::new(Box::new(|_req| done_body(""))));
    let store = Arc::new(MemoryStore::new(items(2)));
    let orchestrator = orchestrator(transport, store).with_backend(backend);

    let ctx = RunContext {
        source: DataSource::Database,
        session: SessionSelection::All,
        auto_save: false,
    };
    let err = orchestrator
        .bulk_rewrite(
            &ctx,
            &ids(2),
            RewriteTarget::Both,
            &rewriter_config(2),
            &curator_core::NullBulkReporter,
        )
        .await
        .expect_err("must fail");

    assert!(matches!(err, CoreError::NoSessionSelected));
    assert!(
        server.received_requests().await.unwrap_or_default().is_empty(),
        "no job may be started without a session"
    );
}

#[tokio::test]
async fn database_source_with_backend_delegates_the_whole_batch() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/jobs/rewrite"))
        .and(body_partial_json(json!({
            "session_uid": "session-9",
            "item_ids": ["item-0", "item-1"],
            "fields": ["reasoning", "answer"],
            "api_key": "wrapped:sk-test",
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"job_id": "j1"})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/jobs/j1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "j1",
            "type": "rewrite",
            "status": "completed",
            "result": {"succeeded": 2, "failed": 0},
        })))
        .mount(&server)
        .await;

    let backend = Arc::new(
        BackendClient::new(DiscoveryConfig {
            host_hint: Some(server.uri()),
            ..DiscoveryConfig::default()
        })
        .with_poll_interval(Duration::from_millis(10)),
    );

    let transport = Arc::new(FakeStreamTransport::new(Box::new(|_req| done_body(""))));
    let store = Arc::new(MemoryStore::new(items(2)));
    let orchestrator = orchestrator(transport.clone(), store).with_backend(backend);

    let ctx = RunContext {
        source: DataSource::Database,
        session: SessionSelection::Session("session-9".to_string()),
        auto_save: false,
    };
    let summary = orchestrator
        .bulk_rewrite(
            &ctx,
            &ids(2),
            RewriteTarget::Both,
            &rewriter_config(2),
            &curator_core::NullBulkReporter,
        )
        .await
        .expect("backend path");

    assert_eq!(summary.succeeded, 2);
    assert_eq!(summary.failed, 0);
    // The batch went to the backend, not the local pool.
    assert_eq!(transport.high_water(), 0);
}

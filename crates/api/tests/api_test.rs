use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde_json::{json, Value};
use tower::ServiceExt;
use tutor_api::{create_app, AppState};
use tutor_core::config::{ApiConfig, EndpointRateLimit, RateLimitingConfig};
use tutor_core::models::TaskStatus;
use tutor_dispatcher::{
    ImageValidator, RetryPolicy, RetryingAnalysisClient, TaskDispatcher,
};
use tutor_infrastructure::{
    CacheService, InMemoryCache, MetricsCollector, RateLimiter, TaskStore,
};
use tutor_testing_utils::{
    sample_jpeg, FailingCache, MockMessageQueue, MockMonitoringRepository,
    MockTaskRepository, ScriptedVisionApi, TaskBuilder,
};

const QUEUE: &str = "analysis_jobs";
const ADMIN_TOKEN: &str = "s3cret";

struct TestApp {
    app: Router,
    dispatcher: Arc<TaskDispatcher>,
    repo: MockTaskRepository,
    queue: MockMessageQueue,
    metrics: Arc<MetricsCollector>,
}

fn api_config() -> ApiConfig {
    ApiConfig {
        admin_token: Some(ADMIN_TOKEN.to_string()),
        max_request_bytes: 64 * 1024,
        ..ApiConfig::default()
    }
}

fn test_app(config: ApiConfig) -> TestApp {
    test_app_with_cache(config, Arc::new(InMemoryCache::new("api-test")))
}

fn test_app_with_cache(config: ApiConfig, cache: Arc<dyn CacheService>) -> TestApp {
    let repo = MockTaskRepository::new();
    let queue = MockMessageQueue::new();
    let metrics = Arc::new(MetricsCollector::default());
    let store = Arc::new(TaskStore::new(
        Arc::new(repo.clone()),
        cache,
        Duration::from_secs(3600),
    ));
    let rate_limiter = Arc::new(RateLimiter::new(RateLimitingConfig {
        submit: EndpointRateLimit::new(5, 60),
        status: EndpointRateLimit::new(3, 60),
        ..RateLimitingConfig::default()
    }));

    let dispatcher = Arc::new(TaskDispatcher::new(
        store,
        Arc::new(queue.clone()),
        QUEUE.to_string(),
        rate_limiter.clone(),
        ImageValidator::new(16 * 1024),
        RetryingAnalysisClient::new(
            Arc::new(ScriptedVisionApi::always_reply("step 1: read the problem")),
            metrics.clone(),
            Duration::from_secs(1),
        ),
        RetryPolicy::new(3, Duration::from_millis(5)),
        Arc::new(MockMonitoringRepository::new()),
        metrics.clone(),
    ));

    let state = AppState {
        dispatcher: dispatcher.clone(),
        rate_limiter,
        metrics: metrics.clone(),
        prometheus: None,
        admin_token: config.admin_token.clone(),
    };

    TestApp {
        app: create_app(state, &config),
        dispatcher,
        repo,
        queue,
        metrics,
    }
}

fn submit_request(body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/tasks")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

fn jpeg_body(user_id: &str) -> Value {
    json!({
        "user_id": user_id,
        "school_id": "school-1",
        "image_base64": STANDARD.encode(sample_jpeg()),
    })
}

#[tokio::test]
async fn test_submit_returns_accepted_and_enqueues() {
    let t = test_app(api_config());

    let (status, body) = send(&t.app, submit_request(jpeg_body("u1"))).await;

    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["status"], "pending");
    let task_id = body["task_id"].as_str().unwrap();
    assert_eq!(t.queue.published().len(), 1);
    assert_eq!(t.queue.published()[0].message.job.task_id, task_id);
}

#[tokio::test]
async fn test_submit_uses_default_identities() {
    let t = test_app(api_config());

    let (status, body) = send(
        &t.app,
        submit_request(json!({ "image_base64": STANDARD.encode(sample_jpeg()) })),
    )
    .await;

    assert_eq!(status, StatusCode::ACCEPTED);
    let tasks = t.repo.get_all_tasks();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].task_id, body["task_id"].as_str().unwrap());
    assert_eq!(tasks[0].user_id, "default_user");
    assert_eq!(tasks[0].school_id, "default_school");
}

#[tokio::test]
async fn test_submit_rejects_invalid_images() {
    let t = test_app(api_config());

    let (status, body) = send(
        &t.app,
        submit_request(json!({ "user_id": "u1", "image_base64": "%%%" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["type"], "validation_error");
    assert_eq!(body["error"]["code"], 400);

    let (status, _) = send(
        &t.app,
        submit_request(json!({
            "user_id": "u1",
            "image_base64": STANDARD.encode(b"plain text, not an image"),
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(t.repo.count(), 0);
}

#[tokio::test]
async fn test_malformed_json_is_bad_request() {
    let t = test_app(api_config());

    let request = Request::builder()
        .method("POST")
        .uri("/api/tasks")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let (status, body) = send(&t.app, request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["type"], "bad_request");
}

#[tokio::test]
async fn test_sixth_submission_is_rate_limited() {
    let t = test_app(api_config());

    for _ in 0..5 {
        let (status, _) = send(&t.app, submit_request(jpeg_body("u1"))).await;
        assert_eq!(status, StatusCode::ACCEPTED);
    }

    let response = t
        .app
        .clone()
        .oneshot(submit_request(jpeg_body("u1")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    let retry_after: u64 = response
        .headers()
        .get(header::RETRY_AFTER)
        .unwrap()
        .to_str()
        .unwrap()
        .parse()
        .unwrap();
    assert!((1..=60).contains(&retry_after));
    assert_eq!(t.repo.count(), 5);

    // 其他用户不受影响
    let (status, _) = send(&t.app, submit_request(jpeg_body("u2"))).await;
    assert_eq!(status, StatusCode::ACCEPTED);
}

#[tokio::test]
async fn test_oversized_body_is_rejected() {
    let t = test_app(ApiConfig {
        max_request_bytes: 512,
        ..api_config()
    });

    let big = json!({
        "user_id": "u1",
        "image_base64": STANDARD.encode(vec![0u8; 4096]),
    });
    let response = t.app.clone().oneshot(submit_request(big)).await.unwrap();

    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(t.repo.count(), 0);
}

#[tokio::test]
async fn test_status_poll_follows_the_task() {
    let t = test_app(api_config());

    let (_, body) = send(&t.app, submit_request(jpeg_body("u1"))).await;
    let task_id = body["task_id"].as_str().unwrap().to_string();
    let uri = format!("/api/tasks/{task_id}?user_id=u1");

    let (status, record) = send(&t.app, get(&uri)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(record["status"], "pending");
    assert!(record.get("result").is_none());

    let message = t.queue.pop(QUEUE).unwrap();
    t.dispatcher.execute(message.job).await.unwrap();

    let (status, record) = send(&t.app, get(&uri)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(record["task_id"], task_id.as_str());
    assert_eq!(record["status"], "completed");
    assert_eq!(record["result"], "step 1: read the problem");
    assert!(record.get("error").is_none());
}

#[tokio::test]
async fn test_unknown_task_is_not_found() {
    let t = test_app(api_config());

    let (status, body) = send(&t.app, get("/api/tasks/does-not-exist")).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["type"], "task_not_found");
}

#[tokio::test]
async fn test_status_polls_are_rate_limited_per_identity() {
    let t = test_app(api_config());
    let task = TaskBuilder::new().with_user("u1").build();
    t.repo.insert(task.clone());
    let uri = format!("/api/tasks/{}?user_id=poller", task.task_id);

    for _ in 0..3 {
        let (status, _) = send(&t.app, get(&uri)).await;
        assert_eq!(status, StatusCode::OK);
    }
    let (status, body) = send(&t.app, get(&uri)).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["error"]["type"], "rate_limited");
}

#[tokio::test]
async fn test_history_is_newest_first() {
    let t = test_app(api_config());
    let now = chrono::Utc::now();
    for (i, minutes) in [30, 10, 20].iter().enumerate() {
        t.repo.insert(
            TaskBuilder::new()
                .with_id(&format!("t{i}"))
                .with_user("u1")
                .with_created_at(now - chrono::Duration::minutes(*minutes))
                .completed("done")
                .build(),
        );
    }
    t.repo
        .insert(TaskBuilder::new().with_id("other").with_user("u2").build());

    let (status, body) = send(&t.app, get("/api/history?user_id=u1&limit=2")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user_id"], "u1");
    let ids: Vec<&str> = body["tasks"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["task_id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec!["t1", "t2"]);

    let (_, body) = send(&t.app, get("/api/history?user_id=u1&limit=2&offset=2")).await;
    assert_eq!(body["tasks"].as_array().unwrap().len(), 1);
    assert_eq!(body["tasks"][0]["task_id"], "t0");
}

#[tokio::test]
async fn test_history_rejects_non_numeric_limit() {
    let t = test_app(api_config());

    let (status, _) = send(&t.app, get("/api/history?limit=ten")).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_health_reports_tiers() {
    let t = test_app_with_cache(api_config(), Arc::new(FailingCache::new()));

    let (status, body) = send(&t.app, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["database"], true);
    assert_eq!(body["cache"], false);

    t.repo.set_fail_writes(true);
    let (status, body) = send(&t.app, get("/health")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["status"], "degraded");
}

#[tokio::test]
async fn test_reads_survive_a_broken_cache() {
    let t = test_app_with_cache(api_config(), Arc::new(FailingCache::new()));

    let (_, body) = send(&t.app, submit_request(jpeg_body("u1"))).await;
    let task_id = body["task_id"].as_str().unwrap().to_string();
    let message = t.queue.pop(QUEUE).unwrap();
    t.dispatcher.execute(message.job).await.unwrap();

    let (status, record) = send(&t.app, get(&format!("/api/tasks/{task_id}"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(record["status"], "completed");
    assert_eq!(
        t.repo.get_all_tasks()[0].status,
        TaskStatus::Completed
    );
}

#[tokio::test]
async fn test_admin_endpoints_require_token() {
    let t = test_app(api_config());

    let (status, _) = send(&t.app, get("/api/admin/metrics")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let wrong = Request::builder()
        .uri("/api/admin/metrics")
        .header("x-admin-token", "guess")
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&t.app, wrong).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    send(&t.app, submit_request(jpeg_body("u1"))).await;
    let authorized = Request::builder()
        .uri("/api/admin/metrics")
        .header("x-admin-token", ADMIN_TOKEN)
        .body(Body::empty())
        .unwrap();
    let (status, snapshot) = send(&t.app, authorized).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(snapshot["request_counts"]["submit"], 1);
}

#[tokio::test]
async fn test_admin_endpoints_forbidden_without_configured_token() {
    let t = test_app(ApiConfig {
        admin_token: None,
        ..api_config()
    });

    let request = Request::builder()
        .uri("/api/admin/metrics")
        .header("x-admin-token", "anything")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&t.app, request).await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["type"], "forbidden");
}

#[tokio::test]
async fn test_prometheus_endpoint_without_recorder() {
    let t = test_app(api_config());

    let request = Request::builder()
        .uri("/api/admin/metrics/prometheus")
        .header("x-admin-token", ADMIN_TOKEN)
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&t.app, request).await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_requests_are_recorded_per_endpoint() {
    let t = test_app(api_config());

    send(&t.app, submit_request(jpeg_body("u1"))).await;
    send(&t.app, get("/api/tasks/missing")).await;
    send(&t.app, get("/health")).await;

    let snapshot = t.metrics.snapshot();
    assert_eq!(snapshot.request_counts.get("submit"), Some(&1));
    assert_eq!(snapshot.request_counts.get("status"), Some(&1));
    assert_eq!(snapshot.error_counts.get("status"), Some(&1));
    assert_eq!(snapshot.request_counts.get("health"), Some(&1));
    assert!(snapshot.average_response_time.contains_key("submit"));
    assert!(snapshot.error_counts.get("submit").is_none());
}

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tutor_core::config::RateLimitingConfig;
use tutor_core::errors::AnalysisError;
use tutor_core::models::TaskStatus;
use tutor_core::traits::{MessageQueue, VisionApi};
use tutor_dispatcher::{
    ImageValidator, RetryPolicy, RetryingAnalysisClient, SubmitRequest, TaskDispatcher,
};
use tutor_infrastructure::{
    InMemoryCache, InMemoryJobQueue, MetricsCollector, RateLimiter, TaskStore,
};
use tutor_testing_utils::{
    sample_jpeg, MockMonitoringRepository, MockTaskRepository, ScriptedVisionApi, TestEnv,
};
use tutor_worker::WorkerService;

const QUEUE: &str = "analysis_jobs";

/// 记录同时在途调用的峰值
#[derive(Default)]
struct ConcurrencyProbe {
    current: AtomicUsize,
    peak: AtomicUsize,
    delay_ms: u64,
}

#[async_trait]
impl VisionApi for ConcurrencyProbe {
    async fn explain(&self, _image: &[u8]) -> Result<String, AnalysisError> {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
        self.current.fetch_sub(1, Ordering::SeqCst);
        Ok("step 1...".to_string())
    }
}

struct Setup {
    dispatcher: Arc<TaskDispatcher>,
    queue: Arc<InMemoryJobQueue>,
    repo: MockTaskRepository,
}

fn setup(vision: Arc<dyn VisionApi>) -> Setup {
    let repo = MockTaskRepository::new();
    let queue = Arc::new(InMemoryJobQueue::new());
    let metrics = Arc::new(MetricsCollector::default());
    let store = Arc::new(TaskStore::new(
        Arc::new(repo.clone()),
        Arc::new(InMemoryCache::new("worker-test")),
        Duration::from_secs(3600),
    ));

    let dispatcher = Arc::new(TaskDispatcher::new(
        store,
        queue.clone(),
        QUEUE.to_string(),
        Arc::new(RateLimiter::new(RateLimitingConfig {
            enabled: false,
            ..RateLimitingConfig::default()
        })),
        ImageValidator::new(1024 * 1024),
        RetryingAnalysisClient::new(vision, metrics.clone(), Duration::from_secs(5)),
        RetryPolicy::new(3, Duration::from_millis(10)),
        Arc::new(MockMonitoringRepository::new()),
        metrics,
    ));

    Setup {
        dispatcher,
        queue,
        repo,
    }
}

fn worker(setup: &Setup, max_concurrent: usize) -> WorkerService {
    WorkerService::builder(
        "worker-test".to_string(),
        setup.dispatcher.clone(),
        setup.queue.clone(),
        QUEUE.to_string(),
    )
    .max_concurrent_tasks(max_concurrent)
    .poll_interval_ms(5)
    .build()
}

async fn submit(setup: &Setup, user: &str) -> String {
    setup
        .dispatcher
        .submit(SubmitRequest {
            user_id: user.to_string(),
            school_id: "s1".to_string(),
            image: sample_jpeg(),
        })
        .await
        .unwrap()
}

fn all_terminal(repo: &MockTaskRepository) -> bool {
    repo.get_all_tasks().iter().all(|t| t.is_terminal())
}

#[tokio::test]
async fn test_worker_completes_submitted_tasks() {
    let setup = setup(Arc::new(ScriptedVisionApi::always_reply("step 1...")));
    let worker = worker(&setup, 2);
    worker.start().await.unwrap();

    let task_id = submit(&setup, "u1").await;

    let repo = setup.repo.clone();
    assert!(
        TestEnv::wait_for(
            || {
                let repo = repo.clone();
                async move { all_terminal(&repo) }
            },
            Duration::from_secs(5),
        )
        .await
    );
    worker.stop().await.unwrap();

    let task = setup.dispatcher.store().get(&task_id).await.unwrap();
    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(task.result.as_deref(), Some("step 1..."));
}

#[tokio::test]
async fn test_retries_are_redelivered_through_the_queue() {
    let setup = setup(Arc::new(ScriptedVisionApi::always_fail(
        AnalysisError::Transient("503".to_string()),
    )));
    let worker = worker(&setup, 1);
    worker.start().await.unwrap();

    let task_id = submit(&setup, "u1").await;

    let repo = setup.repo.clone();
    assert!(
        TestEnv::wait_for(
            || {
                let repo = repo.clone();
                async move { all_terminal(&repo) }
            },
            Duration::from_secs(5),
        )
        .await
    );
    worker.stop().await.unwrap();

    let task = setup.dispatcher.store().get(&task_id).await.unwrap();
    assert_eq!(task.status, TaskStatus::Failed);
    assert_eq!(task.attempts, 3);
    assert_eq!(setup.queue.get_queue_size(QUEUE).await.unwrap(), 0);
}

#[tokio::test]
async fn test_in_flight_jobs_are_bounded() {
    let probe = Arc::new(ConcurrencyProbe {
        delay_ms: 40,
        ..ConcurrencyProbe::default()
    });
    let setup = setup(probe.clone());
    let worker = worker(&setup, 2);

    for i in 0..6 {
        submit(&setup, &format!("u{i}")).await;
    }
    worker.start().await.unwrap();

    let repo = setup.repo.clone();
    assert!(
        TestEnv::wait_for(
            || {
                let repo = repo.clone();
                async move { all_terminal(&repo) }
            },
            Duration::from_secs(5),
        )
        .await
    );
    worker.stop().await.unwrap();

    assert!(probe.peak.load(Ordering::SeqCst) <= 2);
}

#[tokio::test]
async fn test_stop_waits_for_in_flight_jobs() {
    let probe = Arc::new(ConcurrencyProbe {
        delay_ms: 150,
        ..ConcurrencyProbe::default()
    });
    let setup = setup(probe.clone());
    let worker = worker(&setup, 1);

    let task_id = submit(&setup, "u1").await;
    worker.start().await.unwrap();

    assert!(
        TestEnv::wait_for(
            || {
                let worker = worker.clone();
                async move { worker.in_flight() == 1 }
            },
            Duration::from_secs(2),
        )
        .await
    );
    worker.stop().await.unwrap();

    assert!(!worker.is_running().await);
    assert_eq!(worker.in_flight(), 0);
    let task = setup.dispatcher.store().get(&task_id).await.unwrap();
    assert_eq!(task.status, TaskStatus::Completed);
}

#[tokio::test]
async fn test_double_start_is_rejected() {
    let setup = setup(Arc::new(ScriptedVisionApi::always_reply("ok")));
    let worker = worker(&setup, 1);

    worker.start().await.unwrap();
    assert!(worker.start().await.is_err());
    worker.stop().await.unwrap();
    // 停止后可以再次停止
    worker.stop().await.unwrap();
}

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, instrument, warn};
use tutor_core::{errors::AnalysisError, traits::VisionApi};
use tutor_infrastructure::MetricsCollector;

/// 指标中视觉分析服务的名称
pub const VISION_API: &str = "vision_api";

/// 带超时和指标记录的分析客户端
///
/// 一次 `analyze` 调用就是一次尝试。重试由调度器根据 [`RetryPolicy`](crate::RetryPolicy)
/// 重新投递作业完成，这里不会循环。
pub struct RetryingAnalysisClient {
    vision: Arc<dyn VisionApi>,
    metrics: Arc<MetricsCollector>,
    timeout: Duration,
}

impl RetryingAnalysisClient {
    pub fn new(vision: Arc<dyn VisionApi>, metrics: Arc<MetricsCollector>, timeout: Duration) -> Self {
        Self {
            vision,
            metrics,
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    #[instrument(skip(self, image), fields(bytes = image.len()))]
    pub async fn analyze(&self, image: &[u8]) -> Result<String, AnalysisError> {
        self.metrics.record_api_call(VISION_API);
        let start = Instant::now();

        let outcome = match tokio::time::timeout(self.timeout, self.vision.explain(image)).await {
            Ok(Ok(text)) if text.trim().is_empty() => Err(AnalysisError::Fatal(
                "vision api returned an empty explanation".to_string(),
            )),
            Ok(result) => result,
            Err(_) => Err(AnalysisError::Transient(format!(
                "vision api timed out after {}s",
                self.timeout.as_secs_f64()
            ))),
        };

        let elapsed = start.elapsed();
        self.metrics.record_response_time(VISION_API, elapsed);

        match &outcome {
            Ok(_) => debug!("视觉分析完成，耗时 {:?}", elapsed),
            Err(e) => {
                self.metrics.record_error(VISION_API);
                warn!(kind = e.kind_str(), "视觉分析失败: {}", e.message());
            }
        }

        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct FixedVision(Result<String, AnalysisError>);

    #[async_trait]
    impl VisionApi for FixedVision {
        async fn explain(&self, _image: &[u8]) -> Result<String, AnalysisError> {
            self.0.clone()
        }
    }

    struct SlowVision(Duration);

    #[async_trait]
    impl VisionApi for SlowVision {
        async fn explain(&self, _image: &[u8]) -> Result<String, AnalysisError> {
            tokio::time::sleep(self.0).await;
            Ok("late".to_string())
        }
    }

    fn client(vision: impl VisionApi + 'static, metrics: &Arc<MetricsCollector>) -> RetryingAnalysisClient {
        RetryingAnalysisClient::new(Arc::new(vision), metrics.clone(), Duration::from_millis(50))
    }

    #[tokio::test]
    async fn test_success_counts_one_call() {
        let metrics = Arc::new(MetricsCollector::default());
        let client = client(FixedVision(Ok("step 1...".to_string())), &metrics);

        assert_eq!(client.analyze(b"img").await.unwrap(), "step 1...");

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.api_call_counts[VISION_API], 1);
        assert!(!snapshot.error_counts.contains_key(VISION_API));
        assert!(snapshot.average_response_time.contains_key(VISION_API));
    }

    #[tokio::test]
    async fn test_timeout_is_transient() {
        let metrics = Arc::new(MetricsCollector::default());
        let client = client(SlowVision(Duration::from_secs(5)), &metrics);

        let err = client.analyze(b"img").await.unwrap_err();

        assert!(err.is_transient());
        assert!(err.message().contains("timed out"));
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.api_call_counts[VISION_API], 1);
        assert_eq!(snapshot.error_counts[VISION_API], 1);
    }

    #[tokio::test]
    async fn test_empty_text_is_fatal() {
        let metrics = Arc::new(MetricsCollector::default());
        let client = client(FixedVision(Ok("   ".to_string())), &metrics);

        let err = client.analyze(b"img").await.unwrap_err();

        assert!(!err.is_transient());
        assert_eq!(metrics.snapshot().error_counts[VISION_API], 1);
    }

    #[tokio::test]
    async fn test_errors_pass_through() {
        let metrics = Arc::new(MetricsCollector::default());
        let client = client(
            FixedVision(Err(AnalysisError::Fatal("rejected".to_string()))),
            &metrics,
        );

        assert_eq!(
            client.analyze(b"img").await.unwrap_err(),
            AnalysisError::Fatal("rejected".to_string())
        );
    }
}

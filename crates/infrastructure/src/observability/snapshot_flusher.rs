use std::sync::Arc;
use std::time::Duration;

use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};
use tutor_core::{traits::MonitoringRepository, TutorResult};

use super::MetricsCollector;

/// 指标快照落盘服务
///
/// 每个周期把 [`MetricsCollector::snapshot`] 追加到监控日志表。
/// 写入失败只记录警告，循环继续。
pub struct SnapshotFlusher {
    collector: Arc<MetricsCollector>,
    repository: Arc<dyn MonitoringRepository>,
    flush_interval: Duration,
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
    flush_handle: Option<tokio::task::JoinHandle<()>>,
}

impl SnapshotFlusher {
    pub fn new(
        collector: Arc<MetricsCollector>,
        repository: Arc<dyn MonitoringRepository>,
        flush_interval: Duration,
    ) -> Self {
        Self {
            collector,
            repository,
            flush_interval,
            shutdown_tx: None,
            flush_handle: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.flush_handle.is_some()
    }

    /// 启动落盘循环
    pub fn start(&mut self) {
        if self.flush_handle.is_some() {
            return;
        }

        info!("Starting metrics snapshot flusher, interval {:?}", self.flush_interval);

        let (shutdown_tx, mut shutdown_rx) = tokio::sync::oneshot::channel();
        self.shutdown_tx = Some(shutdown_tx);

        let collector = self.collector.clone();
        let repository = self.repository.clone();
        let flush_interval = self.flush_interval;

        let handle = tokio::spawn(async move {
            let mut ticker = interval(flush_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // 第一次 tick 立即返回，跳过启动时的空快照
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = Self::flush(&collector, repository.as_ref()).await {
                            warn!("Failed to flush metrics snapshot: {}", e);
                        }
                    }
                    _ = &mut shutdown_rx => {
                        break;
                    }
                }
            }

            info!("Metrics snapshot flusher stopped");
        });

        self.flush_handle = Some(handle);
    }

    /// 停止落盘循环
    pub async fn stop(&mut self) {
        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            let _ = shutdown_tx.send(());
        }

        if let Some(handle) = self.flush_handle.take() {
            if let Err(e) = handle.await {
                warn!("Error waiting for snapshot flusher to stop: {}", e);
            }
        }
    }

    /// 立即写入一次快照
    pub async fn flush_once(&self) -> TutorResult<()> {
        Self::flush(&self.collector, self.repository.as_ref()).await
    }

    async fn flush(
        collector: &MetricsCollector,
        repository: &dyn MonitoringRepository,
    ) -> TutorResult<()> {
        let snapshot = collector.snapshot();
        repository.record_snapshot(&snapshot).await?;
        debug!(
            uptime_seconds = snapshot.uptime_seconds,
            "metrics snapshot flushed"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::{memory_pool, SqliteMonitoringRepository};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tutor_core::models::{ErrorLogEntry, MetricsSnapshot, MonitoringRecord};
    use tutor_core::TutorError;

    /// 每次写入都失败，但记录调用次数
    #[derive(Default)]
    struct FailingMonitoringRepository {
        attempts: AtomicUsize,
    }

    #[async_trait]
    impl MonitoringRepository for FailingMonitoringRepository {
        async fn record_snapshot(&self, _snapshot: &MetricsSnapshot) -> TutorResult<()> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            Err(TutorError::DatabaseOperation("disk full".to_string()))
        }
        async fn record_error(&self, _entry: &ErrorLogEntry) -> TutorResult<()> {
            Ok(())
        }
        async fn recent_snapshots(&self, _limit: i64) -> TutorResult<Vec<MonitoringRecord>> {
            Ok(Vec::new())
        }
        async fn recent_errors(&self, _limit: i64) -> TutorResult<Vec<ErrorLogEntry>> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn test_flush_once_appends_snapshot() {
        let collector = Arc::new(MetricsCollector::default());
        let repository = Arc::new(SqliteMonitoringRepository::new(memory_pool().await));
        collector.record_request("submit");

        let flusher = SnapshotFlusher::new(collector, repository.clone(), Duration::from_secs(300));
        flusher.flush_once().await.unwrap();

        let records = repository.recent_snapshots(10).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].snapshot.request_counts["submit"], 1);
    }

    #[tokio::test]
    async fn test_failures_do_not_stop_the_loop() {
        let collector = Arc::new(MetricsCollector::default());
        let repository = Arc::new(FailingMonitoringRepository::default());

        let mut flusher =
            SnapshotFlusher::new(collector, repository.clone(), Duration::from_millis(10));
        flusher.start();
        assert!(flusher.is_running());
        tokio::time::sleep(Duration::from_millis(80)).await;
        flusher.stop().await;

        assert!(repository.attempts.load(Ordering::SeqCst) >= 2);
        assert!(!flusher.is_running());
    }
}

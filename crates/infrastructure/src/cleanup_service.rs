use chrono::{Duration, Utc};
use std::sync::Arc;
use tokio::time::interval;
use tracing::{error, info, warn};
use tutor_core::{config::RetentionConfig, traits::TaskRepository, TutorResult};

/// 数据清理服务
///
/// 定期删除超过保留期的已完成和失败任务，防止数据库无限增长。
/// 未结束的任务不会被删除。
pub struct CleanupService {
    task_repository: Arc<dyn TaskRepository>,
    config: RetentionConfig,
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
    cleanup_handle: Option<tokio::task::JoinHandle<()>>,
}

impl CleanupService {
    pub fn new(task_repository: Arc<dyn TaskRepository>, config: RetentionConfig) -> Self {
        Self {
            task_repository,
            config,
            shutdown_tx: None,
            cleanup_handle: None,
        }
    }

    /// 启动清理服务
    pub async fn start(&mut self) -> TutorResult<()> {
        if !self.config.enabled {
            info!("Cleanup service is disabled");
            return Ok(());
        }

        info!(
            "Starting cleanup service: retention {} days, interval {}s",
            self.config.retention_days, self.config.cleanup_interval_seconds
        );

        let (shutdown_tx, mut shutdown_rx) = tokio::sync::oneshot::channel();
        self.shutdown_tx = Some(shutdown_tx);

        let task_repository = self.task_repository.clone();
        let config = self.config.clone();

        let handle = tokio::spawn(async move {
            let mut cleanup_interval =
                interval(std::time::Duration::from_secs(config.cleanup_interval_seconds));

            loop {
                tokio::select! {
                    _ = cleanup_interval.tick() => {
                        if let Err(e) = Self::perform_cleanup(task_repository.as_ref(), &config).await {
                            error!("Cleanup failed: {}", e);
                        }
                    }
                    _ = &mut shutdown_rx => {
                        info!("Cleanup service shutdown requested");
                        break;
                    }
                }
            }
        });

        self.cleanup_handle = Some(handle);
        Ok(())
    }

    /// 停止清理服务
    pub async fn stop(&mut self) -> TutorResult<()> {
        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            let _ = shutdown_tx.send(());
        }

        if let Some(handle) = self.cleanup_handle.take() {
            if let Err(e) = handle.await {
                warn!("Error waiting for cleanup service to stop: {}", e);
            }
        }

        info!("Cleanup service stopped");
        Ok(())
    }

    /// 执行一次清理，返回删除的任务数
    pub async fn cleanup_once(&self) -> TutorResult<CleanupStats> {
        Self::perform_cleanup(self.task_repository.as_ref(), &self.config).await
    }

    async fn perform_cleanup(
        task_repository: &dyn TaskRepository,
        config: &RetentionConfig,
    ) -> TutorResult<CleanupStats> {
        let start_time = std::time::Instant::now();
        let cutoff = Utc::now() - Duration::days(i64::from(config.retention_days));

        let tasks_deleted = task_repository.delete_finished_before(cutoff).await?;

        let stats = CleanupStats {
            tasks_deleted,
            duration: start_time.elapsed(),
        };
        info!(
            "Cleanup completed: {} finished tasks older than {} removed in {:?}",
            stats.tasks_deleted, cutoff, stats.duration
        );
        Ok(stats)
    }
}

/// 清理统计信息
#[derive(Debug, Default)]
pub struct CleanupStats {
    pub tasks_deleted: u64,
    pub duration: std::time::Duration,
}

impl CleanupStats {
    pub fn has_cleanup(&self) -> bool {
        self.tasks_deleted > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::{memory_pool, SqliteTaskRepository};
    use tutor_core::models::{Task, TaskStatus};

    async fn insert(repo: &SqliteTaskRepository, status: TaskStatus, age_days: i64) -> Task {
        let mut task = Task::new_pending("u1", "s1");
        task.status = status;
        if status == TaskStatus::Completed {
            task.result = Some("ok".to_string());
        }
        task.created_at = Utc::now() - Duration::days(age_days);
        task.updated_at = task.created_at;
        repo.create(&task).await.unwrap()
    }

    #[tokio::test]
    async fn test_cleanup_once_respects_retention_and_status() {
        let repo = Arc::new(SqliteTaskRepository::new(memory_pool().await));
        let old_done = insert(&repo, TaskStatus::Completed, 45).await;
        let old_failed = insert(&repo, TaskStatus::Failed, 45).await;
        let old_pending = insert(&repo, TaskStatus::Pending, 45).await;
        let recent_done = insert(&repo, TaskStatus::Completed, 1).await;

        let service = CleanupService::new(repo.clone(), RetentionConfig::default());
        let stats = service.cleanup_once().await.unwrap();

        assert_eq!(stats.tasks_deleted, 2);
        assert!(stats.has_cleanup());
        assert!(repo.get_by_id(&old_done.task_id).await.unwrap().is_none());
        assert!(repo.get_by_id(&old_failed.task_id).await.unwrap().is_none());
        assert!(repo.get_by_id(&old_pending.task_id).await.unwrap().is_some());
        assert!(repo.get_by_id(&recent_done.task_id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_disabled_service_does_not_spawn() {
        let repo = Arc::new(SqliteTaskRepository::new(memory_pool().await));
        let mut service = CleanupService::new(
            repo,
            RetentionConfig {
                enabled: false,
                ..RetentionConfig::default()
            },
        );

        service.start().await.unwrap();
        assert!(service.cleanup_handle.is_none());
        service.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_start_runs_initial_cleanup() {
        let repo = Arc::new(SqliteTaskRepository::new(memory_pool().await));
        let old = insert(&repo, TaskStatus::Failed, 90).await;

        let mut service = CleanupService::new(repo.clone(), RetentionConfig::default());
        service.start().await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        service.stop().await.unwrap();

        assert!(repo.get_by_id(&old.task_id).await.unwrap().is_none());
    }
}

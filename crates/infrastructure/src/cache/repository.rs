//! Two-tier task store: durable repository plus a terminal-result cache

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, instrument, warn};
use tutor_core::{
    models::{Task, TaskStatusUpdate},
    traits::TaskRepository,
    TutorError, TutorResult,
};

use super::{task_cache_key, CacheService, CacheServiceExt};

pub const DEFAULT_HISTORY_LIMIT: i64 = 20;
pub const MAX_HISTORY_LIMIT: i64 = 100;

/// 任务存储
///
/// 持久层是任务状态的唯一数据源，每次创建和状态转换都同步写入。
/// 缓存层只在任务进入终态时写入（write-through），读取时优先查缓存，
/// 缓存的任何错误都只记录日志，不影响调用结果。
pub struct TaskStore {
    durable: Arc<dyn TaskRepository>,
    cache: Arc<dyn CacheService>,
    result_ttl: Duration,
}

impl TaskStore {
    pub fn new(
        durable: Arc<dyn TaskRepository>,
        cache: Arc<dyn CacheService>,
        result_ttl: Duration,
    ) -> Self {
        Self {
            durable,
            cache,
            result_ttl,
        }
    }

    /// 写入新的待处理任务
    #[instrument(skip(self, task), fields(task_id = %task.task_id))]
    pub async fn create(&self, task: &Task) -> TutorResult<Task> {
        if task.user_id.is_empty() || task.school_id.is_empty() {
            return Err(TutorError::Validation(
                "user_id 和 school_id 不能为空".to_string(),
            ));
        }
        self.durable.create(task).await
    }

    /// 执行一次状态转换并返回更新后的任务
    #[instrument(skip(self, update), fields(task_id = %update.task_id, status = %update.status))]
    pub async fn update_status(&self, update: TaskStatusUpdate) -> TutorResult<Task> {
        let current = self
            .durable
            .get_by_id(&update.task_id)
            .await?
            .ok_or_else(|| TutorError::TaskNotFound {
                id: update.task_id.clone(),
            })?;

        let updated = current.apply_update(&update)?;
        self.durable.update(&updated).await?;

        if updated.is_terminal() {
            let key = task_cache_key(&updated.task_id);
            if let Err(e) = self.cache.set_typed(&key, &updated, self.result_ttl).await {
                // 持久层已经提交，缓存失败只影响读取延迟
                warn!("写入任务缓存失败: {} - {}", updated.task_id, e);
            }
        }

        debug!(
            "任务状态已更新: {} {} -> {}",
            updated.task_id, current.status, updated.status
        );
        Ok(updated)
    }

    /// 获取任务，缓存优先，持久层兜底
    #[instrument(skip(self))]
    pub async fn get(&self, task_id: &str) -> TutorResult<Task> {
        let key = task_cache_key(task_id);
        match self.cache.get_typed::<Task>(&key).await {
            Ok(Some(task)) => {
                debug!("Cache hit for task: {}", task_id);
                return Ok(task);
            }
            Ok(None) => debug!("Cache miss for task: {}", task_id),
            Err(e) => warn!("读取任务缓存失败，回退到数据库: {} - {}", task_id, e),
        }

        self.durable
            .get_by_id(task_id)
            .await?
            .ok_or_else(|| TutorError::TaskNotFound {
                id: task_id.to_string(),
            })
    }

    /// 用户的任务历史，按创建时间倒序
    ///
    /// `limit` 限制在 1..=100，默认 20；`offset` 小于 0 时按 0 处理。
    #[instrument(skip(self))]
    pub async fn history(
        &self,
        user_id: &str,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> TutorResult<Vec<Task>> {
        let limit = limit
            .unwrap_or(DEFAULT_HISTORY_LIMIT)
            .clamp(1, MAX_HISTORY_LIMIT);
        let offset = offset.unwrap_or(0).max(0);
        self.durable.list_by_user(user_id, limit, offset).await
    }

    /// 删除截止时间之前创建的终态任务
    #[instrument(skip(self))]
    pub async fn cleanup_finished_before(&self, cutoff: DateTime<Utc>) -> TutorResult<u64> {
        self.durable.delete_finished_before(cutoff).await
    }

    pub async fn durable_healthy(&self) -> bool {
        self.durable.health_check().await.unwrap_or(false)
    }

    pub async fn cache_healthy(&self) -> bool {
        self.cache.health_check().await.unwrap_or(false)
    }
}

//! 数据仓储层接口定义
//!
//! - `TaskRepository`: 任务记录的持久化，是任务状态的唯一数据源
//! - `MonitoringRepository`: 指标快照与错误日志的追加写入
//!
//! 所有实现都必须是 `Send + Sync`，以 `Arc<dyn Trait>` 的形式在组件间共享。

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::errors::TutorResult;
use crate::models::{ErrorLogEntry, MetricsSnapshot, MonitoringRecord, Task};

/// 任务仓储接口
#[async_trait]
pub trait TaskRepository: Send + Sync {
    /// 插入新任务
    async fn create(&self, task: &Task) -> TutorResult<Task>;

    /// 覆盖写入任务的状态字段
    async fn update(&self, task: &Task) -> TutorResult<()>;

    /// 根据ID获取任务
    async fn get_by_id(&self, task_id: &str) -> TutorResult<Option<Task>>;

    /// 按创建时间倒序分页获取用户的任务
    async fn list_by_user(&self, user_id: &str, limit: i64, offset: i64) -> TutorResult<Vec<Task>>;

    /// 删除在截止时间之前创建且已结束的任务，返回删除数量
    async fn delete_finished_before(&self, cutoff: DateTime<Utc>) -> TutorResult<u64>;

    /// 连通性检查
    async fn health_check(&self) -> TutorResult<bool>;
}

/// 监控日志仓储接口
#[async_trait]
pub trait MonitoringRepository: Send + Sync {
    async fn record_snapshot(&self, snapshot: &MetricsSnapshot) -> TutorResult<()>;

    async fn record_error(&self, entry: &ErrorLogEntry) -> TutorResult<()>;

    /// 最近的指标快照，按记录时间倒序
    async fn recent_snapshots(&self, limit: i64) -> TutorResult<Vec<MonitoringRecord>>;

    /// 最近的错误日志，按时间倒序
    async fn recent_errors(&self, limit: i64) -> TutorResult<Vec<ErrorLogEntry>>;
}

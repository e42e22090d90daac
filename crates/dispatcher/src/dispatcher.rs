use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tracing::{debug, error, info, instrument, warn};
use tutor_core::{
    errors::AnalysisError,
    models::{AnalysisJob, EndpointClass, ErrorLogEntry, Message, Task, TaskStatusUpdate},
    traits::{MessageQueue, MonitoringRepository},
    TutorError, TutorResult,
};
use tutor_infrastructure::{MetricsCollector, RateLimiter, TaskStore};

use crate::analysis_client::RetryingAnalysisClient;
use crate::retry_service::{RetryDecision, RetryPolicy};
use crate::validation::ImageValidator;

/// 任务完成时记录的请求指标名
pub const TASK_COMPLETED: &str = "task_completed";
/// 任务最终失败时记录的错误指标名
pub const TASK_FAILED: &str = "task_failed";

/// 提交请求
#[derive(Debug, Clone)]
pub struct SubmitRequest {
    pub user_id: String,
    pub school_id: String,
    pub image: Vec<u8>,
}

/// 一次作业执行的结果
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionOutcome {
    Completed,
    RetryScheduled { next_attempt: i32, delay: Duration },
    Failed { error: String },
    /// 终态任务或过期的重复投递，直接确认
    Skipped,
}

/// 任务调度器
///
/// 提交端负责限流、校验、建档和入队，立即返回任务ID；
/// 执行端由 worker 调用，是任务状态的唯一写入者。
pub struct TaskDispatcher {
    store: Arc<TaskStore>,
    message_queue: Arc<dyn MessageQueue>,
    task_queue_name: String,
    rate_limiter: Arc<RateLimiter>,
    validator: ImageValidator,
    client: RetryingAnalysisClient,
    retry_policy: RetryPolicy,
    monitoring: Arc<dyn MonitoringRepository>,
    metrics: Arc<MetricsCollector>,
}

impl TaskDispatcher {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<TaskStore>,
        message_queue: Arc<dyn MessageQueue>,
        task_queue_name: String,
        rate_limiter: Arc<RateLimiter>,
        validator: ImageValidator,
        client: RetryingAnalysisClient,
        retry_policy: RetryPolicy,
        monitoring: Arc<dyn MonitoringRepository>,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            store,
            message_queue,
            task_queue_name,
            rate_limiter,
            validator,
            client,
            retry_policy,
            monitoring,
            metrics,
        }
    }

    pub fn store(&self) -> &Arc<TaskStore> {
        &self.store
    }

    pub fn task_queue_name(&self) -> &str {
        &self.task_queue_name
    }

    /// 提交一张图片，返回新任务的ID
    #[instrument(skip(self, request), fields(user_id = %request.user_id, bytes = request.image.len()))]
    pub async fn submit(&self, request: SubmitRequest) -> TutorResult<String> {
        self.rate_limiter
            .check(&request.user_id, EndpointClass::Submit)?;
        self.validator.validate(&request.image)?;

        let task = self
            .store
            .create(&Task::new_pending(&request.user_id, &request.school_id))
            .await?;

        let job = AnalysisJob::first_attempt(
            task.task_id.clone(),
            request.user_id,
            request.school_id,
            request.image,
        );

        if let Err(e) = self
            .message_queue
            .publish_message(&self.task_queue_name, &Message::analysis(job))
            .await
        {
            error!("任务 {} 入队失败: {}", task.task_id, e);
            self.mark_enqueue_failed(&task.task_id, &e).await;
            return Err(e);
        }

        info!("任务 {} 已提交", task.task_id);
        Ok(task.task_id)
    }

    /// 状态机不允许 pending 直接结束，先进入 processing 再标记失败
    async fn mark_enqueue_failed(&self, task_id: &str, cause: &TutorError) {
        let message = format!("enqueue failed: {cause}");
        let result = async {
            self.store
                .update_status(TaskStatusUpdate::processing(task_id, 0))
                .await?;
            self.store
                .update_status(TaskStatusUpdate::failed(task_id, message.clone()))
                .await
        }
        .await;

        if let Err(e) = result {
            error!("无法将任务 {} 标记为失败: {}", task_id, e);
        }
        self.metrics.record_error(TASK_FAILED);
        self.log_error(ErrorLogEntry::for_task(task_id, cause.error_type(), message))
            .await;
    }

    /// 执行一次分析作业
    ///
    /// 至少一次投递下的幂等处理：终态任务和 `attempt` 不大于已记录次数的作业会被跳过。
    #[instrument(skip(self, job), fields(task_id = %job.task_id, attempt = job.attempt))]
    pub async fn execute(&self, job: AnalysisJob) -> TutorResult<ExecutionOutcome> {
        let task = self.store.get(&job.task_id).await?;

        if task.is_terminal() {
            debug!("任务 {} 已处于终态 {}，跳过", task.task_id, task.status);
            return Ok(ExecutionOutcome::Skipped);
        }
        if job.attempt <= task.attempts {
            debug!(
                "任务 {} 的第 {} 次尝试已执行过，跳过重复投递",
                task.task_id, job.attempt
            );
            return Ok(ExecutionOutcome::Skipped);
        }

        self.store
            .update_status(TaskStatusUpdate::processing(&job.task_id, job.attempt))
            .await?;

        match self.client.analyze(&job.image).await {
            Ok(explanation) => {
                self.store
                    .update_status(TaskStatusUpdate::completed(&job.task_id, explanation))
                    .await?;
                self.metrics.record_request(TASK_COMPLETED);
                info!("任务 {} 完成，共尝试 {} 次", job.task_id, job.attempt);
                Ok(ExecutionOutcome::Completed)
            }
            Err(analysis_error) => self.handle_failure(job, analysis_error).await,
        }
    }

    async fn handle_failure(
        &self,
        job: AnalysisJob,
        analysis_error: AnalysisError,
    ) -> TutorResult<ExecutionOutcome> {
        let decision = self.retry_policy.decide(job.attempt, &analysis_error);
        let error_type = TutorError::from(analysis_error.clone()).error_type();

        self.log_error(
            ErrorLogEntry::for_task(&job.task_id, error_type, analysis_error.message()).with_details(
                json!({
                    "attempt": job.attempt,
                    "max_attempts": self.retry_policy.max_attempts,
                    "kind": analysis_error.kind_str(),
                    "will_retry": matches!(decision, RetryDecision::RetryAfter(_)),
                }),
            ),
        )
        .await;

        match decision {
            RetryDecision::RetryAfter(delay) => {
                let next = job.next_attempt();
                let next_attempt = next.attempt;
                if let Err(e) = self
                    .message_queue
                    .publish_after(&self.task_queue_name, &Message::analysis(next), delay)
                    .await
                {
                    self.mark_retry_unschedulable(&job.task_id, &e).await;
                    return Err(e);
                }
                warn!(
                    "任务 {} 第 {} 次尝试失败，{:?} 后重试: {}",
                    job.task_id,
                    job.attempt,
                    delay,
                    analysis_error.message()
                );
                Ok(ExecutionOutcome::RetryScheduled {
                    next_attempt,
                    delay,
                })
            }
            RetryDecision::GiveUp => {
                let error = analysis_error.message().to_string();
                self.store
                    .update_status(TaskStatusUpdate::failed(&job.task_id, error.clone()))
                    .await?;
                self.metrics.record_error(TASK_FAILED);
                error!(
                    "任务 {} 在第 {} 次尝试后失败: {}",
                    job.task_id, job.attempt, error
                );
                Ok(ExecutionOutcome::Failed { error })
            }
        }
    }

    /// 重试无法投递时任务不能停留在 processing
    async fn mark_retry_unschedulable(&self, task_id: &str, cause: &TutorError) {
        let message = format!("retry scheduling failed: {cause}");
        if let Err(e) = self
            .store
            .update_status(TaskStatusUpdate::failed(task_id, message.clone()))
            .await
        {
            error!("无法将任务 {} 标记为失败: {}", task_id, e);
        }
        self.metrics.record_error(TASK_FAILED);
        self.log_error(ErrorLogEntry::for_task(task_id, cause.error_type(), message))
            .await;
        error!("任务 {} 的重试投递失败: {}", task_id, cause);
    }

    /// 错误日志写入失败不影响任务处理
    async fn log_error(&self, entry: ErrorLogEntry) {
        if let Err(e) = self.monitoring.record_error(&entry).await {
            warn!("写入错误日志失败: {}", e);
        }
    }
}

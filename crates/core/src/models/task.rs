use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::{TutorError, TutorResult};

/// 图片解析任务
///
/// 一次图片提交及其完整生命周期记录。
///
/// # 字段说明
///
/// - `task_id`: 提交时生成的唯一标识（UUID v4），对调用方可见
/// - `user_id` / `school_id`: 不透明的身份与上下文字符串
/// - `status`: 任务状态，见 [`TaskStatus`]
/// - `result`: 仅在 `completed` 状态下存在
/// - `error_message`: 仅在 `failed` 状态下存在
/// - `attempts`: 已经进行的分析调用次数
/// - `created_at` / `updated_at`: UTC 时间，`updated_at` 单调不减
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    pub task_id: String,
    pub user_id: String,
    pub school_id: String,
    pub status: TaskStatus,
    pub result: Option<String>,
    pub error_message: Option<String>,
    pub attempts: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// 创建一个新的待处理任务
    pub fn new_pending(user_id: impl Into<String>, school_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            task_id: Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            school_id: school_id.into(),
            status: TaskStatus::Pending,
            result: None,
            error_message: None,
            attempts: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// 在当前任务上应用一次状态更新，返回更新后的任务
    ///
    /// 校验状态机边、结果与错误信息的互斥关系，并保证 `updated_at` 不回退。
    pub fn apply_update(&self, update: &TaskStatusUpdate) -> TutorResult<Task> {
        if !self.status.can_transition_to(update.status) {
            return Err(TutorError::InvalidStatusTransition {
                from: self.status.to_string(),
                to: update.status.to_string(),
            });
        }

        let (result, error_message) = match update.status {
            TaskStatus::Completed => {
                let result = update.result.clone().ok_or_else(|| {
                    TutorError::Internal(format!(
                        "任务 {} 完成时缺少解析结果",
                        self.task_id
                    ))
                })?;
                (Some(result), None)
            }
            TaskStatus::Failed => {
                let error = update
                    .error_message
                    .clone()
                    .unwrap_or_else(|| "unknown error".to_string());
                (None, Some(error))
            }
            TaskStatus::Pending | TaskStatus::Processing => (None, None),
        };

        let attempts = update.attempts.unwrap_or(self.attempts).max(self.attempts);
        let now = Utc::now();

        Ok(Task {
            status: update.status,
            result,
            error_message,
            attempts,
            updated_at: now.max(self.updated_at),
            ..self.clone()
        })
    }

    /// 状态查询接口返回的记录
    pub fn to_status_record(&self) -> TaskStatusRecord {
        TaskStatusRecord {
            task_id: self.task_id.clone(),
            status: self.status,
            created_at: self.created_at,
            updated_at: self.updated_at,
            result: self.result.clone(),
            error: self.error_message.clone(),
        }
    }
}

/// 任务状态
///
/// ```text
/// pending --> processing --> completed
///                 |  ^
///                 |  | (可重试的失败)
///                 +--+
///                 |
///                 +--> failed
/// ```
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Processing => "processing",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }

    /// 状态机允许的转换
    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        matches!(
            (self, next),
            (TaskStatus::Pending, TaskStatus::Processing)
                | (TaskStatus::Processing, TaskStatus::Processing)
                | (TaskStatus::Processing, TaskStatus::Completed)
                | (TaskStatus::Processing, TaskStatus::Failed)
        )
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = TutorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TaskStatus::Pending),
            "processing" => Ok(TaskStatus::Processing),
            "completed" => Ok(TaskStatus::Completed),
            "failed" => Ok(TaskStatus::Failed),
            _ => Err(TutorError::Serialization(format!("Invalid task status: {s}"))),
        }
    }
}

impl sqlx::Type<sqlx::Sqlite> for TaskStatus {
    fn type_info() -> sqlx::sqlite::SqliteTypeInfo {
        <str as sqlx::Type<sqlx::Sqlite>>::type_info()
    }
}

impl<'r> sqlx::Decode<'r, sqlx::Sqlite> for TaskStatus {
    fn decode(value: sqlx::sqlite::SqliteValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <&str as sqlx::Decode<sqlx::Sqlite>>::decode(value)?;
        s.parse::<TaskStatus>().map_err(|e| e.to_string().into())
    }
}

impl<'q> sqlx::Encode<'q, sqlx::Sqlite> for TaskStatus {
    fn encode_by_ref(
        &self,
        buf: &mut Vec<sqlx::sqlite::SqliteArgumentValue<'q>>,
    ) -> Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync>> {
        <&str as sqlx::Encode<sqlx::Sqlite>>::encode(self.as_str(), buf)
    }
}

/// 任务状态更新请求
#[derive(Debug, Clone, PartialEq)]
pub struct TaskStatusUpdate {
    pub task_id: String,
    pub status: TaskStatus,
    pub result: Option<String>,
    pub error_message: Option<String>,
    pub attempts: Option<i32>,
}

impl TaskStatusUpdate {
    pub fn processing(task_id: impl Into<String>, attempt: i32) -> Self {
        Self {
            task_id: task_id.into(),
            status: TaskStatus::Processing,
            result: None,
            error_message: None,
            attempts: Some(attempt),
        }
    }

    pub fn completed(task_id: impl Into<String>, result: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            status: TaskStatus::Completed,
            result: Some(result.into()),
            error_message: None,
            attempts: None,
        }
    }

    pub fn failed(task_id: impl Into<String>, error_message: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            status: TaskStatus::Failed,
            result: None,
            error_message: Some(error_message.into()),
            attempts: None,
        }
    }
}

/// 状态轮询接口的返回格式
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskStatusRecord {
    pub task_id: String,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

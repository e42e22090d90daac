use thiserror::Error;

/// 视觉分析调用的失败类型
///
/// - `Transient`: 超时、网络错误、服务端 5xx 等，可以重试
/// - `Fatal`: 明确的永久性失败，不重试，任务直接进入失败状态
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AnalysisError {
    #[error("分析服务暂时不可用: {0}")]
    Transient(String),

    #[error("分析失败: {0}")]
    Fatal(String),
}

impl AnalysisError {
    pub fn is_transient(&self) -> bool {
        matches!(self, AnalysisError::Transient(_))
    }

    pub fn message(&self) -> &str {
        match self {
            AnalysisError::Transient(msg) | AnalysisError::Fatal(msg) => msg,
        }
    }

    pub fn kind_str(&self) -> &'static str {
        match self {
            AnalysisError::Transient(_) => "transient",
            AnalysisError::Fatal(_) => "fatal",
        }
    }
}

/// 服务错误类型定义
#[derive(Debug, Error)]
pub enum TutorError {
    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),

    #[error("数据库操作错误: {0}")]
    DatabaseOperation(String),

    #[error("缓存错误: {0}")]
    Cache(String),

    #[error("任务未找到: {id}")]
    TaskNotFound { id: String },

    #[error("非法的任务状态转换: {from} -> {to}")]
    InvalidStatusTransition { from: String, to: String },

    #[error("请求参数无效: {0}")]
    Validation(String),

    #[error("请求过于频繁: {endpoint}, 请在 {retry_after_seconds} 秒后重试")]
    RateLimited {
        endpoint: String,
        retry_after_seconds: u64,
    },

    #[error(transparent)]
    Analysis(#[from] AnalysisError),

    #[error("消息队列错误: {0}")]
    MessageQueue(String),

    #[error("序列化错误: {0}")]
    Serialization(String),

    #[error("配置错误: {0}")]
    Configuration(String),

    #[error("内部错误: {0}")]
    Internal(String),
}

impl TutorError {
    /// 持久层错误会危及数据源的正确性，调用方必须向上传播
    pub fn is_store_error(&self) -> bool {
        matches!(
            self,
            TutorError::Database(_) | TutorError::DatabaseOperation(_)
        )
    }

    /// 用于错误日志和指标的错误类型标识
    pub fn error_type(&self) -> &'static str {
        match self {
            TutorError::Database(_) | TutorError::DatabaseOperation(_) => "store_error",
            TutorError::Cache(_) => "cache_error",
            TutorError::TaskNotFound { .. } => "task_not_found",
            TutorError::InvalidStatusTransition { .. } => "invalid_status_transition",
            TutorError::Validation(_) => "validation_error",
            TutorError::RateLimited { .. } => "rate_limited",
            TutorError::Analysis(AnalysisError::Transient(_)) => "analysis_transient",
            TutorError::Analysis(AnalysisError::Fatal(_)) => "analysis_fatal",
            TutorError::MessageQueue(_) => "message_queue_error",
            TutorError::Serialization(_) => "serialization_error",
            TutorError::Configuration(_) => "configuration_error",
            TutorError::Internal(_) => "internal_error",
        }
    }
}

impl From<serde_json::Error> for TutorError {
    fn from(err: serde_json::Error) -> Self {
        TutorError::Serialization(err.to_string())
    }
}

/// 统一的Result类型
pub type TutorResult<T> = std::result::Result<T, TutorError>;

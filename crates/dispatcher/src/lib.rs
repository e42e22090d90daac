//! 任务调度层
//!
//! 提交端的限流、校验与入队，以及 worker 端的分析执行与重试决策。

pub mod analysis_client;
pub mod dispatcher;
pub mod retry_service;
pub mod validation;

pub use analysis_client::{RetryingAnalysisClient, VISION_API};
pub use dispatcher::{ExecutionOutcome, SubmitRequest, TaskDispatcher, TASK_COMPLETED, TASK_FAILED};
pub use retry_service::{RetryDecision, RetryPolicy};
pub use validation::{ImageFormat, ImageValidator};

//! # 数据模型
//!
//! - [`Task`] / [`TaskStatus`]: 任务及其状态机
//! - [`TaskStatusRecord`]: 状态轮询的返回格式
//! - [`Message`] / [`AnalysisJob`]: 作业队列载荷
//! - [`MetricsSnapshot`] / [`ErrorLogEntry`]: 监控日志与错误日志
//!
//! 所有时间字段使用 `DateTime<Utc>`。

pub mod message;
pub mod metrics;
pub mod task;

pub use message::*;
pub use metrics::*;
pub use task::*;

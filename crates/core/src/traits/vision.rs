use async_trait::async_trait;

use crate::errors::AnalysisError;

/// 外部视觉分析服务
///
/// 一次调用对应一次分析尝试，超时和重试由调用方负责。
#[async_trait]
pub trait VisionApi: Send + Sync {
    async fn explain(&self, image: &[u8]) -> Result<String, AnalysisError>;
}

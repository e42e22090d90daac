use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};
use tutor_core::{
    config::AnalysisConfig, errors::AnalysisError, traits::VisionApi, TutorError, TutorResult,
};

/// OpenAI 兼容的 chat completions 视觉客户端
///
/// 只负责一次请求和错误分类，超时与重试在上层处理。
pub struct OpenAiVisionClient {
    http_client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
    prompt: String,
    image_detail: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

impl OpenAiVisionClient {
    pub fn new(config: &AnalysisConfig) -> TutorResult<Self> {
        let api_key = config.resolved_api_key().ok_or_else(|| {
            TutorError::Configuration(
                "缺少视觉分析 API key，请设置 analysis.api_key 或 OPENAI_API_KEY".to_string(),
            )
        })?;

        let http_client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| TutorError::Configuration(format!("创建 HTTP 客户端失败: {e}")))?;

        Ok(Self {
            http_client,
            endpoint: format!(
                "{}/chat/completions",
                config.api_base_url.trim_end_matches('/')
            ),
            api_key,
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            prompt: config.prompt.clone(),
            image_detail: config.image_detail.clone(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn request_body(&self, image: &[u8]) -> Value {
        let data_url = format!("data:image/jpeg;base64,{}", STANDARD.encode(image));
        json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "temperature": self.temperature,
            "messages": [{
                "role": "user",
                "content": [
                    { "type": "text", "text": self.prompt },
                    {
                        "type": "image_url",
                        "image_url": { "url": data_url, "detail": self.image_detail }
                    }
                ]
            }]
        })
    }
}

/// 408、429 和 5xx 可以重试，其余状态码直接失败
fn is_retryable_status(status: StatusCode) -> bool {
    status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
        || status.is_server_error()
}

#[async_trait]
impl VisionApi for OpenAiVisionClient {
    async fn explain(&self, image: &[u8]) -> Result<String, AnalysisError> {
        debug!(bytes = image.len(), "调用视觉分析服务");

        let response = self
            .http_client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&self.request_body(image))
            .send()
            .await
            .map_err(|e| {
                warn!("视觉分析服务连接失败: {}", e);
                AnalysisError::Transient(format!("vision api connection error: {e}"))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!("视觉分析服务返回错误: HTTP {} - {}", status, body);
            let message = format!("vision api returned HTTP {status}: {body}");
            return Err(if is_retryable_status(status) {
                AnalysisError::Transient(message)
            } else {
                AnalysisError::Fatal(message)
            });
        }

        let parsed: ChatCompletionResponse = response.json().await.map_err(|e| {
            AnalysisError::Fatal(format!("vision api returned an unreadable body: {e}"))
        })?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| AnalysisError::Fatal("vision api returned no choices".to_string()))?;

        Ok(content.trim().to_string())
    }
}

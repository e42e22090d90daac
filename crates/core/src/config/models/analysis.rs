use serde::{Deserialize, Serialize};

const DEFAULT_PROMPT: &str = "Analyze the problem shown in this image and give educational \
guidance suited to middle and high school learners. Do not carry out the calculation; \
explain only the steps needed to solve it, within the scope of what such students know. \
Write inline math between $ $ and display math between $$ $$ (MathJax).";

/// 视觉分析服务配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub api_base_url: String,
    /// 未配置时读取 `OPENAI_API_KEY` 环境变量
    pub api_key: Option<String>,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub prompt: String,
    pub image_detail: String,
    /// 单次调用的超时时间
    pub timeout_seconds: u64,
    pub max_attempts: u32,
    /// 固定重试间隔
    pub retry_delay_seconds: u64,
    pub max_image_bytes: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            api_base_url: "https://api.openai.com/v1".to_string(),
            api_key: None,
            model: "gpt-4.1".to_string(),
            max_tokens: 1500,
            temperature: 0.7,
            prompt: DEFAULT_PROMPT.to_string(),
            image_detail: "auto".to_string(),
            timeout_seconds: 60,
            max_attempts: 3,
            retry_delay_seconds: 60,
            max_image_bytes: 16 * 1024 * 1024,
        }
    }
}

impl AnalysisConfig {
    /// 解析实际使用的 API key
    pub fn resolved_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .filter(|key| !key.is_empty())
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .filter(|key| !key.is_empty())
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.api_base_url.is_empty() {
            return Err(anyhow::anyhow!("分析服务地址不能为空"));
        }

        if self.model.is_empty() {
            return Err(anyhow::anyhow!("模型名称不能为空"));
        }

        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(anyhow::anyhow!("temperature 必须在 0.0 到 2.0 之间"));
        }

        if self.timeout_seconds == 0 {
            return Err(anyhow::anyhow!("分析调用超时时间必须大于0"));
        }

        if self.max_attempts == 0 {
            return Err(anyhow::anyhow!("最大尝试次数必须大于0"));
        }

        if self.max_image_bytes == 0 {
            return Err(anyhow::anyhow!("图片大小上限必须大于0"));
        }

        Ok(())
    }
}

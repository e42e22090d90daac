use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub enabled: bool,
    pub bind_address: String,
    pub cors_enabled: bool,
    pub cors_origins: Vec<String>,
    pub max_request_bytes: usize,
    /// Shared secret for the admin endpoints; admin access is refused when unset
    pub admin_token: Option<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind_address: "0.0.0.0:8080".to_string(),
            cors_enabled: true,
            cors_origins: vec!["*".to_string()],
            // base64 inflates a 16 MiB image by a third
            max_request_bytes: 24 * 1024 * 1024,
            admin_token: None,
        }
    }
}

impl ApiConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.bind_address.is_empty() {
            return Err(anyhow::anyhow!("绑定地址不能为空"));
        }
        if !self.bind_address.contains(':') {
            return Err(anyhow::anyhow!("绑定地址格式无效，应为 host:port"));
        }

        if self.max_request_bytes == 0 {
            return Err(anyhow::anyhow!("请求体大小上限必须大于0"));
        }

        if matches!(&self.admin_token, Some(token) if token.is_empty()) {
            return Err(anyhow::anyhow!("管理员令牌不能为空字符串"));
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub log_level: String,
    pub log_format: String,
    pub metrics_enabled: bool,
    pub metrics_flush_interval_seconds: u64,
    /// Number of samples kept per endpoint for the average response time
    pub response_time_window: usize,
    pub resource_sample_interval_seconds: u64,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
            metrics_enabled: true,
            metrics_flush_interval_seconds: 300,
            response_time_window: 100,
            resource_sample_interval_seconds: 30,
        }
    }
}

impl ObservabilityConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log_level.as_str()) {
            return Err(anyhow::anyhow!("无效的日志级别: {}", self.log_level));
        }

        if !["json", "pretty"].contains(&self.log_format.as_str()) {
            return Err(anyhow::anyhow!("无效的日志格式: {}", self.log_format));
        }

        if self.metrics_flush_interval_seconds == 0 {
            return Err(anyhow::anyhow!("指标落盘间隔必须大于0"));
        }

        if self.response_time_window == 0 {
            return Err(anyhow::anyhow!("响应时间窗口必须大于0"));
        }

        if self.resource_sample_interval_seconds == 0 {
            return Err(anyhow::anyhow!("资源采样间隔必须大于0"));
        }

        Ok(())
    }
}

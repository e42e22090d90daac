use anyhow::{Context, Result};
use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::Path;

use super::{
    analysis::AnalysisConfig,
    api_observability::{ApiConfig, ObservabilityConfig},
    cache_queue::{CacheConfig, QueueConfig},
    database::DatabaseConfig,
    rate_limiting::RateLimitingConfig,
    worker_retention::{RetentionConfig, WorkerConfig},
};

/// System configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub cache: CacheConfig,
    pub queue: QueueConfig,
    pub rate_limiting: RateLimitingConfig,
    pub analysis: AnalysisConfig,
    pub worker: WorkerConfig,
    pub api: ApiConfig,
    pub observability: ObservabilityConfig,
    pub retention: RetentionConfig,
}

impl AppConfig {
    /// Load configuration from config file and environment variables
    ///
    /// Load order:
    /// 1. Default configuration
    /// 2. Config file (TOML format)
    /// 3. Environment variable overrides (prefix: TUTOR, separator: `__`)
    ///
    /// # Arguments
    ///
    /// * `config_path` - Config file path, if None use default paths
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut builder = ConfigBuilder::builder();

        // 1. Load config file if provided
        if let Some(path) = config_path {
            if Path::new(path).exists() {
                builder = builder.add_source(File::new(path, FileFormat::Toml));
            } else {
                return Err(anyhow::anyhow!("配置文件不存在: {}", path));
            }
        } else {
            let default_paths = ["config/tutor.toml", "tutor.toml", "/etc/tutor/config.toml"];

            if let Some(path) = default_paths.iter().find(|p| Path::new(p).exists()) {
                builder = builder.add_source(File::new(path, FileFormat::Toml));
            }
        }

        // 2. Environment variable overrides - highest priority
        builder = builder.add_source(
            Environment::with_prefix("TUTOR")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config: AppConfig = builder
            .build()
            .context("构建配置失败")?
            .try_deserialize()
            .context("反序列化配置失败")?;

        config.validate()?;

        Ok(config)
    }

    /// Load configuration from TOML string
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(toml_str).context("解析TOML配置失败")?;

        config.validate()?;
        Ok(config)
    }

    /// Serialize configuration to TOML string
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("序列化配置为TOML失败")
    }

    /// Validate configuration effectiveness
    pub fn validate(&self) -> Result<()> {
        self.database.validate().context("数据库配置验证失败")?;
        self.cache.validate().context("缓存配置验证失败")?;
        self.queue.validate().context("任务队列配置验证失败")?;
        self.rate_limiting
            .validate()
            .context("限流配置验证失败")?;
        self.analysis.validate().context("分析服务配置验证失败")?;
        self.worker.validate().context("Worker配置验证失败")?;
        self.api.validate().context("API配置验证失败")?;
        self.observability
            .validate()
            .context("可观测性配置验证失败")?;
        self.retention.validate().context("保留策略配置验证失败")?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CacheBackend;
    use std::io::Write;

    #[test]
    fn test_default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.analysis.model, "gpt-4.1");
        assert_eq!(config.analysis.max_tokens, 1500);
        assert_eq!(config.analysis.max_attempts, 3);
        assert_eq!(config.analysis.retry_delay_seconds, 60);
        assert_eq!(config.rate_limiting.submit.max_calls, 5);
        assert_eq!(config.rate_limiting.submit.period_seconds, 60);
        assert_eq!(config.cache.result_ttl_seconds, 3600);
        assert_eq!(config.observability.response_time_window, 100);
        assert_eq!(config.observability.metrics_flush_interval_seconds, 300);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let toml_str = r#"
[cache]
backend = "redis"
redis_url = "redis://cache:6379"

[rate_limiting.submit]
max_calls = 10
period_seconds = 30
"#;

        let config = AppConfig::from_toml(toml_str).unwrap();
        assert_eq!(config.cache.backend, CacheBackend::Redis);
        assert_eq!(config.cache.key_prefix, "tutor");
        assert_eq!(config.rate_limiting.submit.max_calls, 10);
        assert_eq!(config.rate_limiting.status.max_calls, 60);
        assert_eq!(config.database.url, "sqlite://data/tutor.db");
    }

    #[test]
    fn test_invalid_config_rejected() {
        let toml_str = r#"
[analysis]
max_attempts = 0
"#;
        assert!(AppConfig::from_toml(toml_str).is_err());

        let toml_str = r#"
[database]
url = "postgresql://localhost/tutor"
"#;
        assert!(AppConfig::from_toml(toml_str).is_err());
    }

    #[test]
    fn test_toml_roundtrip() {
        let mut config = AppConfig::default();
        config.api.admin_token = Some("secret".to_string());

        let serialized = config.to_toml().unwrap();
        let parsed = AppConfig::from_toml(&serialized).unwrap();
        assert_eq!(parsed.api.admin_token.as_deref(), Some("secret"));
        assert_eq!(parsed.analysis.prompt, config.analysis.prompt);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[retention]
retention_days = 7

[observability]
log_format = "json"
"#
        )
        .unwrap();

        let config = AppConfig::load(file.path().to_str()).unwrap();
        assert_eq!(config.retention.retention_days, 7);
        assert_eq!(config.observability.log_format, "json");
    }

    #[test]
    fn test_load_missing_file_fails() {
        assert!(AppConfig::load(Some("/nonexistent/tutor.toml")).is_err());
    }

    #[test]
    fn test_environment_override() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[worker]\nmax_concurrent_tasks = 2").unwrap();

        std::env::set_var("TUTOR__WORKER__MAX_CONCURRENT_TASKS", "9");
        let config = AppConfig::load(file.path().to_str());
        std::env::remove_var("TUTOR__WORKER__MAX_CONCURRENT_TASKS");

        assert_eq!(config.unwrap().worker.max_concurrent_tasks, 9);
    }
}

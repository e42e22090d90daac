use serde::{Deserialize, Serialize};

/// Cache backend selection
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    /// In-process cache, lost on restart
    Memory,
    /// Shared Redis instance
    Redis,
}

/// Cache tier configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    pub backend: CacheBackend,
    pub redis_url: String,
    pub key_prefix: String,
    /// TTL for terminal task records
    pub result_ttl_seconds: u64,
    pub connection_timeout_seconds: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            backend: CacheBackend::Memory,
            redis_url: "redis://localhost:6379".to_string(),
            key_prefix: "tutor".to_string(),
            result_ttl_seconds: 3600,
            connection_timeout_seconds: 5,
        }
    }
}

impl CacheConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.backend == CacheBackend::Redis && !self.redis_url.starts_with("redis://") {
            return Err(anyhow::anyhow!("Redis URL must start with redis://"));
        }

        if self.key_prefix.is_empty() {
            return Err(anyhow::anyhow!("Cache key prefix cannot be empty"));
        }

        if self.result_ttl_seconds == 0 {
            return Err(anyhow::anyhow!("Cache TTL must be greater than 0"));
        }

        Ok(())
    }
}

/// Job queue configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub task_queue: String,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            task_queue: "analysis_jobs".to_string(),
        }
    }
}

impl QueueConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.task_queue.is_empty() {
            return Err(anyhow::anyhow!("任务队列名称不能为空"));
        }
        Ok(())
    }
}

use serde::{Deserialize, Serialize};

use crate::models::EndpointClass;

/// Sliding-window budget for one endpoint class
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct EndpointRateLimit {
    pub max_calls: u32,
    pub period_seconds: u64,
}

impl EndpointRateLimit {
    pub const fn new(max_calls: u32, period_seconds: u64) -> Self {
        Self {
            max_calls,
            period_seconds,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitingConfig {
    pub enabled: bool,
    pub submit: EndpointRateLimit,
    pub status: EndpointRateLimit,
    pub history: EndpointRateLimit,
    /// Interval of the housekeeping sweep that drops empty windows
    pub purge_interval_seconds: u64,
}

impl Default for RateLimitingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            submit: EndpointRateLimit::new(5, 60),
            status: EndpointRateLimit::new(60, 60),
            history: EndpointRateLimit::new(30, 60),
            purge_interval_seconds: 300,
        }
    }
}

impl RateLimitingConfig {
    pub fn limit_for(&self, class: EndpointClass) -> EndpointRateLimit {
        match class {
            EndpointClass::Submit => self.submit,
            EndpointClass::Status => self.status,
            EndpointClass::History => self.history,
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        for class in EndpointClass::ALL {
            let limit = self.limit_for(class);
            if limit.max_calls == 0 {
                return Err(anyhow::anyhow!("{} 限流的最大调用次数必须大于0", class));
            }
            if limit.period_seconds == 0 {
                return Err(anyhow::anyhow!("{} 限流的时间窗口必须大于0", class));
            }
        }

        if self.purge_interval_seconds == 0 {
            return Err(anyhow::anyhow!("限流清理间隔必须大于0"));
        }

        Ok(())
    }
}

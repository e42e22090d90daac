use std::time::Duration;

use tutor_core::{config::AnalysisConfig, errors::AnalysisError};

/// 重试决策
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// 延迟指定时间后重新投递作业
    RetryAfter(Duration),
    GiveUp,
}

/// 分析失败后的重试策略
///
/// 固定间隔重试，只有可重试错误且尚未达到最大尝试次数时才重试。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub retry_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_delay: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, retry_delay: Duration) -> Self {
        Self {
            max_attempts,
            retry_delay,
        }
    }

    pub fn from_config(config: &AnalysisConfig) -> Self {
        Self::new(
            config.max_attempts,
            Duration::from_secs(config.retry_delay_seconds),
        )
    }

    /// `attempt` 是刚刚失败的那次尝试的序号，从 1 开始
    pub fn decide(&self, attempt: i32, error: &AnalysisError) -> RetryDecision {
        if error.is_transient() && attempt < self.max_attempts as i32 {
            RetryDecision::RetryAfter(self.retry_delay)
        } else {
            RetryDecision::GiveUp
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transient() -> AnalysisError {
        AnalysisError::Transient("timeout".to_string())
    }

    #[test]
    fn test_default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.retry_delay, Duration::from_secs(60));
        assert_eq!(RetryPolicy::from_config(&AnalysisConfig::default()), policy);
    }

    #[test]
    fn test_transient_errors_retry_until_cap() {
        let policy = RetryPolicy::default();

        assert_eq!(
            policy.decide(1, &transient()),
            RetryDecision::RetryAfter(Duration::from_secs(60))
        );
        assert_eq!(
            policy.decide(2, &transient()),
            RetryDecision::RetryAfter(Duration::from_secs(60))
        );
        assert_eq!(policy.decide(3, &transient()), RetryDecision::GiveUp);
        assert_eq!(policy.decide(4, &transient()), RetryDecision::GiveUp);
    }

    #[test]
    fn test_fatal_errors_never_retry() {
        let policy = RetryPolicy::default();
        let fatal = AnalysisError::Fatal("bad request".to_string());

        assert_eq!(policy.decide(1, &fatal), RetryDecision::GiveUp);
    }

    #[test]
    fn test_delay_is_fixed() {
        let policy = RetryPolicy::new(5, Duration::from_secs(7));

        for attempt in 1..5 {
            assert_eq!(
                policy.decide(attempt, &transient()),
                RetryDecision::RetryAfter(Duration::from_secs(7))
            );
        }
    }
}

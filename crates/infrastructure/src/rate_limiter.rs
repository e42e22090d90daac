use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio::sync::broadcast;
use tracing::{debug, info};
use tutor_core::{
    config::{EndpointRateLimit, RateLimitingConfig},
    models::EndpointClass,
    TutorError, TutorResult,
};

type WindowKey = (String, EndpointClass);

/// 滑动窗口限流器
///
/// 每个 `(identity, endpoint_class)` 一个窗口，保存最近一个周期内被放行请求的时间戳。
/// 检查与追加在同一个 DashMap 分片锁内完成，不存在全局锁。
pub struct RateLimiter {
    config: RateLimitingConfig,
    windows: DashMap<WindowKey, VecDeque<Instant>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitingConfig) -> Self {
        Self {
            config,
            windows: DashMap::new(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// 判断当前请求是否放行，放行时记录本次请求
    pub fn allow(&self, identity: &str, class: EndpointClass) -> bool {
        self.allow_at(identity, class, Instant::now())
    }

    /// 以指定时间点做判断，便于确定性测试
    pub fn allow_at(&self, identity: &str, class: EndpointClass, now: Instant) -> bool {
        self.admit_at(identity, class, now).is_ok()
    }

    /// 与 [`allow`](Self::allow) 相同，拒绝时返回 `RateLimited`
    pub fn check(&self, identity: &str, class: EndpointClass) -> TutorResult<()> {
        self.admit_at(identity, class, Instant::now())
            .map_err(|retry_after| {
                debug!(identity, endpoint = %class, "请求被限流");
                TutorError::RateLimited {
                    endpoint: class.to_string(),
                    retry_after_seconds: retry_after_seconds(retry_after),
                }
            })
    }

    /// 放行返回 Ok，拒绝时返回距离最早一条记录过期的时间
    fn admit_at(&self, identity: &str, class: EndpointClass, now: Instant) -> Result<(), Duration> {
        if !self.config.enabled {
            return Ok(());
        }

        let limit = self.config.limit_for(class);
        let period = Duration::from_secs(limit.period_seconds);

        let mut window = self
            .windows
            .entry((identity.to_string(), class))
            .or_default();
        prune(&mut window, now, period);

        if window.len() >= limit.max_calls as usize {
            let retry_after = window
                .front()
                .map(|oldest| (*oldest + period).saturating_duration_since(now))
                .unwrap_or(period);
            return Err(retry_after);
        }

        window.push_back(now);
        Ok(())
    }

    /// 清理过期时间戳并删除空窗口，返回删除的窗口数量
    pub fn purge_expired(&self) -> usize {
        self.purge_expired_at(Instant::now())
    }

    pub fn purge_expired_at(&self, now: Instant) -> usize {
        let before = self.windows.len();
        self.windows.retain(|(_, class), window| {
            let period = Duration::from_secs(self.config.limit_for(*class).period_seconds);
            prune(window, now, period);
            !window.is_empty()
        });
        before.saturating_sub(self.windows.len())
    }

    /// 当前跟踪的窗口数量
    pub fn tracked_windows(&self) -> usize {
        self.windows.len()
    }

    pub fn limit_for(&self, class: EndpointClass) -> EndpointRateLimit {
        self.config.limit_for(class)
    }

    /// 周期性清理空窗口，直到收到关闭信号
    pub async fn run_housekeeping(self: Arc<Self>, mut shutdown_rx: broadcast::Receiver<()>) {
        let mut interval = tokio::time::interval(Duration::from_secs(
            self.config.purge_interval_seconds,
        ));
        interval.tick().await;

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let purged = self.purge_expired();
                    if purged > 0 {
                        debug!("限流器清理了 {} 个空窗口", purged);
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("限流器清理任务已停止");
                    break;
                }
            }
        }
    }
}

/// 删除早于 `now - period` 的时间戳
fn prune(window: &mut VecDeque<Instant>, now: Instant, period: Duration) {
    let Some(cutoff) = now.checked_sub(period) else {
        return;
    };
    while matches!(window.front(), Some(ts) if *ts < cutoff) {
        window.pop_front();
    }
}

fn retry_after_seconds(retry_after: Duration) -> u64 {
    let secs = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
    secs.max(1)
}

//! Process-wide metrics aggregation
//!
//! Counters and response-time windows live in sharded maps so concurrent
//! recorders only contend on the same key. Every record call is mirrored into
//! the `metrics` facade; when a Prometheus recorder is installed it exposes the
//! same numbers.

use std::collections::{BTreeMap, VecDeque};
use std::sync::RwLock;
use std::time::{Duration, Instant};

use chrono::Utc;
use dashmap::DashMap;
use metrics::{counter, gauge, histogram};
use tracing::warn;
use tutor_core::models::{MetricsSnapshot, ResourceUsage};

pub const DEFAULT_RESPONSE_TIME_WINDOW: usize = 100;

pub struct MetricsCollector {
    started_at: Instant,
    response_time_window: usize,
    request_counts: DashMap<String, u64>,
    error_counts: DashMap<String, u64>,
    response_times: DashMap<String, VecDeque<f64>>,
    api_call_counts: DashMap<String, u64>,
    resource_usage: RwLock<ResourceUsage>,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new(DEFAULT_RESPONSE_TIME_WINDOW)
    }
}

impl MetricsCollector {
    /// `response_time_window` is the number of samples averaged per endpoint
    pub fn new(response_time_window: usize) -> Self {
        Self {
            started_at: Instant::now(),
            response_time_window: response_time_window.max(1),
            request_counts: DashMap::new(),
            error_counts: DashMap::new(),
            response_times: DashMap::new(),
            api_call_counts: DashMap::new(),
            resource_usage: RwLock::new(ResourceUsage::default()),
        }
    }

    pub fn record_request(&self, endpoint: &str) {
        *self.request_counts.entry(endpoint.to_string()).or_insert(0) += 1;
        counter!("tutor_requests_total", "endpoint" => endpoint.to_string()).increment(1);
    }

    pub fn record_error(&self, endpoint: &str) {
        *self.error_counts.entry(endpoint.to_string()).or_insert(0) += 1;
        counter!("tutor_errors_total", "endpoint" => endpoint.to_string()).increment(1);
    }

    pub fn record_response_time(&self, endpoint: &str, duration: Duration) {
        let seconds = duration.as_secs_f64();
        {
            let mut samples = self.response_times.entry(endpoint.to_string()).or_default();
            if samples.len() == self.response_time_window {
                samples.pop_front();
            }
            samples.push_back(seconds);
        }
        histogram!("tutor_response_time_seconds", "endpoint" => endpoint.to_string())
            .record(seconds);
    }

    pub fn record_api_call(&self, api_name: &str) {
        *self.api_call_counts.entry(api_name.to_string()).or_insert(0) += 1;
        counter!("tutor_api_calls_total", "api" => api_name.to_string()).increment(1);
    }

    /// Latest resource sample, written by the resource monitor
    pub fn set_resource_usage(&self, usage: ResourceUsage) {
        gauge!("tutor_process_memory_mb").set(usage.process_memory_mb);
        gauge!("tutor_process_cpu_percent").set(f64::from(usage.process_cpu_percent));
        gauge!("tutor_system_memory_used_mb").set(usage.system_memory_used_mb);

        match self.resource_usage.write() {
            Ok(mut current) => *current = usage,
            Err(poisoned) => {
                warn!("resource usage lock poisoned, overwriting");
                *poisoned.into_inner() = usage;
            }
        }
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Immutable copy of everything collected so far
    pub fn snapshot(&self) -> MetricsSnapshot {
        let average_response_time = self
            .response_times
            .iter()
            .filter(|entry| !entry.value().is_empty())
            .map(|entry| {
                let samples = entry.value();
                let mean = samples.iter().sum::<f64>() / samples.len() as f64;
                (entry.key().clone(), mean)
            })
            .collect();

        let resource_usage = match self.resource_usage.read() {
            Ok(usage) => usage.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };

        MetricsSnapshot {
            uptime_seconds: self.uptime().as_secs_f64(),
            request_counts: to_sorted(&self.request_counts),
            error_counts: to_sorted(&self.error_counts),
            average_response_time,
            api_call_counts: to_sorted(&self.api_call_counts),
            resource_usage,
            timestamp: Utc::now(),
        }
    }
}

fn to_sorted(map: &DashMap<String, u64>) -> BTreeMap<String, u64> {
    map.iter()
        .map(|entry| (entry.key().clone(), *entry.value()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_counters() {
        let collector = MetricsCollector::default();

        collector.record_request("submit");
        collector.record_request("submit");
        collector.record_error("submit");
        collector.record_api_call("vision_api");

        let snapshot = collector.snapshot();
        assert_eq!(snapshot.request_counts["submit"], 2);
        assert_eq!(snapshot.error_counts["submit"], 1);
        assert_eq!(snapshot.api_call_counts["vision_api"], 1);
        assert!(!snapshot.error_counts.contains_key("status"));
    }

    #[test]
    fn test_average_response_time() {
        let collector = MetricsCollector::default();

        collector.record_response_time("x", Duration::from_millis(100));
        collector.record_response_time("x", Duration::from_millis(50));
        collector.record_response_time("x", Duration::from_millis(150));

        let average = collector.snapshot().average_response_time["x"];
        assert!((average - 0.1).abs() < 1e-9);
    }

    #[test]
    fn test_response_time_window_is_bounded() {
        let collector = MetricsCollector::new(3);

        collector.record_response_time("x", Duration::from_secs(10));
        for _ in 0..3 {
            collector.record_response_time("x", Duration::from_secs(1));
        }

        let average = collector.snapshot().average_response_time["x"];
        assert!((average - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_snapshot_is_a_copy() {
        let collector = MetricsCollector::default();
        collector.record_request("submit");

        let before = collector.snapshot();
        collector.record_request("submit");

        assert_eq!(before.request_counts["submit"], 1);
        assert_eq!(collector.snapshot().request_counts["submit"], 2);
    }

    #[test]
    fn test_resource_usage_in_snapshot() {
        let collector = MetricsCollector::default();
        collector.set_resource_usage(ResourceUsage {
            process_memory_mb: 42.0,
            ..ResourceUsage::default()
        });

        assert_eq!(collector.snapshot().resource_usage.process_memory_mb, 42.0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_recording() {
        let collector = Arc::new(MetricsCollector::default());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let collector = collector.clone();
                tokio::spawn(async move {
                    for _ in 0..250 {
                        collector.record_request("submit");
                        collector.record_api_call("vision_api");
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }

        let snapshot = collector.snapshot();
        assert_eq!(snapshot.request_counts["submit"], 2000);
        assert_eq!(snapshot.api_call_counts["vision_api"], 2000);
    }
}

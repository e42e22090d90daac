use std::sync::{Arc, Mutex};
use std::time::Duration;

use sysinfo::{Pid, ProcessExt, System, SystemExt};
use tokio::time::interval;
use tracing::{debug, info, warn};
use tutor_core::models::ResourceUsage;

use super::MetricsCollector;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// 资源监控器
///
/// 周期性采样进程和系统的内存与 CPU，写入 [`MetricsCollector`]。
pub struct ResourceMonitor {
    system: Arc<Mutex<System>>,
    pid: Option<Pid>,
    sample_interval: Duration,
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
    monitor_handle: Option<tokio::task::JoinHandle<()>>,
}

impl ResourceMonitor {
    pub fn new(sample_interval: Duration) -> Self {
        let pid = match sysinfo::get_current_pid() {
            Ok(pid) => Some(pid),
            Err(e) => {
                warn!("无法获取当前进程ID，只采样系统资源: {}", e);
                None
            }
        };

        Self {
            system: Arc::new(Mutex::new(System::new())),
            pid,
            sample_interval,
            shutdown_tx: None,
            monitor_handle: None,
        }
    }

    /// 采样一次资源使用情况
    pub fn sample(&self) -> ResourceUsage {
        Self::sample_with(&self.system, self.pid)
    }

    fn sample_with(system: &Mutex<System>, pid: Option<Pid>) -> ResourceUsage {
        let mut sys = match system.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        sys.refresh_memory();
        let mut usage = ResourceUsage {
            system_memory_used_mb: sys.used_memory() as f64 / BYTES_PER_MB,
            system_memory_total_mb: sys.total_memory() as f64 / BYTES_PER_MB,
            ..ResourceUsage::default()
        };

        if let Some(pid) = pid {
            if sys.refresh_process(pid) {
                if let Some(process) = sys.process(pid) {
                    usage.process_memory_mb = process.memory() as f64 / BYTES_PER_MB;
                    usage.process_cpu_percent = process.cpu_usage();
                }
            }
        }

        usage
    }

    /// 启动监控
    pub fn start(&mut self, collector: Arc<MetricsCollector>) {
        if self.monitor_handle.is_some() {
            return;
        }

        info!("Starting resource monitor, interval {:?}", self.sample_interval);

        let (shutdown_tx, mut shutdown_rx) = tokio::sync::oneshot::channel();
        self.shutdown_tx = Some(shutdown_tx);

        let system = self.system.clone();
        let pid = self.pid;
        let sample_interval = self.sample_interval;

        let handle = tokio::spawn(async move {
            let mut monitor_interval = interval(sample_interval);

            loop {
                tokio::select! {
                    _ = monitor_interval.tick() => {
                        let usage = Self::sample_with(&system, pid);
                        debug!(
                            process_memory_mb = usage.process_memory_mb,
                            process_cpu_percent = usage.process_cpu_percent,
                            "resource sample"
                        );
                        collector.set_resource_usage(usage);
                    }
                    _ = &mut shutdown_rx => {
                        break;
                    }
                }
            }

            info!("Resource monitor stopped");
        });

        self.monitor_handle = Some(handle);
    }

    /// 停止监控
    pub async fn stop(&mut self) {
        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            let _ = shutdown_tx.send(());
        }

        if let Some(handle) = self.monitor_handle.take() {
            if let Err(e) = handle.await {
                warn!("Error waiting for resource monitor to stop: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_reports_system_memory() {
        let monitor = ResourceMonitor::new(Duration::from_secs(1));
        let usage = monitor.sample();

        assert!(usage.system_memory_total_mb > 0.0);
        assert!(usage.system_memory_used_mb <= usage.system_memory_total_mb);
    }

    #[tokio::test]
    async fn test_start_publishes_into_collector() {
        let collector = Arc::new(MetricsCollector::default());
        let mut monitor = ResourceMonitor::new(Duration::from_millis(10));

        monitor.start(collector.clone());
        tokio::time::sleep(Duration::from_millis(50)).await;
        monitor.stop().await;

        assert!(collector.snapshot().resource_usage.system_memory_total_mb > 0.0);
    }
}

//! Observability module
//!
//! - In-process metrics aggregation mirrored to the `metrics` facade
//! - Resource sampling with `sysinfo`
//! - Periodic snapshot persistence into the monitoring log

pub mod metrics_collector;
pub mod resource_monitor;
pub mod snapshot_flusher;

pub use metrics_collector::MetricsCollector;
pub use resource_monitor::ResourceMonitor;
pub use snapshot_flusher::SnapshotFlusher;

pub mod analysis;
pub mod api_observability;
pub mod app_config;
pub mod cache_queue;
pub mod database;
pub mod rate_limiting;
pub mod worker_retention;

pub use analysis::AnalysisConfig;
pub use api_observability::{ApiConfig, ObservabilityConfig};
pub use app_config::AppConfig;
pub use cache_queue::{CacheBackend, CacheConfig, QueueConfig};
pub use database::DatabaseConfig;
pub use rate_limiting::{EndpointRateLimit, RateLimitingConfig};
pub use worker_retention::{RetentionConfig, WorkerConfig};

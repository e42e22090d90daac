pub mod cache;
pub mod cleanup_service;
pub mod database;
pub mod in_memory_queue;
pub mod observability;
pub mod rate_limiter;
pub mod vision;

pub use cache::{create_cache_service, CacheService, CacheServiceExt, InMemoryCache, TaskStore};
pub use cleanup_service::{CleanupService, CleanupStats};
pub use database::*;
pub use in_memory_queue::InMemoryJobQueue;
pub use observability::*;
pub use rate_limiter::RateLimiter;
pub use vision::OpenAiVisionClient;

//! Cache tier for terminal task records
//!
//! Two backends implement [`CacheService`]: [`RedisCacheManager`] for a shared
//! Redis instance and [`InMemoryCache`] for single-process deployments and tests.
//! The cache is a read optimization only; the database stays the source of truth.

pub mod manager;
pub mod memory;
pub mod repository;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use tutor_core::config::{CacheBackend, CacheConfig};
use tutor_core::{TutorError, TutorResult};

pub use manager::RedisCacheManager;
pub use memory::InMemoryCache;
pub use repository::TaskStore;

/// Cache key prefix patterns for different data types
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CachePrefix {
    Task,
}

impl CachePrefix {
    pub fn as_str(&self) -> &'static str {
        match self {
            CachePrefix::Task => "task",
        }
    }
}

/// Cache statistics and metrics
#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub sets: u64,
    pub deletes: u64,
    pub errors: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    pub fn error_rate(&self) -> f64 {
        let total_ops = self.hits + self.misses + self.sets + self.deletes;
        if total_ops == 0 {
            0.0
        } else {
            self.errors as f64 / total_ops as f64
        }
    }
}

/// Lock-free counters shared by the cache backends
#[derive(Debug, Default)]
pub(crate) struct StatsCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    sets: AtomicU64,
    deletes: AtomicU64,
    errors: AtomicU64,
}

impl StatsCounters {
    pub(crate) fn hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn set(&self) {
        self.sets.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn delete(&self, count: u64) {
        self.deletes.fetch_add(count, Ordering::Relaxed);
    }

    pub(crate) fn error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            sets: self.sets.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }
}

/// Cache service trait for dependency injection
#[async_trait]
pub trait CacheService: Send + Sync {
    /// Get a value from cache as raw bytes
    async fn get(&self, key: &str) -> TutorResult<Option<Vec<u8>>>;

    /// Set a value in cache with TTL
    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> TutorResult<()>;

    /// Delete a value from cache
    async fn delete(&self, key: &str) -> TutorResult<bool>;

    /// Check if a key exists in cache
    async fn exists(&self, key: &str) -> TutorResult<bool>;

    /// Get cache statistics
    async fn get_stats(&self) -> CacheStats;

    /// Clear all cache entries with a specific prefix
    async fn clear_prefix(&self, prefix: &str) -> TutorResult<usize>;

    /// Health check for cache service
    async fn health_check(&self) -> TutorResult<bool>;
}

/// Extension trait for convenient type-safe caching
#[async_trait]
pub trait CacheServiceExt: Send + Sync {
    /// Get a typed value from cache
    async fn get_typed<T>(&self, key: &str) -> TutorResult<Option<T>>
    where
        T: serde::de::DeserializeOwned + Send + Sync;

    /// Set a typed value in cache with TTL
    async fn set_typed<T>(&self, key: &str, value: &T, ttl: Duration) -> TutorResult<()>
    where
        T: serde::Serialize + Send + Sync;
}

#[async_trait]
impl<T: CacheService + ?Sized> CacheServiceExt for T {
    async fn get_typed<U>(&self, key: &str) -> TutorResult<Option<U>>
    where
        U: serde::de::DeserializeOwned + Send + Sync,
    {
        match self.get(key).await? {
            Some(bytes) => {
                let value = serde_json::from_slice(&bytes)
                    .map_err(|e| TutorError::Cache(e.to_string()))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    async fn set_typed<U>(&self, key: &str, value: &U, ttl: Duration) -> TutorResult<()>
    where
        U: serde::Serialize + Send + Sync,
    {
        let bytes = serde_json::to_vec(value).map_err(|e| TutorError::Cache(e.to_string()))?;
        self.set(key, &bytes, ttl).await
    }
}

/// Build the configured cache backend
pub async fn create_cache_service(config: &CacheConfig) -> anyhow::Result<Arc<dyn CacheService>> {
    match config.backend {
        CacheBackend::Memory => Ok(Arc::new(InMemoryCache::new(&config.key_prefix))),
        CacheBackend::Redis => {
            let manager = RedisCacheManager::new(config)
                .await
                .context("Failed to create Redis cache manager")?;
            Ok(Arc::new(manager))
        }
    }
}

/// Build cache key with prefix
pub fn build_cache_key(prefix: CachePrefix, id: &str) -> String {
    format!("{}:{}", prefix.as_str(), id)
}

/// Generate cache key for task
pub fn task_cache_key(task_id: &str) -> String {
    build_cache_key(CachePrefix::Task, task_id)
}

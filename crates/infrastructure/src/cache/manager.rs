//! Redis cache manager implementation

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use tracing::{debug, error, info, instrument};
use tutor_core::config::CacheConfig;
use tutor_core::{TutorError, TutorResult};

use super::{CacheService, CacheStats, StatsCounters};

/// Redis cache manager backed by a multiplexed connection manager
#[derive(Clone)]
pub struct RedisCacheManager {
    conn: ConnectionManager,
    stats: Arc<StatsCounters>,
    key_prefix: String,
}

impl RedisCacheManager {
    /// Connect to Redis and verify the connection with PING
    pub async fn new(config: &CacheConfig) -> TutorResult<Self> {
        if !config.enabled {
            return Err(TutorError::Configuration("Cache is disabled".to_string()));
        }

        info!("Creating Redis cache manager with URL: {}", config.redis_url);

        let client = redis::Client::open(config.redis_url.clone())
            .map_err(|e| TutorError::Cache(e.to_string()))?;

        let connect_timeout = Duration::from_secs(config.connection_timeout_seconds);
        let mut conn = tokio::time::timeout(connect_timeout, client.get_connection_manager())
            .await
            .map_err(|_| TutorError::Cache("Redis connection timed out".to_string()))?
            .map_err(|e| TutorError::Cache(e.to_string()))?;

        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| TutorError::Cache(e.to_string()))?;

        info!("Redis cache manager created successfully");

        Ok(Self {
            conn,
            stats: Arc::new(StatsCounters::default()),
            key_prefix: config.key_prefix.clone(),
        })
    }

    /// Build full cache key with prefix
    fn build_key(&self, key: &str) -> String {
        build_prefixed_key(&self.key_prefix, key)
    }

    fn cache_error(&self, op: &str, key: &str, e: redis::RedisError) -> TutorError {
        error!("Cache {} failed for key {}: {}", op, key, e);
        self.stats.error();
        TutorError::Cache(e.to_string())
    }
}

pub(crate) fn build_prefixed_key(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{prefix}:{key}")
    }
}

#[async_trait]
impl CacheService for RedisCacheManager {
    #[instrument(skip(self))]
    async fn get(&self, key: &str) -> TutorResult<Option<Vec<u8>>> {
        let full_key = self.build_key(key);
        let mut conn = self.conn.clone();

        let result: Option<Vec<u8>> = redis::cmd("GET")
            .arg(&full_key)
            .query_async(&mut conn)
            .await
            .map_err(|e| self.cache_error("GET", &full_key, e))?;

        match result {
            Some(value) => {
                debug!("Cache HIT: {}", full_key);
                self.stats.hit();
                Ok(Some(value))
            }
            None => {
                debug!("Cache MISS: {}", full_key);
                self.stats.miss();
                Ok(None)
            }
        }
    }

    #[instrument(skip(self, value))]
    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> TutorResult<()> {
        let full_key = self.build_key(key);
        let mut conn = self.conn.clone();

        // SETEX rejects a zero TTL
        let ttl_seconds = ttl.as_secs().max(1);
        let _: () = redis::cmd("SETEX")
            .arg(&full_key)
            .arg(ttl_seconds)
            .arg(value)
            .query_async(&mut conn)
            .await
            .map_err(|e| self.cache_error("SET", &full_key, e))?;

        debug!("Cache SET success: {} (ttl {}s)", full_key, ttl_seconds);
        self.stats.set();
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete(&self, key: &str) -> TutorResult<bool> {
        let full_key = self.build_key(key);
        let mut conn = self.conn.clone();

        let result: i32 = redis::cmd("DEL")
            .arg(&full_key)
            .query_async(&mut conn)
            .await
            .map_err(|e| self.cache_error("DELETE", &full_key, e))?;

        let deleted = result > 0;
        if deleted {
            self.stats.delete(1);
        }
        Ok(deleted)
    }

    #[instrument(skip(self))]
    async fn exists(&self, key: &str) -> TutorResult<bool> {
        let full_key = self.build_key(key);
        let mut conn = self.conn.clone();

        let result: i32 = redis::cmd("EXISTS")
            .arg(&full_key)
            .query_async(&mut conn)
            .await
            .map_err(|e| self.cache_error("EXISTS", &full_key, e))?;

        Ok(result > 0)
    }

    async fn get_stats(&self) -> CacheStats {
        self.stats.snapshot()
    }

    #[instrument(skip(self))]
    async fn clear_prefix(&self, prefix: &str) -> TutorResult<usize> {
        let full_prefix = self.build_key(prefix);
        let mut conn = self.conn.clone();

        let mut keys: Vec<String> = Vec::new();
        let mut cursor: u64 = 0;

        loop {
            let (next_cursor, batch_keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(format!("{full_prefix}*"))
                .arg("COUNT")
                .arg(1000)
                .query_async(&mut conn)
                .await
                .map_err(|e| self.cache_error("SCAN", &full_prefix, e))?;

            keys.extend(batch_keys);
            if next_cursor == 0 {
                break;
            }
            cursor = next_cursor;
        }

        if keys.is_empty() {
            debug!("No keys found with prefix: {}", full_prefix);
            return Ok(0);
        }

        let mut deleted_count = 0;
        for chunk in keys.chunks(100) {
            let deleted: usize = redis::cmd("DEL")
                .arg(chunk)
                .query_async(&mut conn)
                .await
                .map_err(|e| self.cache_error("DELETE", &full_prefix, e))?;
            deleted_count += deleted;
        }

        self.stats.delete(deleted_count as u64);
        debug!("Cache CLEAR_PREFIX success: {} keys deleted", deleted_count);
        Ok(deleted_count)
    }

    #[instrument(skip(self))]
    async fn health_check(&self) -> TutorResult<bool> {
        let mut conn = self.conn.clone();

        let result: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| self.cache_error("PING", "-", e))?;

        Ok(result == "PONG")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_building() {
        assert_eq!(build_prefixed_key("tutor", "task:123"), "tutor:task:123");
        assert_eq!(build_prefixed_key("", "task:123"), "task:123");
    }

    #[tokio::test]
    async fn test_disabled_cache_rejected() {
        let config = CacheConfig {
            enabled: false,
            ..CacheConfig::default()
        };

        let result = RedisCacheManager::new(&config).await;
        assert!(matches!(result, Err(TutorError::Configuration(_))));
    }

    #[tokio::test]
    async fn test_unreachable_redis_reports_cache_error() {
        let config = CacheConfig {
            redis_url: "redis://127.0.0.1:1".to_string(),
            connection_timeout_seconds: 1,
            ..CacheConfig::default()
        };

        let result = RedisCacheManager::new(&config).await;
        assert!(matches!(result, Err(TutorError::Cache(_))));
    }
}

//! In-process cache backend

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::debug;
use tutor_core::TutorResult;

use super::manager::build_prefixed_key;
use super::{CacheService, CacheStats, StatsCounters};

#[derive(Debug, Clone)]
struct CacheEntry {
    value: Vec<u8>,
    expires_at: Instant,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// DashMap-backed cache with per-key expiry
///
/// Expired entries are dropped lazily on read and by [`InMemoryCache::purge_expired`].
#[derive(Debug, Clone)]
pub struct InMemoryCache {
    entries: Arc<DashMap<String, CacheEntry>>,
    stats: Arc<StatsCounters>,
    key_prefix: String,
}

impl InMemoryCache {
    pub fn new(key_prefix: &str) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            stats: Arc::new(StatsCounters::default()),
            key_prefix: key_prefix.to_string(),
        }
    }

    /// Remove every expired entry, returning how many were dropped
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        let purged = before.saturating_sub(self.entries.len());
        if purged > 0 {
            debug!("Purged {} expired cache entries", purged);
        }
        purged
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl CacheService for InMemoryCache {
    async fn get(&self, key: &str) -> TutorResult<Option<Vec<u8>>> {
        let full_key = build_prefixed_key(&self.key_prefix, key);
        let now = Instant::now();

        // 过期条目在读取时顺便删除
        let removed = self
            .entries
            .remove_if(&full_key, |_, entry| entry.is_expired(now))
            .is_some();

        let value = if removed {
            None
        } else {
            self.entries.get(&full_key).map(|entry| entry.value.clone())
        };

        match value {
            Some(value) => {
                self.stats.hit();
                Ok(Some(value))
            }
            None => {
                self.stats.miss();
                Ok(None)
            }
        }
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> TutorResult<()> {
        let full_key = build_prefixed_key(&self.key_prefix, key);
        self.entries.insert(
            full_key,
            CacheEntry {
                value: value.to_vec(),
                expires_at: Instant::now() + ttl,
            },
        );
        self.stats.set();
        Ok(())
    }

    async fn delete(&self, key: &str) -> TutorResult<bool> {
        let full_key = build_prefixed_key(&self.key_prefix, key);
        let deleted = self.entries.remove(&full_key).is_some();
        if deleted {
            self.stats.delete(1);
        }
        Ok(deleted)
    }

    async fn exists(&self, key: &str) -> TutorResult<bool> {
        let full_key = build_prefixed_key(&self.key_prefix, key);
        let now = Instant::now();
        Ok(self
            .entries
            .get(&full_key)
            .map(|entry| !entry.is_expired(now))
            .unwrap_or(false))
    }

    async fn get_stats(&self) -> CacheStats {
        self.stats.snapshot()
    }

    async fn clear_prefix(&self, prefix: &str) -> TutorResult<usize> {
        let full_prefix = build_prefixed_key(&self.key_prefix, prefix);
        let before = self.entries.len();
        self.entries.retain(|key, _| !key.starts_with(&full_prefix));
        let cleared = before.saturating_sub(self.entries.len());
        self.stats.delete(cleared as u64);
        Ok(cleared)
    }

    async fn health_check(&self) -> TutorResult<bool> {
        Ok(true)
    }
}

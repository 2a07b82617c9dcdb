//! In-memory cache implementation using the moka crate.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use moka::future::Cache;

use keygate_core::config::cache::MemoryCacheConfig;
use keygate_core::result::AppResult;
use keygate_core::traits::cache::CacheProvider;

/// In-memory cache provider using moka.
///
/// Moka evicts at the cache-level TTL; per-entry TTLs (lockout windows and
/// lock durations differ per key) are tracked in a side map and enforced on
/// read, which also lets `ttl()` report remaining lifetimes.
#[derive(Debug, Clone)]
pub struct MemoryCacheProvider {
    /// The underlying moka cache.
    cache: Cache<String, String>,
    /// Counters stored separately for atomic incr.
    counters: Arc<dashmap::DashMap<String, AtomicI64>>,
    /// Per-entry expiry deadlines.
    expiries: Arc<dashmap::DashMap<String, Instant>>,
}

impl MemoryCacheProvider {
    /// Create a new in-memory cache from configuration.
    pub fn new(config: &MemoryCacheConfig) -> Self {
        let cache = Cache::builder()
            .max_capacity(config.max_capacity)
            .time_to_live(Duration::from_secs(config.time_to_live_seconds))
            .build();

        Self {
            cache,
            counters: Arc::new(dashmap::DashMap::new()),
            expiries: Arc::new(dashmap::DashMap::new()),
        }
    }

    /// Drop a key from every internal map if its deadline has passed.
    /// Returns `true` when the key was expired and removed.
    async fn evict_if_expired(&self, key: &str) -> bool {
        let expired = self
            .expiries
            .get(key)
            .map(|deadline| *deadline <= Instant::now())
            .unwrap_or(false);

        if expired {
            self.cache.remove(key).await;
            self.counters.remove(key);
            self.expiries.remove(key);
        }
        expired
    }
}

#[async_trait]
impl CacheProvider for MemoryCacheProvider {
    async fn get(&self, key: &str) -> AppResult<Option<String>> {
        if self.evict_if_expired(key).await {
            return Ok(None);
        }
        Ok(self.cache.get(key).await)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> AppResult<()> {
        self.cache.insert(key.to_string(), value.to_string()).await;
        self.expiries.insert(key.to_string(), Instant::now() + ttl);
        Ok(())
    }

    async fn delete(&self, key: &str) -> AppResult<()> {
        self.cache.remove(key).await;
        self.counters.remove(key);
        self.expiries.remove(key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> AppResult<bool> {
        if self.evict_if_expired(key).await {
            return Ok(false);
        }
        Ok(self.cache.contains_key(key) || self.counters.contains_key(key))
    }

    async fn incr(&self, key: &str) -> AppResult<i64> {
        // A lapsed window restarts the counter from zero.
        self.evict_if_expired(key).await;
        let entry = self
            .counters
            .entry(key.to_string())
            .or_insert_with(|| AtomicI64::new(0));
        let new_val = entry.value().fetch_add(1, Ordering::SeqCst) + 1;
        // Mirror into the cache for get() visibility.
        self.cache
            .insert(key.to_string(), new_val.to_string())
            .await;
        Ok(new_val)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> AppResult<bool> {
        if !self.cache.contains_key(key) && !self.counters.contains_key(key) {
            return Ok(false);
        }
        self.expiries.insert(key.to_string(), Instant::now() + ttl);
        Ok(true)
    }

    async fn ttl(&self, key: &str) -> AppResult<Option<u64>> {
        if self.evict_if_expired(key).await {
            return Ok(None);
        }
        Ok(self
            .expiries
            .get(key)
            .map(|deadline| deadline.saturating_duration_since(Instant::now()).as_secs()))
    }

    async fn health_check(&self) -> AppResult<bool> {
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_provider() -> MemoryCacheProvider {
        let config = MemoryCacheConfig {
            max_capacity: 1000,
            time_to_live_seconds: 60,
        };
        MemoryCacheProvider::new(&config)
    }

    #[tokio::test]
    async fn test_set_get() {
        let provider = make_provider();
        provider
            .set("key1", "value1", Duration::from_secs(60))
            .await
            .unwrap();
        let val = provider.get("key1").await.unwrap();
        assert_eq!(val, Some("value1".to_string()));
    }

    #[tokio::test]
    async fn test_delete() {
        let provider = make_provider();
        provider
            .set("key2", "value2", Duration::from_secs(60))
            .await
            .unwrap();
        provider.delete("key2").await.unwrap();
        let val = provider.get("key2").await.unwrap();
        assert_eq!(val, None);
    }

    #[tokio::test]
    async fn test_expired_entry_is_gone() {
        let provider = make_provider();
        provider
            .set("gone", "v", Duration::from_secs(0))
            .await
            .unwrap();
        assert_eq!(provider.get("gone").await.unwrap(), None);
        assert!(!provider.exists("gone").await.unwrap());
    }

    #[tokio::test]
    async fn test_incr() {
        let provider = make_provider();
        let v1 = provider.incr("counter").await.unwrap();
        assert_eq!(v1, 1);
        let v2 = provider.incr("counter").await.unwrap();
        assert_eq!(v2, 2);
    }

    #[tokio::test]
    async fn test_expire_and_ttl() {
        let provider = make_provider();
        provider
            .set("k", "v", Duration::from_secs(60))
            .await
            .unwrap();
        assert!(provider.expire("k", Duration::from_secs(120)).await.unwrap());
        let remaining = provider.ttl("k").await.unwrap().unwrap();
        assert!(remaining > 60 && remaining <= 120);
        assert!(!provider.expire("absent", Duration::from_secs(5)).await.unwrap());
    }

    #[tokio::test]
    async fn test_json_roundtrip() {
        let provider = make_provider();
        let data = serde_json::json!({"name": "test", "count": 42});
        provider
            .set_json("json_key", &data, Duration::from_secs(60))
            .await
            .unwrap();
        let result: Option<serde_json::Value> = provider.get_json("json_key").await.unwrap();
        assert_eq!(result, Some(data));
    }

    #[tokio::test]
    async fn test_health_check() {
        let provider = make_provider();
        assert!(provider.health_check().await.unwrap());
    }
}

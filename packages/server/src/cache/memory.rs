use super::backend::{CacheBackend, CacheLookup};
use async_trait::async_trait;
use dashmap::DashMap;
use std::time::Duration;
use tokio::time::Instant;

enum StoredValue {
    Value(serde_json::Value),
    Null,
}

struct Entry {
    value: StoredValue,
    expires_at: Instant,
}

/// Process-local cache backend. Entries are stored per `(namespace, key)`
/// and lazily evicted on read — there is no background sweep.
#[derive(Default)]
pub struct MemoryCacheBackend {
    entries: DashMap<(String, String), Entry>,
}

impl MemoryCacheBackend {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }
}

#[async_trait]
impl CacheBackend for MemoryCacheBackend {
    async fn get(&self, namespace: &str, key: &str) -> CacheLookup {
        let k = (namespace.to_string(), key.to_string());
        let hit = match self.entries.get(&k) {
            Some(entry) if Instant::now() < entry.expires_at => match &entry.value {
                StoredValue::Value(v) => Some(CacheLookup::Hit(v.clone())),
                StoredValue::Null => Some(CacheLookup::NullHit),
            },
            Some(_) => None, // expired
            None => return CacheLookup::Miss,
        };
        match hit {
            Some(lookup) => lookup,
            None => {
                self.entries.remove(&k);
                CacheLookup::Miss
            }
        }
    }

    async fn set(&self, namespace: &str, key: &str, value: serde_json::Value, ttl: Duration) {
        self.entries.insert(
            (namespace.to_string(), key.to_string()),
            Entry {
                value: StoredValue::Value(value),
                expires_at: Instant::now() + ttl,
            },
        );
    }

    async fn set_null(&self, namespace: &str, key: &str, ttl: Duration) {
        self.entries.insert(
            (namespace.to_string(), key.to_string()),
            Entry {
                value: StoredValue::Null,
                expires_at: Instant::now() + ttl,
            },
        );
    }

    async fn delete(&self, namespace: &str, key: &str) {
        self.entries
            .remove(&(namespace.to_string(), key.to_string()));
    }

    async fn clear(&self, namespace: Option<&str>) {
        match namespace {
            Some(ns) => self.entries.retain(|(n, _), _| n != ns),
            None => self.entries.clear(),
        }
    }
}

/// Backend that never stores anything — every op is a miss / no-op.
#[derive(Default)]
pub struct NoneCacheBackend;

#[async_trait]
impl CacheBackend for NoneCacheBackend {
    async fn get(&self, _namespace: &str, _key: &str) -> CacheLookup {
        CacheLookup::Miss
    }
    async fn set(&self, _namespace: &str, _key: &str, _value: serde_json::Value, _ttl: Duration) {}
    async fn set_null(&self, _namespace: &str, _key: &str, _ttl: Duration) {}
    async fn delete(&self, _namespace: &str, _key: &str) {}
    async fn clear(&self, _namespace: Option<&str>) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn set_then_get_round_trips() {
        let backend = MemoryCacheBackend::new();
        backend
            .set("ns", "k", serde_json::json!({"a": 1}), Duration::from_secs(60))
            .await;
        assert_eq!(
            backend.get("ns", "k").await,
            CacheLookup::Hit(serde_json::json!({"a": 1}))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn entry_expires_after_ttl() {
        let backend = MemoryCacheBackend::new();
        backend
            .set("ns", "k", serde_json::json!(1), Duration::from_secs(1))
            .await;
        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(backend.get("ns", "k").await, CacheLookup::Miss);
    }

    #[tokio::test(start_paused = true)]
    async fn null_hit_is_distinct_from_miss() {
        let backend = MemoryCacheBackend::new();
        backend.set_null("ns", "missing", Duration::from_secs(60)).await;
        assert_eq!(backend.get("ns", "missing").await, CacheLookup::NullHit);
        assert_eq!(backend.get("ns", "other").await, CacheLookup::Miss);
    }

    #[tokio::test(start_paused = true)]
    async fn clear_scoped_to_namespace() {
        let backend = MemoryCacheBackend::new();
        backend.set("a", "k", serde_json::json!(1), Duration::from_secs(60)).await;
        backend.set("b", "k", serde_json::json!(1), Duration::from_secs(60)).await;
        backend.clear(Some("a")).await;
        assert_eq!(backend.get("a", "k").await, CacheLookup::Miss);
        assert_eq!(
            backend.get("b", "k").await,
            CacheLookup::Hit(serde_json::json!(1))
        );
    }

    #[tokio::test]
    async fn none_backend_always_misses() {
        let backend = NoneCacheBackend;
        backend
            .set("ns", "k", serde_json::json!(1), Duration::from_secs(60))
            .await;
        assert_eq!(backend.get("ns", "k").await, CacheLookup::Miss);
        assert!(!backend.exists("ns", "k").await);
    }
}

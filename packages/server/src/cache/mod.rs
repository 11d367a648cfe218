//! Typed KV front for DB reads, with composite keys, negative caching, and
//! per-namespace hit-rate diagnostics.

pub mod backend;
pub mod memory;
pub mod stats;

use backend::{CacheBackend, CacheLookup};
use memory::{MemoryCacheBackend, NoneCacheBackend};
use stats::{CacheStats, NamespaceSnapshot};
use std::time::Duration;

/// Default TTL for the negative-cache sentinel (§4.2).
pub const DEFAULT_NEGATIVE_TTL: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, PartialEq)]
pub enum CacheValue {
    Found(serde_json::Value),
    /// A prior read-through found no row for this key.
    NotFound,
}

/// Renders a composite key from an ordered tuple of field names and a
/// lookup of their values, as `f1_f2_…` (a missing value renders empty).
pub fn composite_key(fields: &[&str], values: &dyn Fn(&str) -> Option<String>) -> String {
    fields
        .iter()
        .map(|f| values(f).unwrap_or_default())
        .collect::<Vec<_>>()
        .join("_")
}

/// Renders a composite key from a format string like `"{user_id}_{group_id}"`.
pub fn composite_key_from_format(format: &str, values: &dyn Fn(&str) -> Option<String>) -> String {
    let mut out = String::with_capacity(format.len());
    let mut chars = format.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '{' {
            let mut name = String::new();
            for c2 in chars.by_ref() {
                if c2 == '}' {
                    break;
                }
                name.push(c2);
            }
            out.push_str(&values(&name).unwrap_or_default());
        } else {
            out.push(c);
        }
    }
    out
}

/// Typed cache front. Owns a backend (memory/remote/none) plus stats.
pub struct Cache {
    backend: Box<dyn CacheBackend>,
    stats: CacheStats,
    default_ttl: Duration,
    negative_ttl: Duration,
}

impl Cache {
    pub fn memory(default_ttl: Duration) -> Self {
        Self {
            backend: Box::new(MemoryCacheBackend::new()),
            stats: CacheStats::new(),
            default_ttl,
            negative_ttl: DEFAULT_NEGATIVE_TTL,
        }
    }

    pub fn disabled() -> Self {
        Self {
            backend: Box::new(NoneCacheBackend),
            stats: CacheStats::new(),
            default_ttl: Duration::from_secs(0),
            negative_ttl: DEFAULT_NEGATIVE_TTL,
        }
    }

    pub fn with_backend(backend: Box<dyn CacheBackend>, default_ttl: Duration) -> Self {
        Self {
            backend,
            stats: CacheStats::new(),
            default_ttl,
            negative_ttl: DEFAULT_NEGATIVE_TTL,
        }
    }

    pub async fn get(&self, namespace: &str, key: &str) -> CacheValue {
        match self.backend.get(namespace, key).await {
            CacheLookup::Hit(v) => {
                self.stats.record_hit(namespace);
                CacheValue::Found(v)
            }
            CacheLookup::NullHit => {
                self.stats.record_null_hit(namespace);
                CacheValue::NotFound
            }
            CacheLookup::Miss => {
                self.stats.record_miss(namespace);
                CacheValue::NotFound
            }
        }
    }

    /// Distinguishes an explicit negative-cache hit from a plain miss —
    /// callers doing a read-through use this to decide whether to hit the
    /// store at all.
    pub async fn get_raw(&self, namespace: &str, key: &str) -> CacheLookup {
        let lookup = self.backend.get(namespace, key).await;
        match &lookup {
            CacheLookup::Hit(_) => self.stats.record_hit(namespace),
            CacheLookup::NullHit => self.stats.record_null_hit(namespace),
            CacheLookup::Miss => self.stats.record_miss(namespace),
        }
        lookup
    }

    pub async fn set(&self, namespace: &str, key: &str, value: serde_json::Value, ttl: Option<Duration>) {
        self.backend
            .set(namespace, key, value, ttl.unwrap_or(self.default_ttl))
            .await;
        self.stats.record_set(namespace);
    }

    /// Stores the negative-cache sentinel, shielding the store from repeat misses.
    pub async fn set_null(&self, namespace: &str, key: &str) {
        self.backend.set_null(namespace, key, self.negative_ttl).await;
        self.stats.record_null_set(namespace);
    }

    pub async fn delete(&self, namespace: &str, key: &str) {
        self.backend.delete(namespace, key).await;
        self.stats.record_delete(namespace);
    }

    pub async fn clear(&self, namespace: Option<&str>) {
        self.backend.clear(namespace).await;
    }

    pub async fn exists(&self, namespace: &str, key: &str) -> bool {
        self.backend.exists(namespace, key).await
    }

    pub fn stats(&self, namespace: &str) -> NamespaceSnapshot {
        self.stats.snapshot(namespace)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn composite_key_joins_fields_with_underscore() {
        let mut values = HashMap::new();
        values.insert("user_id".to_string(), "7".to_string());
        values.insert("group_id".to_string(), "100".to_string());
        let key = composite_key(&["user_id", "group_id"], &|f| values.get(f).cloned());
        assert_eq!(key, "7_100");
    }

    #[test]
    fn composite_key_renders_missing_field_as_empty() {
        let key = composite_key(&["user_id", "group_id"], &|f| {
            if f == "user_id" {
                Some("7".to_string())
            } else {
                None
            }
        });
        assert_eq!(key, "7_");
    }

    #[test]
    fn composite_key_from_format_string() {
        let mut values = HashMap::new();
        values.insert("user_id".to_string(), "7".to_string());
        values.insert("group_id".to_string(), "100".to_string());
        let key = composite_key_from_format("{user_id}_{group_id}", &|f| values.get(f).cloned());
        assert_eq!(key, "7_100");
    }

    #[tokio::test(start_paused = true)]
    async fn negative_cache_uses_shorter_ttl_than_positive_default() {
        let cache = Cache::memory(Duration::from_secs(3600));
        cache.set_null("ns", "missing").await;
        assert_eq!(cache.get("ns", "missing").await, CacheValue::NotFound);

        tokio::time::advance(DEFAULT_NEGATIVE_TTL + Duration::from_secs(1)).await;
        assert_eq!(cache.get_raw("ns", "missing").await, CacheLookup::Miss);
    }

    #[tokio::test]
    async fn stats_track_hits_and_misses_separately_from_null_hits() {
        let cache = Cache::memory(Duration::from_secs(60));
        cache.set("ns", "k", serde_json::json!(1), None).await;
        cache.get("ns", "k").await;
        cache.get("ns", "missing").await;
        cache.set_null("ns", "nil").await;
        cache.get("ns", "nil").await;

        let snap = cache.stats("ns");
        assert_eq!(snap.hits, 1);
        assert_eq!(snap.misses, 1);
        assert_eq!(snap.null_hits, 1);
    }

    #[tokio::test]
    async fn disabled_cache_never_retains_anything() {
        let cache = Cache::disabled();
        cache.set("ns", "k", serde_json::json!(1), None).await;
        assert_eq!(cache.get("ns", "k").await, CacheValue::NotFound);
    }
}

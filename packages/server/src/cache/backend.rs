use async_trait::async_trait;
use std::time::Duration;

/// What a backend read can produce.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheLookup {
    Hit(serde_json::Value),
    /// The negative-cache sentinel: a prior read-through found no row.
    NullHit,
    Miss,
}

/// Storage contract a cache backend implements. `memory` and `none` ship
/// here; a real deployment backs `remote` with something like Redis by
/// implementing this trait — no concrete remote client is part of this crate.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    async fn get(&self, namespace: &str, key: &str) -> CacheLookup;
    async fn set(&self, namespace: &str, key: &str, value: serde_json::Value, ttl: Duration);
    async fn set_null(&self, namespace: &str, key: &str, ttl: Duration);
    async fn delete(&self, namespace: &str, key: &str);
    async fn clear(&self, namespace: Option<&str>);
    async fn exists(&self, namespace: &str, key: &str) -> bool {
        !matches!(self.get(namespace, key).await, CacheLookup::Miss)
    }
}

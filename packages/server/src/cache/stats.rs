use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Default)]
struct Counters {
    hits: AtomicU64,
    null_hits: AtomicU64,
    misses: AtomicU64,
    sets: AtomicU64,
    null_sets: AtomicU64,
    deletes: AtomicU64,
}

/// Per-namespace hit/miss counters, exposed as a hit-rate percentage for
/// diagnostics. Mirrors the `(len, capacity, memory)` style stats surface
/// used elsewhere in the stack for cache-like collections, specialized to
/// the namespace-keyed shape this cache needs.
#[derive(Default)]
pub struct CacheStats {
    namespaces: DashMap<String, Counters>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NamespaceSnapshot {
    pub hits: u64,
    pub null_hits: u64,
    pub misses: u64,
    pub sets: u64,
    pub null_sets: u64,
    pub deletes: u64,
}

impl NamespaceSnapshot {
    /// hits / (hits + null_hits + misses), as a percentage. `0.0` with no traffic.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.null_hits + self.misses;
        if total == 0 {
            0.0
        } else {
            (self.hits + self.null_hits) as f64 / total as f64 * 100.0
        }
    }
}

impl CacheStats {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&self, namespace: &str) -> dashmap::mapref::one::RefMut<'_, String, Counters> {
        self.namespaces
            .entry(namespace.to_string())
            .or_default()
    }

    pub fn record_hit(&self, namespace: &str) {
        self.entry(namespace).hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_null_hit(&self, namespace: &str) {
        self.entry(namespace)
            .null_hits
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self, namespace: &str) {
        self.entry(namespace).misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_set(&self, namespace: &str) {
        self.entry(namespace).sets.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_null_set(&self, namespace: &str) {
        self.entry(namespace)
            .null_sets
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_delete(&self, namespace: &str) {
        self.entry(namespace)
            .deletes
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self, namespace: &str) -> NamespaceSnapshot {
        match self.namespaces.get(namespace) {
            Some(c) => NamespaceSnapshot {
                hits: c.hits.load(Ordering::Relaxed),
                null_hits: c.null_hits.load(Ordering::Relaxed),
                misses: c.misses.load(Ordering::Relaxed),
                sets: c.sets.load(Ordering::Relaxed),
                null_sets: c.null_sets.load(Ordering::Relaxed),
                deletes: c.deletes.load(Ordering::Relaxed),
            },
            None => NamespaceSnapshot {
                hits: 0,
                null_hits: 0,
                misses: 0,
                sets: 0,
                null_sets: 0,
                deletes: 0,
            },
        }
    }
}

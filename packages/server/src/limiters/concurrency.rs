use dashmap::DashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;

struct Slot {
    semaphore: Semaphore,
    active: AtomicUsize,
}

/// Per-key semaphore. `acquire`/`release` are decoupled (unlike a scope-guarded
/// permit) because the platform acquires at the start of a target execution
/// and releases from a different point once that execution completes.
pub struct ConcurrencyLimiter {
    slots: DashMap<String, Arc<Slot>>,
    capacity: usize,
}

impl ConcurrencyLimiter {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: DashMap::new(),
            capacity,
        }
    }

    fn slot(&self, key: &str) -> Arc<Slot> {
        self.slots
            .entry(key.to_string())
            .or_insert_with(|| {
                Arc::new(Slot {
                    semaphore: Semaphore::new(self.capacity),
                    active: AtomicUsize::new(0),
                })
            })
            .clone()
    }

    /// Blocks until a permit for `key` is available.
    pub async fn acquire(&self, key: &str) {
        let slot = self.slot(key);
        let permit = slot
            .semaphore
            .acquire()
            .await
            .expect("semaphore never closed");
        permit.forget();
        slot.active.fetch_add(1, Ordering::SeqCst);
    }

    /// Returns one permit for `key`. A release with no active holders is a
    /// no-op (logged as a warning) rather than growing the semaphore past
    /// its configured capacity.
    pub fn release(&self, key: &str) {
        let slot = self.slot(key);
        let prev = slot.active.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
            if n == 0 {
                None
            } else {
                Some(n - 1)
            }
        });
        match prev {
            Ok(_) => slot.semaphore.add_permits(1),
            Err(_) => tracing::warn!(key, "concurrency limiter released with zero active holders"),
        }
    }

    pub fn active(&self, key: &str) -> usize {
        self.slot(key).active.load(Ordering::SeqCst)
    }
}

use dashmap::DashMap;
use std::time::Duration;
use tokio::time::Instant;

const SELF_HEAL: Duration = Duration::from_secs(30);

/// Self-healing lock: once set, a key stays blocked for at most 30s even if
/// the caller forgets to release it.
pub struct UserBlockLimiter {
    set_at: DashMap<String, Instant>,
}

impl Default for UserBlockLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl UserBlockLimiter {
    pub fn new() -> Self {
        Self {
            set_at: DashMap::new(),
        }
    }

    /// `false` only when the key is set and less than 30s have elapsed.
    pub fn check(&self, key: &str) -> bool {
        match self.set_at.get(key) {
            Some(at) => Instant::now().saturating_duration_since(*at) >= SELF_HEAL,
            None => true,
        }
    }

    pub fn set_true(&self, key: &str) {
        self.set_at.insert(key.to_string(), Instant::now());
    }

    pub fn set_false(&self, key: &str) {
        self.set_at.remove(key);
    }
}

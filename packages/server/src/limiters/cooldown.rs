use dashmap::DashMap;
use std::time::Duration;
use tokio::time::Instant;

/// Per-key frequency limiter: stores the next instant a key is allowed to fire.
pub struct CooldownLimiter {
    next_allowed: DashMap<String, Instant>,
    default_duration: Duration,
}

impl CooldownLimiter {
    pub fn new(default_duration: Duration) -> Self {
        Self {
            next_allowed: DashMap::new(),
            default_duration,
        }
    }

    /// `true` iff `now >= next_allowed_time` for this key (or the key has never fired).
    pub fn check(&self, key: &str) -> bool {
        match self.next_allowed.get(key) {
            Some(next) => Instant::now() >= *next,
            None => true,
        }
    }

    /// Sets `next_allowed_time = now + duration` (falls back to the configured default).
    pub fn start(&self, key: &str, duration: Option<Duration>) {
        let wait = duration.unwrap_or(self.default_duration);
        self.next_allowed
            .insert(key.to_string(), Instant::now() + wait);
    }

    /// Remaining cooldown for `key`, `Duration::ZERO` if already allowed.
    pub fn left_time(&self, key: &str) -> Duration {
        match self.next_allowed.get(key) {
            Some(next) => next.saturating_duration_since(Instant::now()),
            None => Duration::ZERO,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn check_is_true_before_first_start() {
        let limiter = CooldownLimiter::new(Duration::from_secs(5));
        assert!(limiter.check("user:1"));
        assert_eq!(limiter.left_time("user:1"), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn start_blocks_until_duration_elapses() {
        let limiter = CooldownLimiter::new(Duration::from_secs(5));
        limiter.start("user:1", None);
        assert!(!limiter.check("user:1"));

        tokio::time::advance(Duration::from_secs(3)).await;
        assert!(!limiter.check("user:1"));
        assert!(limiter.left_time("user:1") <= Duration::from_secs(2));

        tokio::time::advance(Duration::from_secs(3)).await;
        assert!(limiter.check("user:1"));
        assert_eq!(limiter.left_time("user:1"), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn left_time_is_monotonically_non_increasing_between_starts() {
        let limiter = CooldownLimiter::new(Duration::from_secs(10));
        limiter.start("k", None);
        let mut prev = limiter.left_time("k");
        for _ in 0..5 {
            tokio::time::advance(Duration::from_secs(1)).await;
            let cur = limiter.left_time("k");
            assert!(cur <= prev);
            prev = cur;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn explicit_duration_overrides_default() {
        let limiter = CooldownLimiter::new(Duration::from_secs(100));
        limiter.start("k", Some(Duration::from_secs(1)));
        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(limiter.check("k"));
    }
}

use dashmap::DashMap;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;

/// Sliding-window rate limiter: at most `max` calls to `check(key)` succeed
/// within any window of `window` seconds, per key.
pub struct RateLimiter {
    windows: DashMap<String, VecDeque<Instant>>,
    max: usize,
    window: Duration,
}

impl RateLimiter {
    pub fn new(max: usize, window: Duration) -> Self {
        Self {
            windows: DashMap::new(),
            max,
            window,
        }
    }

    /// Evicts entries older than the window, then admits iff under `max`.
    pub fn check(&self, key: &str) -> bool {
        self.check_with(key, self.max, self.window)
    }

    /// Same as `check`, but with a per-call `max`/`window` overriding the
    /// limiter's own — lets a single shared limiter enforce a different
    /// rate per plugin, keyed by a plugin-prefixed key.
    pub fn check_with(&self, key: &str, max: usize, window: Duration) -> bool {
        let now = Instant::now();
        let mut entry = self.windows.entry(key.to_string()).or_default();
        while let Some(front) = entry.front() {
            if now.saturating_duration_since(*front) >= window {
                entry.pop_front();
            } else {
                break;
            }
        }
        if entry.len() < max {
            entry.push_back(now);
            true
        } else {
            false
        }
    }

    /// Time until the oldest timestamp in the window falls out of it.
    pub fn left_time(&self, key: &str) -> Duration {
        match self.windows.get(key) {
            Some(entry) => match entry.front() {
                Some(first) => (*first + self.window).saturating_duration_since(Instant::now()),
                None => Duration::ZERO,
            },
            None => Duration::ZERO,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn admits_up_to_max_within_window() {
        let limiter = RateLimiter::new(2, Duration::from_secs(60));
        assert!(limiter.check("k"));
        assert!(limiter.check("k"));
        assert!(!limiter.check("k"));
    }

    #[tokio::test(start_paused = true)]
    async fn window_eviction_frees_capacity() {
        let limiter = RateLimiter::new(1, Duration::from_secs(60));
        assert!(limiter.check("k"));
        assert!(!limiter.check("k"));

        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(limiter.check("k"));
    }

    #[tokio::test(start_paused = true)]
    async fn fairness_bound_holds_across_a_sliding_window() {
        let limiter = RateLimiter::new(3, Duration::from_secs(10));
        let mut admitted = 0;
        for _ in 0..20 {
            if limiter.check("k") {
                admitted += 1;
            }
            tokio::time::advance(Duration::from_secs(1)).await;
        }
        // Over any 10s window at most 3 calls are admitted; 20 one-second
        // ticks span two windows, so the ceiling is well under 20.
        assert!(admitted <= 6);
    }

    #[tokio::test(start_paused = true)]
    async fn keys_are_independent() {
        let limiter = RateLimiter::new(1, Duration::from_secs(60));
        assert!(limiter.check("a"));
        assert!(limiter.check("b"));
        assert!(!limiter.check("a"));
    }
}

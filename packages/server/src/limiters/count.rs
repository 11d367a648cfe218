use crate::common::calendar_day_key;
use chrono::Utc;
use chrono_tz::Tz;
use dashmap::DashMap;

struct Counter {
    day_key: String,
    count: u32,
}

/// Per-key daily counter that resets when the calendar day changes in `tz`.
pub struct CountLimiter {
    counters: DashMap<String, Counter>,
    max: u32,
    tz: Tz,
}

impl CountLimiter {
    pub fn new(max: u32, tz: Tz) -> Self {
        Self {
            counters: DashMap::new(),
            max,
            tz,
        }
    }

    fn today(&self) -> String {
        calendar_day_key(Utc::now(), self.tz)
    }

    /// `true` iff the key's count for today is below `max`.
    pub fn check(&self, key: &str) -> bool {
        self.check_with(key, self.max)
    }

    /// Same as `check`, but with a per-call `max` overriding the limiter's
    /// own — lets a single shared limiter enforce a different daily count
    /// per plugin, keyed by a plugin-prefixed key.
    pub fn check_with(&self, key: &str, max: u32) -> bool {
        let today = self.today();
        match self.counters.get(key) {
            Some(c) if c.day_key == today => c.count < max,
            _ => true,
        }
    }

    /// Bumps the key's count for today, resetting first if the day rolled over.
    pub fn increase(&self, key: &str) {
        let today = self.today();
        let mut entry = self.counters.entry(key.to_string()).or_insert(Counter {
            day_key: today.clone(),
            count: 0,
        });
        if entry.day_key != today {
            entry.day_key = today;
            entry.count = 0;
        }
        entry.count += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admits_until_max_then_blocks() {
        let limiter = CountLimiter::new(2, chrono_tz::UTC);
        assert!(limiter.check("k"));
        limiter.increase("k");
        assert!(limiter.check("k"));
        limiter.increase("k");
        assert!(!limiter.check("k"));
    }

    #[test]
    fn keys_are_independent() {
        let limiter = CountLimiter::new(1, chrono_tz::UTC);
        limiter.increase("a");
        assert!(!limiter.check("a"));
        assert!(limiter.check("b"));
    }
}

//! Per-check circuit breaker: after `threshold` consecutive timeouts, skip
//! the check for `reset` seconds without invoking it (§4.4).

use dashmap::DashMap;
use std::time::Duration;
use tokio::time::Instant;

struct BreakerState {
    failures: u32,
    open_until: Option<Instant>,
}

pub struct CircuitBreakerRegistry {
    states: DashMap<String, BreakerState>,
    threshold: u32,
    reset: Duration,
}

impl CircuitBreakerRegistry {
    pub fn new(threshold: u32, reset: Duration) -> Self {
        Self {
            states: DashMap::new(),
            threshold,
            reset,
        }
    }

    /// `true` iff the breaker for `check_name` is currently open. Clears an
    /// expired breaker as a side effect (its failure counter zeroes).
    pub fn is_open(&self, check_name: &str) -> bool {
        let Some(mut state) = self.states.get_mut(check_name) else {
            return false;
        };
        match state.open_until {
            Some(until) if Instant::now() < until => true,
            Some(_) => {
                state.failures = 0;
                state.open_until = None;
                false
            }
            None => false,
        }
    }

    /// Records a timeout for `check_name`; returns `true` if this call
    /// opened the breaker (i.e. the threshold was just reached).
    pub fn record_timeout(&self, check_name: &str) -> bool {
        let mut state = self.states.entry(check_name.to_string()).or_insert(BreakerState {
            failures: 0,
            open_until: None,
        });
        state.failures += 1;
        if state.failures >= self.threshold && state.open_until.is_none() {
            state.open_until = Some(Instant::now() + self.reset);
            true
        } else {
            false
        }
    }
}

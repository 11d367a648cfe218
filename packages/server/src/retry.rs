//! Generic retry decorator (§4.7), used by both the scheduler's per-target
//! execution and (indirectly) the pipeline's degrade-open behaviors.
//!
//! Implemented as a higher-order async function rather than a trait object
//! hierarchy, per the state-free "wrap the original function" semantics
//! called for in the design notes.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use typed_builder::TypedBuilder;

#[derive(Debug, Clone, Copy)]
pub enum BackoffStrategy {
    Fixed { wait: Duration },
    Exponential { multiplier: Duration, max: Duration },
}

impl BackoffStrategy {
    fn wait_for_attempt(&self, attempt: u32) -> Duration {
        match self {
            BackoffStrategy::Fixed { wait } => *wait,
            BackoffStrategy::Exponential { multiplier, max } => {
                let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
                let computed = *multiplier * factor;
                computed.min(*max)
            }
        }
    }
}

#[derive(TypedBuilder)]
pub struct RetryOptions<T, E> {
    pub stop_max_attempt: u32,
    pub strategy: BackoffStrategy,
    #[builder(default, setter(strip_option))]
    pub retry_on_result: Option<Arc<dyn Fn(&T) -> bool + Send + Sync>>,
    #[builder(default = "retry".to_string())]
    pub log_name: String,
    #[builder(default, setter(strip_option))]
    pub on_failure: Option<Arc<dyn Fn(&E) + Send + Sync>>,
    #[builder(default, setter(strip_option))]
    pub on_success: Option<Arc<dyn Fn(&T) + Send + Sync>>,
    #[builder(default, setter(strip_option))]
    pub return_on_failure: Option<T>,
}

/// Runs `f` up to `opts.stop_max_attempt` times. Retries on `Err` always;
/// additionally retries on `Ok(value)` when `retry_on_result(&value)` is
/// true. On final failure, calls `on_failure` then either returns
/// `return_on_failure` (if set) or the last error.
pub async fn retry<F, Fut, T, E>(opts: RetryOptions<T, E>, f: F) -> Result<T, E>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    T: Clone,
    E: std::fmt::Display,
{
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match f().await {
            Ok(value) => {
                let should_retry = opts
                    .retry_on_result
                    .as_ref()
                    .map(|pred| pred(&value))
                    .unwrap_or(false);
                if !should_retry || attempt >= opts.stop_max_attempt {
                    if let Some(cb) = &opts.on_success {
                        cb(&value);
                    }
                    return Ok(value);
                }
                let wait = opts.strategy.wait_for_attempt(attempt);
                tracing::warn!(
                    log_name = %opts.log_name,
                    attempt,
                    wait_ms = wait.as_millis() as u64,
                    "retrying on non-terminal result"
                );
                tokio::time::sleep(wait).await;
            }
            Err(err) => {
                if attempt >= opts.stop_max_attempt {
                    if let Some(cb) = &opts.on_failure {
                        cb(&err);
                    }
                    return match opts.return_on_failure {
                        Some(fallback) => Ok(fallback),
                        None => Err(err),
                    };
                }
                let wait = opts.strategy.wait_for_attempt(attempt);
                tracing::warn!(
                    log_name = %opts.log_name,
                    attempt,
                    wait_ms = wait.as_millis() as u64,
                    error = %err,
                    "retrying after error"
                );
                tokio::time::sleep(wait).await;
            }
        }
    }
}

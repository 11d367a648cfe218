//! Single-invocation and per-target execution algorithms (§4.5, §4.5.1, §4.5.2).

use super::job::{ConcurrencyPolicy, ScheduledJob};
use super::registry::{PluginScheduleRegistration, ValidationError};
use crate::limiters::concurrency::ConcurrencyLimiter;
use crate::retry::{retry, BackoffStrategy, RetryOptions};
use dashmap::DashSet;
use rand::Rng;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ScheduleContext {
    pub schedule_id: crate::common::entity_ids::ScheduledJobId,
    pub plugin_name: String,
    pub bot_id: String,
    pub group_id: Option<String>,
    pub job_kwargs: Value,
}

/// Gates per-target execution on group/plugin admission (§4.5.1 Block check).
#[async_trait::async_trait]
pub trait AdmissionGate: Send + Sync {
    async fn is_blocked(&self, group_id: Option<&str>, plugin_name: &str) -> bool;
}

#[derive(Debug, thiserror::Error)]
pub enum TargetExecutionError {
    #[error("unregistered plugin: {0}")]
    UnregisteredPlugin(String),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Handler(#[from] anyhow::Error),
}

/// Benign control-flow signals a handler may raise; logged, never counted
/// as a target failure (§4.5.1).
#[derive(Debug, thiserror::Error)]
pub enum BenignInterruption {
    #[error("handler paused")]
    Paused,
    #[error("handler finished early")]
    Finished,
    #[error("handler skipped")]
    Skipped,
}

/// Executes one target of one job invocation. Returns `Ok(())` on success or
/// benign interruption, `Err` on a genuine target failure.
pub async fn execute_target(
    job: &ScheduledJob,
    registration: &PluginScheduleRegistration,
    admission: &dyn AdmissionGate,
    target_identifier: Option<&str>,
) -> Result<(), TargetExecutionError> {
    if admission.is_blocked(target_identifier, &job.plugin_name).await {
        tracing::info!(
            plugin_name = %job.plugin_name,
            target = target_identifier,
            "target blocked by admission gate, skipping silently"
        );
        return Ok(());
    }

    registration.schema.validate(&job.job_kwargs)?;

    let ctx = ScheduleContext {
        schedule_id: job.id,
        plugin_name: job.plugin_name.clone(),
        bot_id: job.bot_id.clone().unwrap_or_default(),
        group_id: target_identifier.map(str::to_string),
        job_kwargs: job.job_kwargs.clone(),
    };

    let opts = job.execution_options_parsed();
    let handler = registration.handler.clone();
    let call = {
        let ctx = ctx.clone();
        move || {
            let handler = handler.clone();
            let ctx = ctx.clone();
            async move { handler.invoke(&ctx.bot_id, &ctx, ctx.job_kwargs.clone()).await }
        }
    };

    let result = match opts.retries {
        Some(retries) if retries > 0 => {
            let retry_opts: RetryOptions<(), anyhow::Error> = RetryOptions::builder()
                .stop_max_attempt(retries + 1)
                .strategy(BackoffStrategy::Fixed {
                    wait: Duration::from_secs_f64(opts.retry_delay_seconds.unwrap_or(1.0)),
                })
                .log_name(format!("schedule:{}", job.plugin_name))
                .build();
            retry(retry_opts, call).await
        }
        _ => call().await,
    };

    match result {
        Ok(()) => Ok(()),
        Err(err) => {
            if let Some(benign) = err.downcast_ref::<BenignInterruption>() {
                tracing::warn!(plugin_name = %job.plugin_name, "{benign}");
                Ok(())
            } else {
                Err(TargetExecutionError::Handler(err))
            }
        }
    }
}

/// Runs every resolved target for one invocation (§4.5.2). Returns the
/// number of targets that failed.
pub async fn fan_out(
    job: &ScheduledJob,
    registration: &PluginScheduleRegistration,
    admission: Arc<dyn AdmissionGate>,
    targets: Vec<Option<String>>,
    concurrency_limiter: Arc<ConcurrencyLimiter>,
) -> usize {
    let opts = job.execution_options_parsed();

    if let Some(interval) = opts.interval {
        // Serial mode: fixed inter-target sleep, semaphore not applied.
        let mut failures = 0;
        for (i, target) in targets.iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(Duration::from_secs_f64(interval)).await;
            }
            if execute_target(job, registration, admission.as_ref(), target.as_deref())
                .await
                .is_err()
            {
                failures += 1;
            }
        }
        failures
    } else {
        // Concurrent mode with spread: uniform-random delay in (0, S], then
        // a shared semaphore bounds simultaneous executions.
        let spread = opts.spread.unwrap_or(super::job::ExecutionOptions::DEFAULT_SPREAD_SECONDS);
        let key = format!("schedule:{}", job.plugin_name);
        let limiter = concurrency_limiter;

        let futures = targets.into_iter().map(|target| {
            let job = job.clone();
            let registration = registration.clone();
            let admission = admission.clone();
            let limiter = limiter.clone();
            let key = key.clone();
            async move {
                let delay = if spread > 0.0 {
                    rand::thread_rng().gen_range(0.0..=spread)
                } else {
                    0.0
                };
                tokio::time::sleep(Duration::from_secs_f64(delay)).await;
                limiter.acquire(&key).await;
                let result = execute_target(&job, &registration, admission.as_ref(), target.as_deref()).await;
                limiter.release(&key);
                result
            }
        });

        futures::future::join_all(futures)
            .await
            .into_iter()
            .filter(|r| r.is_err())
            .count()
    }
}

/// Tracks job ids currently executing, implementing the concurrency policy
/// for re-entrant live-scheduler fires (§4.5.3).
#[derive(Default)]
pub struct RunningRegistry {
    running: DashSet<crate::common::entity_ids::ScheduledJobId>,
}

impl RunningRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_running(&self, id: crate::common::entity_ids::ScheduledJobId) -> bool {
        self.running.contains(&id)
    }

    /// Decides whether this fire should proceed under `policy`, given that a
    /// prior invocation may still be running. `Allow` always proceeds;
    /// `Skip` drops the fire if one is already running; `Queue` is handled
    /// by the caller serializing on a per-job lock (this registry only
    /// reports whether one is in flight).
    pub fn should_start(&self, id: crate::common::entity_ids::ScheduledJobId, policy: ConcurrencyPolicy) -> bool {
        match policy {
            ConcurrencyPolicy::Allow => true,
            ConcurrencyPolicy::Skip => !self.is_running(id),
            ConcurrencyPolicy::Queue => true,
        }
    }

    pub fn mark_running(&self, id: crate::common::entity_ids::ScheduledJobId) {
        self.running.insert(id);
    }

    pub fn mark_finished(&self, id: crate::common::entity_ids::ScheduledJobId) {
        self.running.remove(&id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::entity_ids::ScheduledJobId;

    #[test]
    fn skip_policy_drops_reentry_while_running() {
        let registry = RunningRegistry::new();
        let id = ScheduledJobId::new();
        registry.mark_running(id);
        assert!(!registry.should_start(id, ConcurrencyPolicy::Skip));
        registry.mark_finished(id);
        assert!(registry.should_start(id, ConcurrencyPolicy::Skip));
    }

    #[test]
    fn allow_policy_always_proceeds() {
        let registry = RunningRegistry::new();
        let id = ScheduledJobId::new();
        registry.mark_running(id);
        assert!(registry.should_start(id, ConcurrencyPolicy::Allow));
    }
}

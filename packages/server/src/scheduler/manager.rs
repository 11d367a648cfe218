//! Live-scheduler integration: the persistent job store mirrored onto a
//! `tokio-cron-scheduler::JobScheduler` (§4.5, §4.5.4, §4.5.5).

use super::execution::{fan_out, AdmissionGate, RunningRegistry};
use super::job::{ConcurrencyPolicy, JobSource, LastRunStatus, ScheduledJob, TargetType, TriggerType};
use super::registry::SchedulePluginRegistry;
use super::trigger::Trigger;
use crate::common::entity_ids::ScheduledJobId;
use crate::limiters::concurrency::ConcurrencyLimiter;
use crate::tags::resolver::{ResolveError, TagResolver, ALL_TAG};
use dashmap::DashMap;
use serde_json::Value;
use sqlx::PgPool;
use std::sync::Arc;
use tokio_cron_scheduler::{Job, JobScheduler};

#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error(transparent)]
    Db(#[from] sqlx::Error),
    #[error(transparent)]
    Trigger(#[from] super::trigger::TriggerError),
    #[error(transparent)]
    Validation(#[from] super::registry::ValidationError),
    #[error(transparent)]
    Options(#[from] super::job::ExecutionOptionsError),
    #[error("unregistered plugin: {0}")]
    UnregisteredPlugin(String),
    #[error("no bot online to run this job")]
    NoBotOnline,
    #[error(transparent)]
    LiveScheduler(#[from] tokio_cron_scheduler::JobSchedulerError),
    #[error(transparent)]
    Resolve(#[from] ResolveError),
}

/// Resolves whether a bot id is online, or picks any online bot (§4.5.1 step 3).
#[async_trait::async_trait]
pub trait BotAvailability: Send + Sync {
    async fn is_online(&self, bot_id: &str) -> bool;
    async fn any_online(&self) -> Option<String>;
}

pub struct SchedulerManager {
    pool: PgPool,
    live: JobScheduler,
    plugins: Arc<SchedulePluginRegistry>,
    tag_resolver: Arc<TagResolver>,
    bots: Arc<dyn BotAvailability>,
    admission: Arc<dyn AdmissionGate>,
    concurrency_limiter: Arc<ConcurrencyLimiter>,
    running: Arc<RunningRegistry>,
    /// Maps a schedule row to the live-scheduler job it's currently
    /// registered under, so a row can be pulled out of `live` by id alone.
    live_jobs: Arc<DashMap<ScheduledJobId, uuid::Uuid>>,
}

impl SchedulerManager {
    pub async fn new(
        pool: PgPool,
        plugins: Arc<SchedulePluginRegistry>,
        tag_resolver: Arc<TagResolver>,
        bots: Arc<dyn BotAvailability>,
        admission: Arc<dyn AdmissionGate>,
        concurrency_limit: usize,
    ) -> Result<Self, SchedulerError> {
        let live = JobScheduler::new().await?;
        Ok(Self {
            pool,
            live,
            plugins,
            tag_resolver,
            bots,
            admission,
            concurrency_limiter: Arc::new(ConcurrencyLimiter::new(concurrency_limit)),
            running: Arc::new(RunningRegistry::new()),
            live_jobs: Arc::new(DashMap::new()),
        })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Loads every `is_enabled=true` row, re-adds each to the live scheduler,
    /// skipping rows whose plugin is unregistered; then inserts declarative
    /// defaults that are absent (§4.5 Startup).
    pub async fn startup(&self) -> Result<(), SchedulerError> {
        let rows = ScheduledJob::all_enabled(&self.pool).await?;
        for row in rows {
            if !self.plugins.is_registered(&row.plugin_name) {
                tracing::warn!(plugin_name = %row.plugin_name, "skipping unregistered plugin at startup");
                continue;
            }
            self.add_live_job(&row).await?;
        }

        for registration in self.plugins.all() {
            for declarative in &registration.declarative {
                let existing = ScheduledJob::find_by_natural_key(
                    &self.pool,
                    &registration.plugin_name,
                    declarative.target_type,
                    &declarative.target_identifier,
                    declarative.bot_id.as_deref(),
                )
                .await?;
                if existing.is_some() {
                    continue;
                }
                let row = ScheduledJob::upsert_by_natural_key(
                    &self.pool,
                    None,
                    None,
                    registration.default_permission,
                    JobSource::PluginDefault,
                    declarative.bot_id.as_deref(),
                    &registration.plugin_name,
                    declarative.target_type,
                    &declarative.target_identifier,
                    declarative.trigger_type,
                    declarative.trigger_config.clone(),
                    declarative.job_kwargs.clone(),
                    None,
                )
                .await?;
                self.add_live_job(&row).await?;
            }
        }
        Ok(())
    }

    async fn add_live_job(&self, row: &ScheduledJob) -> Result<(), SchedulerError> {
        let trigger = Trigger::from_config(row.trigger_type, &row.trigger_config)?;
        let row_id = row.id;
        let manager = self.clone_handles();
        let row = row.clone();

        let job = match &trigger {
            Trigger::Cron(cron) => {
                let expr = cron.to_cron_expression();
                Job::new_async(expr.as_str(), move |_uuid, _lock| {
                    let manager = manager.clone();
                    let row = row.clone();
                    Box::pin(async move {
                        manager.fire(row, false).await;
                    })
                })?
            }
            Trigger::Interval(interval) => {
                let period = std::time::Duration::from_secs(interval.period_seconds());
                Job::new_repeated_async(period, move |_uuid, _lock| {
                    let manager = manager.clone();
                    let row = row.clone();
                    Box::pin(async move {
                        manager.fire(row, false).await;
                    })
                })?
            }
            Trigger::Date(date) => {
                Job::new_one_shot_at_instant_async(
                    std::time::Instant::from(
                        tokio::time::Instant::now()
                            + (date.run_at - chrono::Utc::now())
                                .to_std()
                                .unwrap_or(std::time::Duration::ZERO),
                    ),
                    move |_uuid, _lock| {
                        let manager = manager.clone();
                        let row = row.clone();
                        Box::pin(async move {
                            manager.fire(row, false).await;
                        })
                    },
                )?
            }
        };

        let uuid = self.live.add(job).await?;
        self.live_jobs.insert(row_id, uuid);
        Ok(())
    }

    fn clone_handles(&self) -> Arc<SchedulerManagerHandles> {
        Arc::new(SchedulerManagerHandles {
            pool: self.pool.clone(),
            live: self.live.clone(),
            plugins: self.plugins.clone(),
            tag_resolver: self.tag_resolver.clone(),
            bots: self.bots.clone(),
            admission: self.admission.clone(),
            concurrency_limiter: self.concurrency_limiter.clone(),
            running: self.running.clone(),
            live_jobs: self.live_jobs.clone(),
        })
    }

    /// `addSchedule`: upserts by natural key, validates kwargs, registers
    /// the live job (§4.5 Job sources, §4.5 Validation).
    #[allow(clippy::too_many_arguments)]
    pub async fn add_schedule(
        &self,
        plugin_name: &str,
        created_by: Option<&str>,
        bot_id: Option<&str>,
        target_type: TargetType,
        target_identifier: &str,
        trigger_type: TriggerType,
        trigger_config: Value,
        job_kwargs: Value,
        execution_options: Option<Value>,
    ) -> Result<ScheduledJob, SchedulerError> {
        let registration = self
            .plugins
            .lookup(plugin_name)
            .ok_or_else(|| SchedulerError::UnregisteredPlugin(plugin_name.to_string()))?;
        registration.schema.validate(&job_kwargs)?;

        if let Some(opts) = &execution_options {
            let parsed: super::job::ExecutionOptions =
                serde_json::from_value(opts.clone()).unwrap_or_default();
            parsed.validate()?;
        }
        Trigger::from_config(trigger_type, &trigger_config)?;

        let row = ScheduledJob::upsert_by_natural_key(
            &self.pool,
            None,
            created_by,
            registration.default_permission,
            JobSource::User,
            bot_id,
            plugin_name,
            target_type,
            target_identifier,
            trigger_type,
            trigger_config,
            job_kwargs,
            execution_options,
        )
        .await?;
        self.add_live_job(&row).await?;
        Ok(row)
    }

    /// `scheduleOnce`: registers a one-off row with a synthetic natural key.
    pub async fn schedule_once(
        &self,
        plugin_name: &str,
        bot_id: Option<&str>,
        target_type: TargetType,
        target_identifier: &str,
        trigger_type: TriggerType,
        trigger_config: Value,
        job_kwargs: Value,
    ) -> Result<ScheduledJob, SchedulerError> {
        let row = self
            .add_schedule(
                plugin_name,
                None,
                bot_id,
                target_type,
                target_identifier,
                trigger_type,
                trigger_config,
                job_kwargs,
                None,
            )
            .await?;
        ScheduledJob::mark_one_off(&self.pool, row.id).await?;
        Ok(ScheduledJob { is_one_off: true, ..row })
    }

    /// `runAt`: ephemeral, in-memory-only one-shot, identified by a UUID key
    /// never persisted to the store.
    pub async fn run_at(
        &self,
        run_at: chrono::DateTime<chrono::Utc>,
        task: impl Fn() -> futures::future::BoxFuture<'static, ()> + Send + Sync + 'static,
    ) -> Result<uuid::Uuid, SchedulerError> {
        let delay = (run_at - chrono::Utc::now()).to_std().unwrap_or(std::time::Duration::ZERO);
        let job = Job::new_one_shot_at_instant_async(
            std::time::Instant::from(tokio::time::Instant::now() + delay),
            move |_uuid, _lock| task(),
        )?;
        let uuid = self.live.add(job).await?;
        Ok(uuid)
    }

    pub async fn update_schedule(
        &self,
        id: ScheduledJobId,
        trigger_type: Option<TriggerType>,
        trigger_config: Option<Value>,
        job_kwargs: Option<Value>,
    ) -> Result<ScheduledJob, SchedulerError> {
        let row = ScheduledJob::update_partial(&self.pool, id, trigger_type, trigger_config, job_kwargs).await?;
        self.add_live_job(&row).await?;
        Ok(row)
    }

    pub async fn pause_schedule(&self, id: ScheduledJobId) -> Result<(), sqlx::Error> {
        ScheduledJob::set_enabled(&self.pool, id, false).await
    }

    pub async fn resume_schedule(&self, id: ScheduledJobId) -> Result<(), sqlx::Error> {
        ScheduledJob::set_enabled(&self.pool, id, true).await?;
        if let Some(row) = ScheduledJob::find_by_id(&self.pool, id).await? {
            let _ = self.add_live_job(&row).await;
        }
        Ok(())
    }

    pub async fn remove_schedule(&self, id: ScheduledJobId) -> Result<(), sqlx::Error> {
        ScheduledJob::delete(&self.pool, id).await
    }

    /// `triggerNow`: runs the execution path with `force=true`, bypassing
    /// the `is_enabled=false` skip (§4.5.4).
    pub async fn trigger_now(&self, id: ScheduledJobId) -> Result<(), SchedulerError> {
        let row = ScheduledJob::find_by_id(&self.pool, id)
            .await?
            .ok_or(sqlx::Error::RowNotFound)?;
        let handles = self.clone_handles();
        handles.fire(row, true).await;
        Ok(())
    }

    pub async fn start(&self) -> Result<(), SchedulerError> {
        self.live.start().await?;
        Ok(())
    }
}

/// Everything an in-flight live-scheduler callback needs, cloned out of
/// `SchedulerManager` so it can move into a `'static` closure.
struct SchedulerManagerHandles {
    pool: PgPool,
    live: JobScheduler,
    plugins: Arc<SchedulePluginRegistry>,
    tag_resolver: Arc<TagResolver>,
    bots: Arc<dyn BotAvailability>,
    admission: Arc<dyn AdmissionGate>,
    concurrency_limiter: Arc<ConcurrencyLimiter>,
    running: Arc<RunningRegistry>,
    live_jobs: Arc<DashMap<ScheduledJobId, uuid::Uuid>>,
}

impl SchedulerManagerHandles {
    /// Single-invocation algorithm (§4.5 Execution).
    async fn fire(self: Arc<Self>, row: ScheduledJob, force: bool) {
        if !force && !row.is_enabled {
            return;
        }

        let policy = row
            .execution_options_parsed()
            .concurrency_policy
            .unwrap_or_default();
        if !self.running.should_start(row.id, policy) {
            tracing::info!(schedule_id = %row.id, "coalescing overlapping fire under SKIP policy");
            return;
        }
        self.running.mark_running(row.id);

        let result = self.fire_inner(&row).await;
        self.running.mark_finished(row.id);

        match result {
            Ok(any_failure) => {
                let status = if any_failure { LastRunStatus::Failure } else { LastRunStatus::Success };
                let _ = ScheduledJob::record_run_result(&self.pool, row.id, status).await;
                if !any_failure && row.is_one_off {
                    let _ = ScheduledJob::delete(&self.pool, row.id).await;
                }
            }
            Err(SchedulerError::UnregisteredPlugin(plugin_name)) => {
                tracing::error!(
                    schedule_id = %row.id,
                    plugin_name = %plugin_name,
                    "scheduled job's plugin is no longer registered, disabling and removing its live trigger"
                );
                let _ = ScheduledJob::record_run_result(&self.pool, row.id, LastRunStatus::Failure).await;
                self.disable_and_remove(row.id).await;
            }
            Err(err) => {
                tracing::error!(schedule_id = %row.id, error = %err, "scheduled job invocation failed");
                let _ = ScheduledJob::record_run_result(&self.pool, row.id, LastRunStatus::Failure).await;
            }
        }
    }

    /// Disables a row and pulls its job out of the live scheduler, so a
    /// since-unregistered plugin's schedule stops firing (§3 Data Model).
    async fn disable_and_remove(&self, id: ScheduledJobId) {
        if let Err(err) = ScheduledJob::set_enabled(&self.pool, id, false).await {
            tracing::error!(schedule_id = %id, error = %err, "failed to disable schedule after unregistered-plugin failure");
        }
        if let Some((_, uuid)) = self.live_jobs.remove(&id) {
            if let Err(err) = self.live.remove(&uuid).await {
                tracing::error!(schedule_id = %id, error = %err, "failed to remove live trigger after unregistered-plugin failure");
            }
        }
    }

    /// Returns `Ok(true)` if any target failed, `Ok(false)` if all succeeded.
    async fn fire_inner(&self, row: &ScheduledJob) -> Result<bool, SchedulerError> {
        let bot_id = match &row.bot_id {
            Some(id) => {
                if !self.bots.is_online(id).await {
                    return Err(SchedulerError::NoBotOnline);
                }
                id.clone()
            }
            None => self.bots.any_online().await.ok_or(SchedulerError::NoBotOnline)?,
        };

        let registration = self
            .plugins
            .lookup(&row.plugin_name)
            .ok_or_else(|| SchedulerError::UnregisteredPlugin(row.plugin_name.clone()))?;

        let targets = self.resolve_targets(row, &bot_id).await?;
        let mut row_with_bot = row.clone();
        row_with_bot.bot_id = Some(bot_id);

        let failures = fan_out(
            &row_with_bot,
            &registration,
            self.admission.clone(),
            targets,
            self.concurrency_limiter.clone(),
        )
        .await;
        Ok(failures > 0)
    }

    /// Target resolution per `target_type` (§4.5 step 4).
    async fn resolve_targets(
        &self,
        row: &ScheduledJob,
        bot_id: &str,
    ) -> Result<Vec<Option<String>>, SchedulerError> {
        match row.target_type {
            TargetType::Group | TargetType::User => Ok(vec![Some(row.target_identifier.clone())]),
            TargetType::Tag => {
                let ids = self.tag_resolver.resolve(&row.target_identifier, Some(bot_id)).await?;
                Ok(ids.into_iter().map(Some).collect())
            }
            TargetType::AllGroups => {
                let ids = self.tag_resolver.resolve(ALL_TAG, Some(bot_id)).await?;
                Ok(ids.into_iter().map(Some).collect())
            }
            TargetType::Global => Ok(vec![None]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn concurrency_policy_default_is_skip() {
        assert_eq!(ConcurrencyPolicy::default(), ConcurrencyPolicy::Skip);
    }
}

//! `ScheduledJob` row: the persistent record behind every live schedule (§4.5, §6).

use crate::common::entity_ids::ScheduledJobId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::{FromRow, PgPool};
use typed_builder::TypedBuilder;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "UPPERCASE")]
pub enum JobSource {
    User,
    PluginDefault,
}

impl Default for JobSource {
    fn default() -> Self {
        JobSource::User
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "UPPERCASE")]
pub enum TargetType {
    Group,
    User,
    Tag,
    AllGroups,
    Global,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
pub enum TriggerType {
    Cron,
    Interval,
    Date,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "UPPERCASE")]
pub enum LastRunStatus {
    Success,
    Failure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "UPPERCASE")]
pub enum ConcurrencyPolicy {
    Allow,
    Skip,
    Queue,
}

impl Default for ConcurrencyPolicy {
    fn default() -> Self {
        ConcurrencyPolicy::Skip
    }
}

/// Per-job overrides of the fan-out/retry behavior (§4.5.2, §4.7). `interval`
/// and `spread` are mutually exclusive; if neither is set, `spread` defaults
/// to 1.0s at validation time (see [`ExecutionOptions::normalize`]).
#[derive(Debug, Clone, Default, Serialize, Deserialize, TypedBuilder)]
pub struct ExecutionOptions {
    #[builder(default, setter(strip_option))]
    pub jitter: Option<f64>,
    #[builder(default, setter(strip_option))]
    pub spread: Option<f64>,
    #[builder(default, setter(strip_option))]
    pub interval: Option<f64>,
    #[builder(default, setter(strip_option))]
    pub concurrency_policy: Option<ConcurrencyPolicy>,
    #[builder(default, setter(strip_option))]
    pub retries: Option<u32>,
    #[builder(default, setter(strip_option))]
    pub retry_delay_seconds: Option<f64>,
}

#[derive(Debug, thiserror::Error)]
pub enum ExecutionOptionsError {
    #[error("interval and spread are mutually exclusive")]
    IntervalAndSpreadBothSet,
}

impl ExecutionOptions {
    pub const DEFAULT_SPREAD_SECONDS: f64 = 1.0;

    pub fn validate(&self) -> Result<(), ExecutionOptionsError> {
        if self.interval.is_some() && self.spread.is_some() {
            return Err(ExecutionOptionsError::IntervalAndSpreadBothSet);
        }
        Ok(())
    }

    /// Applies the default-spread rule: if neither `interval` nor `spread`
    /// is set, `spread` becomes `DEFAULT_SPREAD_SECONDS`.
    pub fn normalize(mut self) -> Self {
        if self.interval.is_none() && self.spread.is_none() {
            self.spread = Some(Self::DEFAULT_SPREAD_SECONDS);
        }
        self
    }
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ScheduledJob {
    pub id: ScheduledJobId,
    pub name: Option<String>,
    pub created_by: Option<String>,
    pub required_permission: i32,
    pub source: JobSource,
    pub bot_id: Option<String>,
    pub plugin_name: String,
    pub target_type: TargetType,
    pub target_identifier: String,
    pub trigger_type: TriggerType,
    pub trigger_config: Value,
    pub job_kwargs: Value,
    pub is_enabled: bool,
    pub is_one_off: bool,
    pub last_run_at: Option<DateTime<Utc>>,
    pub last_run_status: Option<LastRunStatus>,
    pub consecutive_failures: i32,
    pub execution_options: Option<Value>,
    pub create_time: DateTime<Utc>,
}

impl ScheduledJob {
    /// The live scheduler's job id for this row.
    pub fn live_job_key(&self) -> String {
        format!("zhenxun_schedule_{}", self.id)
    }

    pub fn ephemeral_job_key() -> String {
        format!("ephemeral_runtime_{}", uuid::Uuid::new_v4())
    }

    pub fn execution_options_parsed(&self) -> ExecutionOptions {
        self.execution_options
            .as_ref()
            .and_then(|v| serde_json::from_value::<ExecutionOptions>(v.clone()).ok())
            .unwrap_or_default()
            .normalize()
    }

    pub async fn find_by_id(pool: &PgPool, id: ScheduledJobId) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>("SELECT * FROM scheduled_jobs WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn find_by_natural_key(
        pool: &PgPool,
        plugin_name: &str,
        target_type: TargetType,
        target_identifier: &str,
        bot_id: Option<&str>,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>(
            "SELECT * FROM scheduled_jobs
             WHERE plugin_name = $1 AND target_type = $2 AND target_identifier = $3
               AND bot_id IS NOT DISTINCT FROM $4",
        )
        .bind(plugin_name)
        .bind(target_type)
        .bind(target_identifier)
        .bind(bot_id)
        .fetch_optional(pool)
        .await
    }

    pub async fn all_enabled(pool: &PgPool) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>("SELECT * FROM scheduled_jobs WHERE is_enabled = true")
            .fetch_all(pool)
            .await
    }

    /// Upserts by natural key `(plugin_name, target_type, target_identifier, bot_id)`,
    /// the idempotence contract `addSchedule` relies on (§8).
    #[allow(clippy::too_many_arguments)]
    pub async fn upsert_by_natural_key(
        pool: &PgPool,
        name: Option<&str>,
        created_by: Option<&str>,
        required_permission: i32,
        source: JobSource,
        bot_id: Option<&str>,
        plugin_name: &str,
        target_type: TargetType,
        target_identifier: &str,
        trigger_type: TriggerType,
        trigger_config: Value,
        job_kwargs: Value,
        execution_options: Option<Value>,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Self>(
            "INSERT INTO scheduled_jobs
                (id, name, created_by, required_permission, source, bot_id, plugin_name,
                 target_type, target_identifier, trigger_type, trigger_config, job_kwargs,
                 is_enabled, is_one_off, consecutive_failures, execution_options, create_time)
             VALUES
                ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, true, false, 0, $13, now())
             ON CONFLICT (plugin_name, target_type, target_identifier, (COALESCE(bot_id, ''))) DO UPDATE SET
                name = EXCLUDED.name,
                required_permission = EXCLUDED.required_permission,
                trigger_type = EXCLUDED.trigger_type,
                trigger_config = EXCLUDED.trigger_config,
                job_kwargs = EXCLUDED.job_kwargs,
                execution_options = EXCLUDED.execution_options
             RETURNING *",
        )
        .bind(ScheduledJobId::new())
        .bind(name)
        .bind(created_by)
        .bind(required_permission)
        .bind(source)
        .bind(bot_id)
        .bind(plugin_name)
        .bind(target_type)
        .bind(target_identifier)
        .bind(trigger_type)
        .bind(trigger_config)
        .bind(job_kwargs)
        .bind(execution_options)
        .fetch_one(pool)
        .await
    }

    pub async fn mark_one_off(pool: &PgPool, id: ScheduledJobId) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE scheduled_jobs SET is_one_off = true WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(())
    }

    pub async fn set_enabled(pool: &PgPool, id: ScheduledJobId, enabled: bool) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE scheduled_jobs SET is_enabled = $1 WHERE id = $2")
            .bind(enabled)
            .bind(id)
            .execute(pool)
            .await?;
        Ok(())
    }

    pub async fn record_run_result(
        pool: &PgPool,
        id: ScheduledJobId,
        status: LastRunStatus,
    ) -> Result<(), sqlx::Error> {
        match status {
            LastRunStatus::Success => {
                sqlx::query(
                    "UPDATE scheduled_jobs SET last_run_at = now(), last_run_status = $1,
                         consecutive_failures = 0 WHERE id = $2",
                )
                .bind(status)
                .bind(id)
                .execute(pool)
                .await?;
            }
            LastRunStatus::Failure => {
                sqlx::query(
                    "UPDATE scheduled_jobs SET last_run_at = now(), last_run_status = $1,
                         consecutive_failures = consecutive_failures + 1 WHERE id = $2",
                )
                .bind(status)
                .bind(id)
                .execute(pool)
                .await?;
            }
        }
        Ok(())
    }

    pub async fn update_partial(
        pool: &PgPool,
        id: ScheduledJobId,
        trigger_type: Option<TriggerType>,
        trigger_config: Option<Value>,
        job_kwargs: Option<Value>,
    ) -> Result<Self, sqlx::Error> {
        let existing = Self::find_by_id(pool, id)
            .await?
            .ok_or(sqlx::Error::RowNotFound)?;

        let merged_kwargs = match job_kwargs {
            Some(Value::Object(new_fields)) => {
                let mut base = existing.job_kwargs.as_object().cloned().unwrap_or_default();
                for (k, v) in new_fields {
                    base.insert(k, v);
                }
                Value::Object(base)
            }
            Some(other) => other,
            None => existing.job_kwargs.clone(),
        };

        sqlx::query_as::<_, Self>(
            "UPDATE scheduled_jobs SET
                trigger_type = COALESCE($1, trigger_type),
                trigger_config = COALESCE($2, trigger_config),
                job_kwargs = $3
             WHERE id = $4
             RETURNING *",
        )
        .bind(trigger_type)
        .bind(trigger_config)
        .bind(merged_kwargs)
        .bind(id)
        .fetch_one(pool)
        .await
    }

    pub async fn delete(pool: &PgPool, id: ScheduledJobId) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM scheduled_jobs WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn live_job_key_uses_expected_prefix() {
        let job = ScheduledJob {
            id: ScheduledJobId::new(),
            name: None,
            created_by: None,
            required_permission: 5,
            source: JobSource::User,
            bot_id: None,
            plugin_name: "greet".to_string(),
            target_type: TargetType::Group,
            target_identifier: "100".to_string(),
            trigger_type: TriggerType::Cron,
            trigger_config: serde_json::json!({}),
            job_kwargs: serde_json::json!({}),
            is_enabled: true,
            is_one_off: false,
            last_run_at: None,
            last_run_status: None,
            consecutive_failures: 0,
            execution_options: None,
            create_time: Utc::now(),
        };
        assert!(job.live_job_key().starts_with("zhenxun_schedule_"));
    }

    #[test]
    fn ephemeral_job_key_uses_expected_prefix() {
        assert!(ScheduledJob::ephemeral_job_key().starts_with("ephemeral_runtime_"));
    }

    #[test]
    fn execution_options_rejects_interval_and_spread_together() {
        let opts = ExecutionOptions::builder().interval(2.0).spread(1.0).build();
        assert!(opts.validate().is_err());
    }

    #[test]
    fn execution_options_defaults_spread_when_neither_set() {
        let opts = ExecutionOptions::builder().build().normalize();
        assert_eq!(opts.spread, Some(ExecutionOptions::DEFAULT_SPREAD_SECONDS));
        assert_eq!(opts.interval, None);
    }

    #[test]
    fn execution_options_preserves_explicit_interval() {
        let opts = ExecutionOptions::builder().interval(5.0).build().normalize();
        assert_eq!(opts.interval, Some(5.0));
        assert_eq!(opts.spread, None);
    }
}

use anyhow::{Context, Result};
use dotenvy::dotenv;
use std::env;

/// Application configuration loaded from environment variables (§6 Config keys).
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub port: u16,

    /// `SchedulerManager.all_groups_concurrency_limit`
    pub all_groups_concurrency_limit: usize,
    /// `SchedulerManager.DEFAULT_JITTER_SECONDS`
    pub default_jitter_seconds: Option<f64>,
    /// `SchedulerManager.DEFAULT_SPREAD_SECONDS`
    pub default_spread_seconds: f64,
    /// `SchedulerManager.DEFAULT_INTERVAL_SECONDS`
    pub default_interval_seconds: Option<f64>,
    /// `SchedulerManager.SCHEDULER_TIMEZONE`
    pub scheduler_timezone: String,

    /// `hook.FILTER_BOT`
    pub filter_bot: bool,
    /// `hook.CHECK_NOTICE_INFO_CD`
    pub check_notice_info_cd: u64,
    /// `hook.BAN_RESULT`
    pub ban_result: String,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        Ok(Self {
            database_url: env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .context("PORT must be a valid number")?,

            all_groups_concurrency_limit: env::var("SCHEDULER_MANAGER__ALL_GROUPS_CONCURRENCY_LIMIT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(5),
            default_jitter_seconds: env::var("SCHEDULER_MANAGER__DEFAULT_JITTER_SECONDS")
                .ok()
                .and_then(|v| v.parse().ok()),
            default_spread_seconds: env::var("SCHEDULER_MANAGER__DEFAULT_SPREAD_SECONDS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(1.0),
            default_interval_seconds: env::var("SCHEDULER_MANAGER__DEFAULT_INTERVAL_SECONDS")
                .ok()
                .and_then(|v| v.parse().ok()),
            scheduler_timezone: env::var("SCHEDULER_MANAGER__SCHEDULER_TIMEZONE")
                .unwrap_or_else(|_| "UTC".to_string()),

            filter_bot: env::var("HOOK__FILTER_BOT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(true),
            check_notice_info_cd: env::var("HOOK__CHECK_NOTICE_INFO_CD")
                .context("HOOK__CHECK_NOTICE_INFO_CD must be set")?
                .parse()
                .context("HOOK__CHECK_NOTICE_INFO_CD must be a valid number")?,
            ban_result: env::var("HOOK__BAN_RESULT")
                .unwrap_or_else(|_| "you have been banned".to_string()),
        })
    }
}

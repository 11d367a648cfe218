//! Scheduler admin CLI (§6). Connects directly to the database; `set`,
//! `update`, `trigger`, and `plugins` only see plugins registered in *this*
//! process, so they're of limited use run standalone against a live server's
//! in-memory registry — `view`/`pause`/`resume`/`delete` operate purely on
//! the persisted rows and work regardless.

use anyhow::{Context, Result};
use clap::Parser;
use server_core::cli::{self, SchedulerAdminCli};
use server_core::config::Config;
use server_core::scheduler::{AdmissionGate, BotAvailability, SchedulePluginRegistry, SchedulerManager};
use sqlx::PgPool;
use std::sync::Arc;

struct AlwaysOnline;

#[async_trait::async_trait]
impl BotAvailability for AlwaysOnline {
    async fn is_online(&self, _bot_id: &str) -> bool {
        true
    }

    async fn any_online(&self) -> Option<String> {
        None
    }
}

struct AlwaysOpen;

#[async_trait::async_trait]
impl AdmissionGate for AlwaysOpen {
    async fn is_blocked(&self, _group_id: Option<&str>, _plugin_name: &str) -> bool {
        false
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = SchedulerAdminCli::parse();
    let config = Config::from_env()?;
    let pool = PgPool::connect(&config.database_url)
        .await
        .context("failed to connect to database")?;

    use server_core::tags::{RuleRegistry, TagResolver};
    let tag_resolver = Arc::new(TagResolver::new(pool.clone(), Arc::new(NoGroups), RuleRegistry::new()));

    let manager = SchedulerManager::new(
        pool,
        Arc::new(SchedulePluginRegistry::new()),
        tag_resolver,
        Arc::new(AlwaysOnline),
        Arc::new(AlwaysOpen),
        config.all_groups_concurrency_limit,
    )
    .await
    .context("failed to initialize scheduler manager")?;

    let reply = cli::handle(cli, &manager).await;
    println!("{reply}");
    Ok(())
}

struct NoGroups;

#[async_trait::async_trait]
impl server_core::tags::GroupStore for NoGroups {
    async fn all_group_ids(&self) -> std::collections::BTreeSet<String> {
        std::collections::BTreeSet::new()
    }

    async fn bot_group_ids(&self, _bot_id: &str) -> std::collections::BTreeSet<String> {
        std::collections::BTreeSet::new()
    }

    async fn query_groups(
        &self,
        _predicates: &[server_core::tags::FieldPredicate],
    ) -> Result<std::collections::BTreeSet<String>, String> {
        Ok(std::collections::BTreeSet::new())
    }
}

//! Server entrypoint: wires the ambient stack (config, logging, pool) into a
//! `ServerKernel` and keeps the persistent scheduler alive. No HTTP/transport
//! layer is started here — out of scope (§1 Non-goals); a deployment embeds
//! this core behind whatever transport carries its own chat protocol.

use anyhow::{Context, Result};
use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use server_core::auth::checks::admin::AdminLevelCheck;
use server_core::auth::checks::ban::BanCheck;
use server_core::auth::checks::bot::BotAllowListCheck;
use server_core::auth::checks::group::GroupAdmissionCheck;
use server_core::auth::checks::plugin_enabled::PluginEnabledCheck;
use server_core::auth::checks::usage_limit::UsageLimitCheck;
use server_core::auth::{AuthPipeline, CheckRegistry, PluginRegistry as AuthPluginRegistry, UserStore};
use server_core::cache::Cache;
use server_core::config::Config;
use server_core::group_settings::{GlobalDefaults, GroupSettingsService};
use server_core::kernel::{
    AdminLevelStore, BanStore, Bot, BotRegistry, CommandParser, Group, MessageSink, ServerKernel, Session,
};
use server_core::limiters::concurrency::ConcurrencyLimiter;
use server_core::limiters::cooldown::CooldownLimiter;
use server_core::limiters::count::CountLimiter;
use server_core::limiters::rate::RateLimiter;
use server_core::limiters::user_block::UserBlockLimiter;
use server_core::scheduler::{registry::ParamSchema, SchedulePluginRegistry};
use server_core::tags::{GroupStore, RuleRegistry, TagResolver};
use sqlx::postgres::PgPoolOptions;
use std::collections::HashSet;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Logs outbound messages instead of delivering them — the concrete chat
/// transport is a deployment concern (§1 Non-goals: HTTP transport).
struct LoggingMessageSink;

#[async_trait]
impl MessageSink for LoggingMessageSink {
    async fn send(&self, session: &Session, message: &str, reply_to: Option<&str>) -> Result<()> {
        tracing::info!(user_id = %session.user_id, bot_id = %session.bot_id, reply_to, "{}", message);
        Ok(())
    }
}

/// A single statically-configured bot, always online. Multi-bot deployments
/// supply their own `BotRegistry` backed by the platform's bot directory.
struct SingleBotRegistry {
    bot_id: String,
}

#[async_trait]
impl BotRegistry for SingleBotRegistry {
    async fn get_bot(&self, id: Option<&str>) -> Result<Bot> {
        match id {
            Some(id) if id != self.bot_id => anyhow::bail!("unknown bot: {id}"),
            _ => Ok(Bot { id: self.bot_id.clone(), is_online: true, blocked_plugins: HashSet::new() }),
        }
    }

    async fn get_group_list(&self, _bot: &Bot) -> Vec<Group> {
        Vec::new()
    }

    async fn get_group(&self, _bot: &Bot, _group_id: &str) -> Option<Group> {
        None
    }
}

/// No ban records. Real deployments back `BanStore` with the platform's own
/// ban list.
struct NoBans;

#[async_trait]
impl BanStore for NoBans {
    async fn ban_remaining(&self, _user_id: Option<&str>, _group_id: Option<&str>) -> i64 {
        0
    }
}

/// Flat admin hierarchy: everyone is level 0. Real deployments back
/// `AdminLevelStore` with the platform's own permission levels.
struct NoAdminLevels;

#[async_trait]
impl AdminLevelStore for NoAdminLevels {
    async fn user_level(&self, _user_id: &str, _group_id: Option<&str>) -> u32 {
        0
    }
}

/// Parses `"k=v;k=v"` rule strings against a declared schema.
struct KvCommandParser;

#[async_trait]
impl CommandParser for KvCommandParser {
    async fn parse(&self, rule: &str, schema: &ParamSchema) -> Result<serde_json::Value, String> {
        let mut object = serde_json::Map::new();
        for pair in rule.split(';').filter(|p| !p.is_empty()) {
            let mut parts = pair.splitn(2, '=');
            let key = parts.next().unwrap_or_default().trim().to_string();
            let value = parts.next().unwrap_or_default().trim().to_string();
            object.insert(key, serde_json::Value::String(value));
        }
        let parsed = serde_json::Value::Object(object);
        schema.validate(&parsed).map_err(|e| e.to_string())?;
        Ok(parsed)
    }
}

/// Minimal in-process economy store. Real deployments back `UserStore` with
/// whatever ledger tracks gold/permissions; this keeps the binary runnable
/// without fabricating a dependency this crate doesn't otherwise need.
struct InMemoryUserStore {
    balances: DashMap<String, u64>,
    superusers: DashSet<String>,
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn balance(&self, user_id: &str) -> Option<u64> {
        Some(self.balances.get(user_id).map(|v| *v).unwrap_or(0))
    }

    async fn is_superuser(&self, user_id: &str) -> bool {
        self.superusers.contains(user_id)
    }

    async fn deduct(&self, user_id: &str, amount: u64) {
        self.balances.entry(user_id.to_string()).and_modify(|b| *b = b.saturating_sub(amount));
    }
}

struct NoGlobalDefaults;

impl GlobalDefaults for NoGlobalDefaults {
    fn defaults_for(&self, _plugin_name: &str) -> serde_json::Value {
        serde_json::json!({})
    }
}

struct NoGroups;

#[async_trait]
impl GroupStore for NoGroups {
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

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,server_core=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(true).with_line_number(true))
        .init();

    tracing::info!("starting chat-bot platform core runtime");

    let config = Config::from_env()?;
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await
        .context("failed to connect to database")?;

    let bot_id = std::env::var("BOT_ID").unwrap_or_else(|_| "default".to_string());

    let bot_registry = Arc::new(SingleBotRegistry { bot_id });
    let user_store = Arc::new(InMemoryUserStore { balances: DashMap::new(), superusers: DashSet::new() });
    let auth_plugins = Arc::new(AuthPluginRegistry::new());
    let cooldown_limiter = Arc::new(CooldownLimiter::new(std::time::Duration::from_secs(5)));
    let rate_limiter = Arc::new(RateLimiter::new(5, std::time::Duration::from_secs(60)));
    let count_limiter = Arc::new(CountLimiter::new(100, chrono_tz::UTC));
    let user_block_limiter = Arc::new(UserBlockLimiter::new());

    let mut checks = CheckRegistry::new();
    checks.register(Arc::new(BanCheck::new(Arc::new(NoBans))));
    checks.register(Arc::new(BotAllowListCheck::new(bot_registry.clone())));
    checks.register(Arc::new(GroupAdmissionCheck::new(bot_registry.clone())));
    checks.register(Arc::new(AdminLevelCheck::new(Arc::new(NoAdminLevels))));
    checks.register(Arc::new(PluginEnabledCheck::new(bot_registry.clone())));
    checks.register(Arc::new(UsageLimitCheck::new(
        cooldown_limiter.clone(),
        rate_limiter.clone(),
        count_limiter.clone(),
        user_block_limiter.clone(),
    )));
    let auth_pipeline = Arc::new(AuthPipeline::new(
        auth_plugins.clone(),
        user_store.clone(),
        checks,
        user_block_limiter.clone(),
        true,
    ));

    let kernel = Arc::new(ServerKernel::new(
        pool.clone(),
        Arc::new(Cache::memory(std::time::Duration::from_secs(300))),
        Arc::new(LoggingMessageSink),
        bot_registry,
        Arc::new(KvCommandParser),
        user_store,
        auth_plugins,
        auth_pipeline,
        Arc::new(SchedulePluginRegistry::new()),
        cooldown_limiter,
        rate_limiter,
        count_limiter,
        user_block_limiter,
        Arc::new(ConcurrencyLimiter::new(config.all_groups_concurrency_limit)),
        Arc::new(TagResolver::new(pool.clone(), Arc::new(NoGroups), RuleRegistry::new())),
        Arc::new(GroupSettingsService::new(pool, Arc::new(NoGlobalDefaults))),
    ));

    let _scheduler = server_core::kernel::scheduled_tasks::start_scheduler(&kernel, config.all_groups_concurrency_limit)
        .await
        .context("failed to start scheduler")?;

    tracing::info!("core runtime ready");
    tokio::signal::ctrl_c().await.context("failed to listen for shutdown signal")?;
    tracing::info!("shutting down");
    Ok(())
}

// TestDependencies - mock implementations for testing
//
// Provides spy/mock collaborators that can be injected into ServerKernel
// for tests, mirroring the teacher's spy-job-queue/mock-AI pattern.

use super::server_kernel::ServerKernel;
use super::traits::{Bot, BotRegistry, CommandParser, Group, MessageSink, Session};
use crate::auth::checks::admin::AdminLevelCheck;
use crate::auth::checks::ban::BanCheck;
use crate::auth::checks::bot::BotAllowListCheck;
use crate::auth::checks::group::GroupAdmissionCheck;
use crate::auth::checks::plugin_enabled::PluginEnabledCheck;
use crate::auth::checks::usage_limit::UsageLimitCheck;
use crate::auth::{AuthPipeline, CheckRegistry, PluginRegistry as AuthPluginRegistry, UserStore};
use crate::cache::Cache;
use crate::group_settings::{GlobalDefaults, GroupSettingsService};
use crate::limiters::concurrency::ConcurrencyLimiter;
use crate::limiters::cooldown::CooldownLimiter;
use crate::limiters::count::CountLimiter;
use crate::limiters::rate::RateLimiter;
use crate::limiters::user_block::UserBlockLimiter;
use crate::scheduler::registry::ParamSchema;
use crate::scheduler::SchedulePluginRegistry;
use crate::tags::resolver::GroupStore;
use crate::tags::rules::{FieldPredicate, RuleRegistry};
use crate::tags::TagResolver;
use async_trait::async_trait;
use serde_json::Value;
use sqlx::PgPool;
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Spy message sink that records every delivery attempt.
pub struct SpyMessageSink {
    sent: Arc<Mutex<Vec<(String, String, Option<String>)>>>,
}

impl Default for SpyMessageSink {
    fn default() -> Self {
        Self::new()
    }
}

impl SpyMessageSink {
    pub fn new() -> Self {
        Self {
            sent: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn sent(&self) -> Vec<(String, String, Option<String>)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl MessageSink for SpyMessageSink {
    async fn send(&self, session: &Session, message: &str, reply_to: Option<&str>) -> anyhow::Result<()> {
        self.sent.lock().unwrap().push((
            session.user_id.clone(),
            message.to_string(),
            reply_to.map(str::to_string),
        ));
        Ok(())
    }
}

/// Fixed-roster bot registry for tests.
pub struct MockBotRegistry {
    bots: Mutex<Vec<Bot>>,
    groups: Mutex<Vec<Group>>,
}

impl Default for MockBotRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBotRegistry {
    pub fn new() -> Self {
        Self {
            bots: Mutex::new(Vec::new()),
            groups: Mutex::new(Vec::new()),
        }
    }

    pub fn with_bot(self, bot: Bot) -> Self {
        self.bots.lock().unwrap().push(bot);
        self
    }

    pub fn with_group(self, group: Group) -> Self {
        self.groups.lock().unwrap().push(group);
        self
    }
}

#[async_trait]
impl BotRegistry for MockBotRegistry {
    async fn get_bot(&self, id: Option<&str>) -> anyhow::Result<Bot> {
        let bots = self.bots.lock().unwrap();
        match id {
            Some(id) => bots
                .iter()
                .find(|b| b.id == id && b.is_online)
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("bot {id} not online")),
            None => bots
                .iter()
                .find(|b| b.is_online)
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("no bot online")),
        }
    }

    async fn get_group_list(&self, _bot: &Bot) -> Vec<Group> {
        self.groups.lock().unwrap().clone()
    }

    async fn get_group(&self, _bot: &Bot, group_id: &str) -> Option<Group> {
        self.groups.lock().unwrap().iter().find(|g| g.id == group_id).cloned()
    }
}

/// Ban store that never bans anyone.
pub struct NoBans;

#[async_trait]
impl super::traits::BanStore for NoBans {
    async fn ban_remaining(&self, _user_id: Option<&str>, _group_id: Option<&str>) -> i64 {
        0
    }
}

/// Admin level store where everyone is level 0.
pub struct NoAdminLevels;

#[async_trait]
impl super::traits::AdminLevelStore for NoAdminLevels {
    async fn user_level(&self, _user_id: &str, _group_id: Option<&str>) -> u32 {
        0
    }
}

/// Always-matches command parser: returns `job_kwargs`-shaped JSON parsed
/// straight from the rule string's `key=value;key=value` form.
pub struct TrivialCommandParser;

#[async_trait]
impl CommandParser for TrivialCommandParser {
    async fn parse(&self, rule: &str, schema: &ParamSchema) -> Result<Value, String> {
        let mut object = serde_json::Map::new();
        for pair in rule.split(';').filter(|p| !p.is_empty()) {
            let mut parts = pair.splitn(2, '=');
            let key = parts.next().unwrap_or_default().trim();
            let value = parts.next().unwrap_or_default().trim();
            object.insert(key.to_string(), Value::String(value.to_string()));
        }
        let value = Value::Object(object);
        schema.validate(&value).map_err(|e| e.to_string())?;
        Ok(value)
    }
}

/// In-memory user store for tests.
pub struct MockUserStore {
    balances: Mutex<std::collections::HashMap<String, u64>>,
    superusers: Mutex<BTreeSet<String>>,
}

impl Default for MockUserStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MockUserStore {
    pub fn new() -> Self {
        Self {
            balances: Mutex::new(std::collections::HashMap::new()),
            superusers: Mutex::new(BTreeSet::new()),
        }
    }

    pub fn with_balance(self, user_id: &str, amount: u64) -> Self {
        self.balances.lock().unwrap().insert(user_id.to_string(), amount);
        self
    }

    pub fn with_superuser(self, user_id: &str) -> Self {
        self.superusers.lock().unwrap().insert(user_id.to_string());
        self
    }
}

#[async_trait]
impl UserStore for MockUserStore {
    async fn balance(&self, user_id: &str) -> Option<u64> {
        self.balances.lock().unwrap().get(user_id).copied()
    }

    async fn is_superuser(&self, user_id: &str) -> bool {
        self.superusers.lock().unwrap().contains(user_id)
    }

    async fn deduct(&self, user_id: &str, amount: u64) {
        if let Some(balance) = self.balances.lock().unwrap().get_mut(user_id) {
            *balance = balance.saturating_sub(amount);
        }
    }
}

/// In-memory group store for tag-resolution tests.
pub struct MockGroupStore {
    all: BTreeSet<String>,
    by_bot: std::collections::HashMap<String, BTreeSet<String>>,
}

impl MockGroupStore {
    pub fn new(all: BTreeSet<String>) -> Self {
        Self {
            all,
            by_bot: std::collections::HashMap::new(),
        }
    }

    pub fn with_bot_groups(mut self, bot_id: &str, groups: BTreeSet<String>) -> Self {
        self.by_bot.insert(bot_id.to_string(), groups);
        self
    }
}

#[async_trait]
impl GroupStore for MockGroupStore {
    async fn all_group_ids(&self) -> BTreeSet<String> {
        self.all.clone()
    }

    async fn bot_group_ids(&self, bot_id: &str) -> BTreeSet<String> {
        self.by_bot.get(bot_id).cloned().unwrap_or_default()
    }

    async fn query_groups(&self, _predicates: &[FieldPredicate]) -> Result<BTreeSet<String>, String> {
        Ok(BTreeSet::new())
    }
}

/// Empty-object global defaults, for settings tests that only care about overrides.
pub struct EmptyDefaults;

impl GlobalDefaults for EmptyDefaults {
    fn defaults_for(&self, _plugin_name: &str) -> Value {
        Value::Object(serde_json::Map::new())
    }
}

/// Builder for a fully-wired test `ServerKernel`.
pub struct TestDependencies {
    pub message_sink: Arc<SpyMessageSink>,
    pub bot_registry: Arc<MockBotRegistry>,
    pub command_parser: Arc<TrivialCommandParser>,
    pub user_store: Arc<MockUserStore>,
}

impl Default for TestDependencies {
    fn default() -> Self {
        Self::new()
    }
}

impl TestDependencies {
    pub fn new() -> Self {
        Self {
            message_sink: Arc::new(SpyMessageSink::new()),
            bot_registry: Arc::new(MockBotRegistry::new()),
            command_parser: Arc::new(TrivialCommandParser),
            user_store: Arc::new(MockUserStore::new()),
        }
    }

    /// Assembles a `ServerKernel` against a real pool (typically a
    /// testcontainers-provisioned Postgres) with fresh limiter/registry
    /// singletons and an empty-defaults group settings service.
    pub fn into_kernel(self, db_pool: PgPool) -> Arc<ServerKernel> {
        let group_store: Arc<dyn GroupStore> = Arc::new(MockGroupStore::new(BTreeSet::new()));
        let tag_resolver = Arc::new(TagResolver::new(db_pool.clone(), group_store, RuleRegistry::new()));
        let group_settings = Arc::new(GroupSettingsService::new(db_pool.clone(), Arc::new(EmptyDefaults)));

        let auth_plugins = Arc::new(AuthPluginRegistry::new());
        let cooldown_limiter = Arc::new(CooldownLimiter::new(Duration::from_secs(5)));
        let rate_limiter = Arc::new(RateLimiter::new(1, Duration::from_secs(60)));
        let count_limiter = Arc::new(CountLimiter::new(100, chrono_tz::UTC));
        let user_block_limiter = Arc::new(UserBlockLimiter::new());

        let mut checks = CheckRegistry::new();
        checks.register(Arc::new(BanCheck::new(Arc::new(NoBans))));
        checks.register(Arc::new(BotAllowListCheck::new(self.bot_registry.clone())));
        checks.register(Arc::new(GroupAdmissionCheck::new(self.bot_registry.clone())));
        checks.register(Arc::new(AdminLevelCheck::new(Arc::new(NoAdminLevels))));
        checks.register(Arc::new(PluginEnabledCheck::new(self.bot_registry.clone())));
        checks.register(Arc::new(UsageLimitCheck::new(
            cooldown_limiter.clone(),
            rate_limiter.clone(),
            count_limiter.clone(),
            user_block_limiter.clone(),
        )));
        let auth_pipeline = Arc::new(AuthPipeline::new(
            auth_plugins.clone(),
            self.user_store.clone(),
            checks,
            user_block_limiter.clone(),
            true,
        ));

        Arc::new(ServerKernel::new(
            db_pool,
            Arc::new(Cache::memory(Duration::from_secs(300))),
            self.message_sink,
            self.bot_registry,
            self.command_parser,
            self.user_store,
            auth_plugins,
            auth_pipeline,
            Arc::new(SchedulePluginRegistry::new()),
            cooldown_limiter,
            rate_limiter,
            count_limiter,
            user_block_limiter,
            Arc::new(ConcurrencyLimiter::new(5)),
            tag_resolver,
            group_settings,
        ))
    }
}

// ServerKernel - core infrastructure with all dependencies
//
// The ServerKernel holds all server dependencies (database, collaborators,
// process-wide registries, limiter singletons) and provides access via
// traits for testability.

use super::traits::{BotRegistry, CommandParser, MessageSink};
use crate::auth::{AuthPipeline, PluginRegistry as AuthPluginRegistry, UserStore};
use crate::cache::Cache;
use crate::group_settings::GroupSettingsService;
use crate::limiters::concurrency::ConcurrencyLimiter;
use crate::limiters::cooldown::CooldownLimiter;
use crate::limiters::count::CountLimiter;
use crate::limiters::rate::RateLimiter;
use crate::limiters::user_block::UserBlockLimiter;
use crate::scheduler::SchedulePluginRegistry;
use crate::tags::TagResolver;
use sqlx::PgPool;
use std::sync::Arc;

/// ServerKernel holds all server dependencies.
pub struct ServerKernel {
    pub db_pool: PgPool,
    pub cache: Arc<Cache>,
    pub message_sink: Arc<dyn MessageSink>,
    pub bot_registry: Arc<dyn BotRegistry>,
    pub command_parser: Arc<dyn CommandParser>,
    pub user_store: Arc<dyn UserStore>,
    pub auth_plugins: Arc<AuthPluginRegistry>,
    pub auth_pipeline: Arc<AuthPipeline>,
    pub schedule_plugins: Arc<SchedulePluginRegistry>,
    pub cooldown_limiter: Arc<CooldownLimiter>,
    pub rate_limiter: Arc<RateLimiter>,
    pub count_limiter: Arc<CountLimiter>,
    pub user_block_limiter: Arc<UserBlockLimiter>,
    pub concurrency_limiter: Arc<ConcurrencyLimiter>,
    pub tag_resolver: Arc<TagResolver>,
    pub group_settings: Arc<GroupSettingsService>,
}

impl ServerKernel {
    /// Creates a new ServerKernel with the given dependencies.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        db_pool: PgPool,
        cache: Arc<Cache>,
        message_sink: Arc<dyn MessageSink>,
        bot_registry: Arc<dyn BotRegistry>,
        command_parser: Arc<dyn CommandParser>,
        user_store: Arc<dyn UserStore>,
        auth_plugins: Arc<AuthPluginRegistry>,
        auth_pipeline: Arc<AuthPipeline>,
        schedule_plugins: Arc<SchedulePluginRegistry>,
        cooldown_limiter: Arc<CooldownLimiter>,
        rate_limiter: Arc<RateLimiter>,
        count_limiter: Arc<CountLimiter>,
        user_block_limiter: Arc<UserBlockLimiter>,
        concurrency_limiter: Arc<ConcurrencyLimiter>,
        tag_resolver: Arc<TagResolver>,
        group_settings: Arc<GroupSettingsService>,
    ) -> Self {
        Self {
            db_pool,
            cache,
            message_sink,
            bot_registry,
            command_parser,
            user_store,
            auth_plugins,
            auth_pipeline,
            schedule_plugins,
            cooldown_limiter,
            rate_limiter,
            count_limiter,
            user_block_limiter,
            concurrency_limiter,
            tag_resolver,
            group_settings,
        }
    }
}

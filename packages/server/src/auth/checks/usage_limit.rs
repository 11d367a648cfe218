//! Usage limit check (§4.4 step 4): cooldown, rate, daily count and
//! reentrancy-block limits as declared per plugin, grounded on
//! `auth_limit.py`'s `LimitManager`.
//!
//! The limiters themselves are process-wide singletons (one `CooldownLimiter`,
//! one `RateLimiter`, one `CountLimiter`, one `UserBlockLimiter` shared by
//! every plugin); each call here prefixes its lookup key with the plugin name
//! so one shared limiter instance still enforces a distinct limit per plugin.

use super::{AuthCheck, CheckContext};
use crate::auth::errors::CheckError;
use crate::auth::registry::{LimitScope, PluginAuthProfile};
use crate::limiters::{CooldownLimiter, CountLimiter, RateLimiter, UserBlockLimiter};
use async_trait::async_trait;
use std::sync::Arc;

pub struct UsageLimitCheck {
    cooldown: Arc<CooldownLimiter>,
    rate: Arc<RateLimiter>,
    count: Arc<CountLimiter>,
    user_block: Arc<UserBlockLimiter>,
}

impl UsageLimitCheck {
    pub fn new(
        cooldown: Arc<CooldownLimiter>,
        rate: Arc<RateLimiter>,
        count: Arc<CountLimiter>,
        user_block: Arc<UserBlockLimiter>,
    ) -> Self {
        Self { cooldown, rate, count, user_block }
    }

    fn scope_key(ctx: &CheckContext, scope: LimitScope) -> String {
        match scope {
            LimitScope::User => ctx.user_id.clone(),
            LimitScope::Group => ctx.channel_id.clone().or_else(|| ctx.group_id.clone()).unwrap_or_else(|| ctx.user_id.clone()),
        }
    }
}

#[async_trait]
impl AuthCheck for UsageLimitCheck {
    fn name(&self) -> &str {
        "usage_limit"
    }

    async fn run(&self, ctx: &CheckContext, profile: &PluginAuthProfile) -> Result<(), CheckError> {
        let scope_key = Self::scope_key(ctx, profile.limit_scope);
        let key = format!("{}:{}", profile.plugin_name, scope_key);

        if let Some(cd) = profile.cooldown {
            if !self.cooldown.check(&key) {
                let left = self.cooldown.left_time(&key);
                return Err(CheckError::SkipPlugin(format!(
                    "on cooldown, try again in {}s",
                    left.as_secs()
                )));
            }
            self.cooldown.start(&key, Some(cd));
        }

        if let Some((max, window)) = profile.rate_limit {
            if !self.rate.check_with(&key, max as usize, window) {
                return Err(CheckError::SkipPlugin("rate limit exceeded".to_string()));
            }
        }

        if let Some(max) = profile.daily_count_limit {
            if !self.count.check_with(&key, max) {
                return Err(CheckError::SkipPlugin("daily usage limit reached".to_string()));
            }
            self.count.increase(&key);
        }

        if profile.user_block {
            if !self.user_block.check(&key) {
                return Err(CheckError::SkipPlugin("already running, please wait".to_string()));
            }
            self.user_block.set_true(&key);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn ctx() -> CheckContext {
        CheckContext {
            user_id: "u1".to_string(),
            group_id: None,
            channel_id: None,
            bot_id: "b1".to_string(),
            plugin_name: "weather".to_string(),
            is_superuser: false,
        }
    }

    fn limiters() -> UsageLimitCheck {
        UsageLimitCheck::new(
            Arc::new(CooldownLimiter::new(Duration::from_secs(60))),
            Arc::new(RateLimiter::new(10, Duration::from_secs(60))),
            Arc::new(CountLimiter::new(10, chrono_tz::UTC)),
            Arc::new(UserBlockLimiter::new()),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn no_limits_declared_always_passes() {
        let check = limiters();
        let profile = PluginAuthProfile::builder().plugin_name("weather".to_string()).build();
        assert!(check.run(&ctx(), &profile).await.is_ok());
        assert!(check.run(&ctx(), &profile).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn cooldown_blocks_second_call_within_window() {
        let check = limiters();
        let profile = PluginAuthProfile::builder()
            .plugin_name("weather".to_string())
            .cooldown(Duration::from_secs(5))
            .build();
        assert!(check.run(&ctx(), &profile).await.is_ok());
        assert!(matches!(check.run(&ctx(), &profile).await, Err(CheckError::SkipPlugin(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn daily_count_limit_blocks_after_max() {
        let check = limiters();
        let profile = PluginAuthProfile::builder()
            .plugin_name("weather".to_string())
            .daily_count_limit(1)
            .build();
        assert!(check.run(&ctx(), &profile).await.is_ok());
        assert!(matches!(check.run(&ctx(), &profile).await, Err(CheckError::SkipPlugin(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn user_block_requires_explicit_release() {
        let check = limiters();
        let profile = PluginAuthProfile::builder().plugin_name("weather".to_string()).user_block(true).build();
        assert!(check.run(&ctx(), &profile).await.is_ok());
        assert!(matches!(check.run(&ctx(), &profile).await, Err(CheckError::SkipPlugin(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn different_plugins_do_not_share_a_cooldown_key() {
        let check = limiters();
        let profile_a = PluginAuthProfile::builder()
            .plugin_name("weather".to_string())
            .cooldown(Duration::from_secs(5))
            .build();
        let profile_b = PluginAuthProfile::builder()
            .plugin_name("news".to_string())
            .cooldown(Duration::from_secs(5))
            .build();
        assert!(check.run(&ctx(), &profile_a).await.is_ok());
        assert!(check.run(&ctx(), &profile_b).await.is_ok());
    }
}

//! The six-step authorization pipeline (§4.4) that gates every plugin invocation.

use super::checks::{CheckContext, CheckRegistry};
use super::circuit_breaker::CircuitBreakerRegistry;
use super::errors::{CheckError, PipelineOutcome};
use super::registry::{PluginAuthProfile, PluginRegistry};
use crate::limiters::user_block::UserBlockLimiter;
use std::sync::Arc;
use std::time::Duration;

/// Per-check timeout. Total step-4 outer timeout is `2 * PER_CHECK_TIMEOUT`.
const PER_CHECK_TIMEOUT: Duration = Duration::from_secs(3);
const SLOW_PIPELINE_WARN: Duration = Duration::from_millis(500);
const BREAKER_THRESHOLD: u32 = 3;
const BREAKER_RESET: Duration = Duration::from_secs(300);

/// Minimal user-record lookup the pipeline needs; the platform's real user
/// store implements this.
#[async_trait::async_trait]
pub trait UserStore: Send + Sync {
    async fn balance(&self, user_id: &str) -> Option<u64>;
    async fn is_superuser(&self, user_id: &str) -> bool;
    async fn deduct(&self, user_id: &str, amount: u64);
}

pub struct AuthPipeline {
    plugins: Arc<PluginRegistry>,
    users: Arc<dyn UserStore>,
    checks: CheckRegistry,
    breakers: CircuitBreakerRegistry,
    user_block: Arc<UserBlockLimiter>,
    filter_bot: bool,
}

impl AuthPipeline {
    pub fn new(
        plugins: Arc<PluginRegistry>,
        users: Arc<dyn UserStore>,
        checks: CheckRegistry,
        user_block: Arc<UserBlockLimiter>,
        filter_bot: bool,
    ) -> Self {
        Self {
            plugins,
            users,
            checks,
            breakers: CircuitBreakerRegistry::new(BREAKER_THRESHOLD, BREAKER_RESET),
            user_block,
            filter_bot,
        }
    }

    /// Runs the full pipeline for one event against one plugin. `sender_is_bot`
    /// implements the step-3 bot-level filter.
    pub async fn run(&self, ctx: CheckContext, sender_is_bot: bool) -> PipelineOutcome {
        let start = tokio::time::Instant::now();
        let outcome = self.run_inner(&ctx, sender_is_bot).await;

        // Step 6: always release user-block tokens acquired for this user,
        // on every exit path.
        self.user_block.set_false(&ctx.user_id);

        let elapsed = start.elapsed();
        if elapsed > SLOW_PIPELINE_WARN {
            tracing::warn!(
                plugin_name = %ctx.plugin_name,
                user_id = %ctx.user_id,
                elapsed_ms = elapsed.as_millis() as u64,
                "authorization pipeline exceeded warning threshold"
            );
        }
        outcome
    }

    async fn run_inner(&self, ctx: &CheckContext, sender_is_bot: bool) -> PipelineOutcome {
        // Step 1: resolve plugin + user records in parallel. Absence of
        // either is a permission exemption, not an error.
        let (profile, balance) = tokio::join!(
            async { self.plugins.lookup(&ctx.plugin_name) },
            self.users.balance(&ctx.user_id),
        );

        // An unregistered plugin is a permission exemption, not an error: it
        // runs without going through the checks below or being charged.
        let Some(profile) = profile else {
            return PipelineOutcome::Continue;
        };
        if balance.is_none() {
            return PipelineOutcome::Continue;
        }
        let mut balance = balance.unwrap();

        if !profile.private_allowed && ctx.group_id.is_none() {
            return PipelineOutcome::Ignored {
                reason: "plugin disallowed in private chats".to_string(),
            };
        }
        if !profile.group_allowed && ctx.group_id.is_some() {
            return PipelineOutcome::Ignored {
                reason: "plugin disallowed in groups".to_string(),
            };
        }

        // Step 2: cost check. Superusers exempt unless superuser_only.
        let is_superuser = self.users.is_superuser(&ctx.user_id).await;
        let exempt_from_cost = is_superuser && !profile.superuser_only;
        if !exempt_from_cost && profile.cost_gold > 0 && balance < profile.cost_gold as u64 {
            return PipelineOutcome::Ignored {
                reason: "insufficient balance".to_string(),
            };
        }

        // Step 3: bot-level filter.
        if self.filter_bot && sender_is_bot {
            return PipelineOutcome::Ignored {
                reason: "sender is a bot".to_string(),
            };
        }

        // Step 4: concurrent checks under a single outer 2T timeout. The
        // superuser flag resolved above is threaded through so checks can
        // report it without re-querying the user store.
        let mut check_ctx = ctx.clone();
        check_ctx.is_superuser = is_superuser;
        if let Some(skip_reason) = self.run_checks(&check_ctx, &profile).await {
            return PipelineOutcome::Ignored { reason: skip_reason };
        }

        // Step 5: deduct gold atomically, clamp to zero.
        if !exempt_from_cost && profile.cost_gold > 0 {
            balance = balance.saturating_sub(profile.cost_gold as u64);
            self.users.deduct(&ctx.user_id, profile.cost_gold as u64).await;
        }
        let _ = balance;

        PipelineOutcome::Continue
    }

    /// Runs every registered check concurrently, honoring circuit breakers
    /// and per-check timeouts, under an outer `2 * T` deadline. Returns
    /// `Some(reason)` for the first `SkipPlugin` observed, `None` otherwise.
    async fn run_checks(&self, ctx: &CheckContext, profile: &PluginAuthProfile) -> Option<String> {
        let outer_deadline = PER_CHECK_TIMEOUT * 2;
        let futures = self.checks.iter().map(|check| {
            let check = check.clone();
            let ctx = ctx.clone();
            async move {
                if self.breakers.is_open(check.name()) {
                    return None;
                }
                match tokio::time::timeout(PER_CHECK_TIMEOUT, check.run(&ctx, profile)).await {
                    Ok(Ok(())) => None,
                    Ok(Err(CheckError::SkipPlugin(reason))) => Some(reason),
                    Ok(Err(CheckError::IsSuperuser)) => None,
                    Ok(Err(CheckError::PermissionExemption(_))) => None,
                    Ok(Err(CheckError::Other(err))) => {
                        tracing::warn!(check = check.name(), error = %err, "auth check failed, failing open");
                        None
                    }
                    Err(_) => {
                        tracing::warn!(check = check.name(), "auth check timed out");
                        self.breakers.record_timeout(check.name());
                        None
                    }
                }
            }
        });

        let joined = futures::future::join_all(futures);
        match tokio::time::timeout(outer_deadline, joined).await {
            Ok(results) => results.into_iter().flatten().next(),
            Err(_) => {
                tracing::warn!("authorization check group exceeded outer timeout");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::super::registry::PluginAuthProfile;
    use async_trait::async_trait;

    struct FixedUsers {
        balance: u64,
        superuser: bool,
    }

    #[async_trait]
    impl UserStore for FixedUsers {
        async fn balance(&self, _user_id: &str) -> Option<u64> {
            Some(self.balance)
        }
        async fn is_superuser(&self, _user_id: &str) -> bool {
            self.superuser
        }
        async fn deduct(&self, _user_id: &str, _amount: u64) {}
    }

    struct AlwaysSkip;
    #[async_trait]
    impl super::super::checks::AuthCheck for AlwaysSkip {
        fn name(&self) -> &str {
            "ban"
        }
        async fn run(&self, _ctx: &CheckContext, _profile: &PluginAuthProfile) -> Result<(), CheckError> {
            Err(CheckError::SkipPlugin("banned".to_string()))
        }
    }

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

    #[tokio::test]
    async fn unknown_plugin_is_a_permission_exemption() {
        let plugins = Arc::new(PluginRegistry::new());
        let users = Arc::new(FixedUsers { balance: 100, superuser: false });
        let pipeline = AuthPipeline::new(
            plugins,
            users,
            CheckRegistry::new(),
            Arc::new(UserBlockLimiter::new()),
            true,
        );
        let outcome = pipeline.run(ctx(), false).await;
        assert_eq!(outcome, PipelineOutcome::Continue);
    }

    #[tokio::test]
    async fn insufficient_balance_is_ignored_for_non_superuser() {
        let plugins = Arc::new(PluginRegistry::new());
        plugins.register(
            PluginAuthProfile::builder()
                .plugin_name("weather".to_string())
                .cost_gold(50)
                .build(),
        );
        let users = Arc::new(FixedUsers { balance: 10, superuser: false });
        let pipeline = AuthPipeline::new(
            plugins,
            users,
            CheckRegistry::new(),
            Arc::new(UserBlockLimiter::new()),
            true,
        );
        let outcome = pipeline.run(ctx(), false).await;
        assert!(matches!(outcome, PipelineOutcome::Ignored { .. }));
    }

    #[tokio::test]
    async fn superuser_exempt_from_cost_unless_superuser_only() {
        let plugins = Arc::new(PluginRegistry::new());
        plugins.register(
            PluginAuthProfile::builder()
                .plugin_name("weather".to_string())
                .cost_gold(50)
                .build(),
        );
        let users = Arc::new(FixedUsers { balance: 0, superuser: true });
        let pipeline = AuthPipeline::new(
            plugins,
            users,
            CheckRegistry::new(),
            Arc::new(UserBlockLimiter::new()),
            true,
        );
        let outcome = pipeline.run(ctx(), false).await;
        assert_eq!(outcome, PipelineOutcome::Continue);
    }

    #[tokio::test]
    async fn skip_plugin_from_any_check_yields_ignored_with_its_reason() {
        let plugins = Arc::new(PluginRegistry::new());
        plugins.register(PluginAuthProfile::builder().plugin_name("weather".to_string()).build());
        let users = Arc::new(FixedUsers { balance: 100, superuser: false });
        let mut checks = CheckRegistry::new();
        checks.register(Arc::new(AlwaysSkip));
        let pipeline = AuthPipeline::new(plugins, users, checks, Arc::new(UserBlockLimiter::new()), true);
        let outcome = pipeline.run(ctx(), false).await;
        assert_eq!(
            outcome,
            PipelineOutcome::Ignored {
                reason: "banned".to_string()
            }
        );
    }

    #[tokio::test]
    async fn bot_sender_is_ignored_when_filter_bot_enabled() {
        let plugins = Arc::new(PluginRegistry::new());
        plugins.register(PluginAuthProfile::builder().plugin_name("weather".to_string()).build());
        let users = Arc::new(FixedUsers { balance: 100, superuser: false });
        let pipeline = AuthPipeline::new(
            plugins,
            users,
            CheckRegistry::new(),
            Arc::new(UserBlockLimiter::new()),
            true,
        );
        let outcome = pipeline.run(ctx(), true).await;
        assert!(matches!(outcome, PipelineOutcome::Ignored { .. }));
    }

    #[tokio::test]
    async fn user_block_token_is_always_released_after_run() {
        let user_block = Arc::new(UserBlockLimiter::new());
        user_block.set_true("u1");
        let plugins = Arc::new(PluginRegistry::new());
        let users = Arc::new(FixedUsers { balance: 100, superuser: false });
        let pipeline = AuthPipeline::new(plugins, users, CheckRegistry::new(), user_block.clone(), true);
        let _ = pipeline.run(ctx(), false).await;
        assert!(user_block.check("u1"));
    }

    #[tokio::test]
    async fn plugin_disallowed_in_groups_is_ignored_when_group_present() {
        let plugins = Arc::new(PluginRegistry::new());
        plugins.register(
            PluginAuthProfile::builder()
                .plugin_name("weather".to_string())
                .group_allowed(false)
                .build(),
        );
        let users = Arc::new(FixedUsers { balance: 100, superuser: false });
        let pipeline = AuthPipeline::new(
            plugins,
            users,
            CheckRegistry::new(),
            Arc::new(UserBlockLimiter::new()),
            true,
        );
        let mut c = ctx();
        c.group_id = Some("g1".to_string());
        let outcome = pipeline.run(c, false).await;
        assert!(matches!(outcome, PipelineOutcome::Ignored { .. }));
    }
}

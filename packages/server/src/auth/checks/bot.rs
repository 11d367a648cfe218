//! Bot allow-list check (§4.4 step 4): the addressed bot is online and has
//! not blocked this plugin, grounded on `auth_bot.py`.

use super::{AuthCheck, CheckContext};
use crate::auth::errors::CheckError;
use crate::auth::registry::PluginAuthProfile;
use crate::kernel::traits::BotRegistry;
use async_trait::async_trait;
use std::sync::Arc;

pub struct BotAllowListCheck {
    bots: Arc<dyn BotRegistry>,
}

impl BotAllowListCheck {
    pub fn new(bots: Arc<dyn BotRegistry>) -> Self {
        Self { bots }
    }
}

#[async_trait]
impl AuthCheck for BotAllowListCheck {
    fn name(&self) -> &str {
        "bot"
    }

    async fn run(&self, ctx: &CheckContext, _profile: &PluginAuthProfile) -> Result<(), CheckError> {
        let bot = self.bots.get_bot(Some(&ctx.bot_id)).await?;
        if !bot.is_online {
            return Err(CheckError::SkipPlugin("bot is not online".to_string()));
        }
        if bot.blocked_plugins.contains(&ctx.plugin_name) {
            return Err(CheckError::SkipPlugin(format!("plugin {} is disabled for this bot", ctx.plugin_name)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::traits::{Bot, Group};
    use std::collections::HashSet;

    struct FixedBot(Bot);

    #[async_trait]
    impl BotRegistry for FixedBot {
        async fn get_bot(&self, _id: Option<&str>) -> anyhow::Result<Bot> {
            Ok(self.0.clone())
        }
        async fn get_group_list(&self, _bot: &Bot) -> Vec<Group> {
            Vec::new()
        }
        async fn get_group(&self, _bot: &Bot, _group_id: &str) -> Option<Group> {
            None
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

    fn profile() -> PluginAuthProfile {
        PluginAuthProfile::builder().plugin_name("weather".to_string()).build()
    }

    #[tokio::test]
    async fn offline_bot_is_skipped() {
        let check = BotAllowListCheck::new(Arc::new(FixedBot(Bot {
            id: "b1".to_string(),
            is_online: false,
            blocked_plugins: HashSet::new(),
        })));
        assert!(matches!(check.run(&ctx(), &profile()).await, Err(CheckError::SkipPlugin(_))));
    }

    #[tokio::test]
    async fn blocked_plugin_is_skipped() {
        let mut blocked = HashSet::new();
        blocked.insert("weather".to_string());
        let check = BotAllowListCheck::new(Arc::new(FixedBot(Bot {
            id: "b1".to_string(),
            is_online: true,
            blocked_plugins: blocked,
        })));
        assert!(matches!(check.run(&ctx(), &profile()).await, Err(CheckError::SkipPlugin(_))));
    }

    #[tokio::test]
    async fn online_unblocked_bot_passes() {
        let check = BotAllowListCheck::new(Arc::new(FixedBot(Bot {
            id: "b1".to_string(),
            is_online: true,
            blocked_plugins: HashSet::new(),
        })));
        assert!(check.run(&ctx(), &profile()).await.is_ok());
    }
}

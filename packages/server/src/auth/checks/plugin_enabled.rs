//! Plugin enabled-state check (§4.4 step 4): per-group block lists plus the
//! plugin's own global enabled flag, grounded on `auth_plugin.py`'s
//! `GroupCheck`/`PluginCheck`.

use super::{AuthCheck, CheckContext};
use crate::auth::errors::CheckError;
use crate::auth::registry::PluginAuthProfile;
use crate::kernel::traits::BotRegistry;
use async_trait::async_trait;
use std::sync::Arc;

pub struct PluginEnabledCheck {
    bots: Arc<dyn BotRegistry>,
}

impl PluginEnabledCheck {
    pub fn new(bots: Arc<dyn BotRegistry>) -> Self {
        Self { bots }
    }
}

#[async_trait]
impl AuthCheck for PluginEnabledCheck {
    fn name(&self) -> &str {
        "plugin_enabled"
    }

    async fn run(&self, ctx: &CheckContext, profile: &PluginAuthProfile) -> Result<(), CheckError> {
        if let Some(group_id) = ctx.group_id.as_deref() {
            let bot = self.bots.get_bot(Some(&ctx.bot_id)).await?;
            if let Some(group) = self.bots.get_group(&bot, group_id).await {
                if group.superuser_block_plugins.contains(&ctx.plugin_name) {
                    return Err(CheckError::SkipPlugin(
                        "plugin was disabled for this group by a superuser".to_string(),
                    ));
                }
                if group.block_plugins.contains(&ctx.plugin_name) {
                    return Err(CheckError::SkipPlugin("plugin is disabled for this group".to_string()));
                }
            }
        } else if !profile.private_allowed {
            return Err(CheckError::SkipPlugin("plugin does not run in private messages".to_string()));
        }

        if !profile.enabled {
            if ctx.is_superuser {
                return Err(CheckError::IsSuperuser);
            }
            return Err(CheckError::SkipPlugin("plugin is globally disabled".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::traits::{Bot, Group};
    use std::collections::HashSet;

    struct FixedGroup(Option<Group>);

    #[async_trait]
    impl BotRegistry for FixedGroup {
        async fn get_bot(&self, _id: Option<&str>) -> anyhow::Result<Bot> {
            Ok(Bot { id: "b1".to_string(), is_online: true, blocked_plugins: HashSet::new() })
        }
        async fn get_group_list(&self, _bot: &Bot) -> Vec<Group> {
            self.0.iter().cloned().collect()
        }
        async fn get_group(&self, _bot: &Bot, _group_id: &str) -> Option<Group> {
            self.0.clone()
        }
    }

    fn ctx(group_id: Option<&str>, is_superuser: bool) -> CheckContext {
        CheckContext {
            user_id: "u1".to_string(),
            group_id: group_id.map(str::to_string),
            channel_id: None,
            bot_id: "b1".to_string(),
            plugin_name: "weather".to_string(),
            is_superuser,
        }
    }

    fn group_with(block: &[&str], superuser_block: &[&str]) -> Group {
        Group {
            id: "g1".to_string(),
            level: 0,
            status: true,
            block_plugins: block.iter().map(|s| s.to_string()).collect(),
            superuser_block_plugins: superuser_block.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[tokio::test]
    async fn group_block_list_skips() {
        let check = PluginEnabledCheck::new(Arc::new(FixedGroup(Some(group_with(&["weather"], &[])))));
        let profile = PluginAuthProfile::builder().plugin_name("weather".to_string()).build();
        assert!(matches!(check.run(&ctx(Some("g1"), false), &profile).await, Err(CheckError::SkipPlugin(_))));
    }

    #[tokio::test]
    async fn superuser_block_list_skips() {
        let check = PluginEnabledCheck::new(Arc::new(FixedGroup(Some(group_with(&[], &["weather"])))));
        let profile = PluginAuthProfile::builder().plugin_name("weather".to_string()).build();
        assert!(matches!(check.run(&ctx(Some("g1"), false), &profile).await, Err(CheckError::SkipPlugin(_))));
    }

    #[tokio::test]
    async fn globally_disabled_skips_ordinary_user() {
        let check = PluginEnabledCheck::new(Arc::new(FixedGroup(None)));
        let profile = PluginAuthProfile::builder().plugin_name("weather".to_string()).enabled(false).build();
        assert!(matches!(check.run(&ctx(None, false), &profile).await, Err(CheckError::SkipPlugin(_))));
    }

    #[tokio::test]
    async fn globally_disabled_reports_superuser_exemption() {
        let check = PluginEnabledCheck::new(Arc::new(FixedGroup(None)));
        let profile = PluginAuthProfile::builder().plugin_name("weather".to_string()).enabled(false).build();
        assert!(matches!(check.run(&ctx(None, true), &profile).await, Err(CheckError::IsSuperuser)));
    }

    #[tokio::test]
    async fn private_disallowed_skips_in_private() {
        let check = PluginEnabledCheck::new(Arc::new(FixedGroup(None)));
        let profile = PluginAuthProfile::builder().plugin_name("weather".to_string()).private_allowed(false).build();
        assert!(matches!(check.run(&ctx(None, false), &profile).await, Err(CheckError::SkipPlugin(_))));
    }

    #[tokio::test]
    async fn enabled_plugin_with_no_blocks_passes() {
        let check = PluginEnabledCheck::new(Arc::new(FixedGroup(Some(group_with(&[], &[])))));
        let profile = PluginAuthProfile::builder().plugin_name("weather".to_string()).build();
        assert!(check.run(&ctx(Some("g1"), false), &profile).await.is_ok());
    }
}

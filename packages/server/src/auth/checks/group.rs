//! Group admission check (§4.4 step 4): group exists, is not blacklisted,
//! is not sleeping, and the group's level meets the plugin's requirement —
//! grounded on `auth_group.py`.

use super::{AuthCheck, CheckContext};
use crate::auth::errors::CheckError;
use crate::auth::registry::PluginAuthProfile;
use crate::kernel::traits::BotRegistry;
use async_trait::async_trait;
use std::sync::Arc;

pub struct GroupAdmissionCheck {
    bots: Arc<dyn BotRegistry>,
}

impl GroupAdmissionCheck {
    pub fn new(bots: Arc<dyn BotRegistry>) -> Self {
        Self { bots }
    }
}

#[async_trait]
impl AuthCheck for GroupAdmissionCheck {
    fn name(&self) -> &str {
        "group_admission"
    }

    async fn run(&self, ctx: &CheckContext, profile: &PluginAuthProfile) -> Result<(), CheckError> {
        let Some(group_id) = ctx.group_id.as_deref() else {
            return Ok(());
        };
        let bot = self.bots.get_bot(Some(&ctx.bot_id)).await?;
        let Some(group) = self.bots.get_group(&bot, group_id).await else {
            return Err(CheckError::SkipPlugin("group is not registered".to_string()));
        };
        if group.level < 0 {
            return Err(CheckError::SkipPlugin("group is blacklisted".to_string()));
        }
        if !group.status {
            return Err(CheckError::SkipPlugin("group is sleeping".to_string()));
        }
        if profile.required_group_level > group.level {
            return Err(CheckError::SkipPlugin(format!(
                "plugin requires group level {}, this group is level {}",
                profile.required_group_level, group.level
            )));
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

    fn ctx(group_id: Option<&str>) -> CheckContext {
        CheckContext {
            user_id: "u1".to_string(),
            group_id: group_id.map(str::to_string),
            channel_id: None,
            bot_id: "b1".to_string(),
            plugin_name: "weather".to_string(),
            is_superuser: false,
        }
    }

    fn group(level: i32, status: bool) -> Group {
        Group { id: "g1".to_string(), level, status, block_plugins: HashSet::new(), superuser_block_plugins: HashSet::new() }
    }

    #[tokio::test]
    async fn private_messages_are_not_gated() {
        let check = GroupAdmissionCheck::new(Arc::new(FixedGroup(None)));
        let profile = PluginAuthProfile::builder().plugin_name("w".to_string()).build();
        assert!(check.run(&ctx(None), &profile).await.is_ok());
    }

    #[tokio::test]
    async fn unregistered_group_is_skipped() {
        let check = GroupAdmissionCheck::new(Arc::new(FixedGroup(None)));
        let profile = PluginAuthProfile::builder().plugin_name("w".to_string()).build();
        assert!(matches!(check.run(&ctx(Some("g1")), &profile).await, Err(CheckError::SkipPlugin(_))));
    }

    #[tokio::test]
    async fn negative_level_group_is_blacklisted() {
        let check = GroupAdmissionCheck::new(Arc::new(FixedGroup(Some(group(-1, true)))));
        let profile = PluginAuthProfile::builder().plugin_name("w".to_string()).build();
        assert!(matches!(check.run(&ctx(Some("g1")), &profile).await, Err(CheckError::SkipPlugin(_))));
    }

    #[tokio::test]
    async fn sleeping_group_is_skipped() {
        let check = GroupAdmissionCheck::new(Arc::new(FixedGroup(Some(group(5, false)))));
        let profile = PluginAuthProfile::builder().plugin_name("w".to_string()).build();
        assert!(matches!(check.run(&ctx(Some("g1")), &profile).await, Err(CheckError::SkipPlugin(_))));
    }

    #[tokio::test]
    async fn insufficient_group_level_is_skipped() {
        let check = GroupAdmissionCheck::new(Arc::new(FixedGroup(Some(group(1, true)))));
        let profile = PluginAuthProfile::builder().plugin_name("w".to_string()).required_group_level(5).build();
        assert!(matches!(check.run(&ctx(Some("g1")), &profile).await, Err(CheckError::SkipPlugin(_))));
    }

    #[tokio::test]
    async fn sufficient_group_level_passes() {
        let check = GroupAdmissionCheck::new(Arc::new(FixedGroup(Some(group(5, true)))));
        let profile = PluginAuthProfile::builder().plugin_name("w".to_string()).required_group_level(5).build();
        assert!(check.run(&ctx(Some("g1")), &profile).await.is_ok());
    }
}

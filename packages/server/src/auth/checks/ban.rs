//! Ban check (§4.4 step 4): user and/or group in the ban list with expiry,
//! grounded on `auth_ban.py::is_ban` / `calculate_ban_time`.

use super::{AuthCheck, CheckContext};
use crate::auth::errors::CheckError;
use crate::auth::registry::PluginAuthProfile;
use crate::kernel::traits::BanStore;
use async_trait::async_trait;
use std::sync::Arc;

pub struct BanCheck {
    bans: Arc<dyn BanStore>,
}

impl BanCheck {
    pub fn new(bans: Arc<dyn BanStore>) -> Self {
        Self { bans }
    }
}

#[async_trait]
impl AuthCheck for BanCheck {
    fn name(&self) -> &str {
        "ban"
    }

    async fn run(&self, ctx: &CheckContext, _profile: &PluginAuthProfile) -> Result<(), CheckError> {
        if ctx.is_superuser {
            return Ok(());
        }
        let remaining = self.bans.ban_remaining(Some(&ctx.user_id), ctx.group_id.as_deref()).await;
        if remaining != 0 {
            return Err(CheckError::SkipPlugin("you are banned".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(is_superuser: bool) -> CheckContext {
        CheckContext {
            user_id: "u1".to_string(),
            group_id: None,
            channel_id: None,
            bot_id: "b1".to_string(),
            plugin_name: "weather".to_string(),
            is_superuser,
        }
    }

    struct FixedBan(i64);

    #[async_trait]
    impl BanStore for FixedBan {
        async fn ban_remaining(&self, _user_id: Option<&str>, _group_id: Option<&str>) -> i64 {
            self.0
        }
    }

    #[tokio::test]
    async fn not_banned_passes() {
        let check = BanCheck::new(Arc::new(FixedBan(0)));
        assert!(check.run(&ctx(false), &PluginAuthProfile::builder().plugin_name("w".into()).build()).await.is_ok());
    }

    #[tokio::test]
    async fn banned_user_is_skipped() {
        let check = BanCheck::new(Arc::new(FixedBan(30)));
        let result = check.run(&ctx(false), &PluginAuthProfile::builder().plugin_name("w".into()).build()).await;
        assert!(matches!(result, Err(CheckError::SkipPlugin(_))));
    }

    #[tokio::test]
    async fn permanent_ban_is_skipped() {
        let check = BanCheck::new(Arc::new(FixedBan(-1)));
        let result = check.run(&ctx(false), &PluginAuthProfile::builder().plugin_name("w".into()).build()).await;
        assert!(matches!(result, Err(CheckError::SkipPlugin(_))));
    }

    #[tokio::test]
    async fn superuser_bypasses_ban() {
        let check = BanCheck::new(Arc::new(FixedBan(-1)));
        let result = check.run(&ctx(true), &PluginAuthProfile::builder().plugin_name("w".into()).build()).await;
        assert!(result.is_ok());
    }
}

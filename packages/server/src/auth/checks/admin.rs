//! Admin level check (§4.4 step 4): the sender's effective admin level must
//! meet the plugin's declared minimum, grounded on `auth_admin.py`.

use super::{AuthCheck, CheckContext};
use crate::auth::errors::CheckError;
use crate::auth::registry::PluginAuthProfile;
use crate::kernel::traits::AdminLevelStore;
use async_trait::async_trait;
use std::sync::Arc;

pub struct AdminLevelCheck {
    levels: Arc<dyn AdminLevelStore>,
}

impl AdminLevelCheck {
    pub fn new(levels: Arc<dyn AdminLevelStore>) -> Self {
        Self { levels }
    }
}

#[async_trait]
impl AuthCheck for AdminLevelCheck {
    fn name(&self) -> &str {
        "admin_level"
    }

    async fn run(&self, ctx: &CheckContext, profile: &PluginAuthProfile) -> Result<(), CheckError> {
        if profile.required_admin_level == 0 {
            return Ok(());
        }
        let level = self.levels.user_level(&ctx.user_id, ctx.group_id.as_deref()).await;
        if level < profile.required_admin_level {
            return Err(CheckError::SkipPlugin(format!(
                "plugin requires admin level {}, you are level {}",
                profile.required_admin_level, level
            )));
        }
        Ok(())
    }
}

//! Named registry of independent auth checks (§9: a direct structural carry
//! from the source's `HookCheck` registry — not a hardcoded sequence).

use super::errors::CheckError;
use super::registry::PluginAuthProfile;
use async_trait::async_trait;
use std::sync::Arc;

pub mod admin;
pub mod ban;
pub mod bot;
pub mod group;
pub mod plugin_enabled;
pub mod usage_limit;

/// Identity/context an auth check evaluates against.
#[derive(Debug, Clone)]
pub struct CheckContext {
    pub user_id: String,
    pub group_id: Option<String>,
    pub channel_id: Option<String>,
    pub bot_id: String,
    pub plugin_name: String,
    /// Set by the pipeline before step 4; `superuser_only` profiles still
    /// see this as `true` since superuser status, not exemption, is what's
    /// being reported here.
    pub is_superuser: bool,
}

#[async_trait]
pub trait AuthCheck: Send + Sync {
    fn name(&self) -> &str;
    async fn run(&self, ctx: &CheckContext, profile: &PluginAuthProfile) -> Result<(), CheckError>;
}

/// Map from check name to handler, so new checks register without touching
/// the pipeline driver (§9 Design Notes).
#[derive(Default, Clone)]
pub struct CheckRegistry {
    checks: Vec<Arc<dyn AuthCheck>>,
}

impl CheckRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, check: Arc<dyn AuthCheck>) {
        self.checks.push(check);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn AuthCheck>> {
        self.checks.iter()
    }
}

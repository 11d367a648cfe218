//! Per-plugin authorization profile and the process-wide registry of them (§4.4, §6).

use dashmap::DashMap;
use std::time::Duration;
use typed_builder::TypedBuilder;

/// Which identity a plugin's usage limits are keyed against: the sender, or
/// the group/channel they're acting in (`auth_limit.py`'s `LimitWatchType`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LimitScope {
    #[default]
    User,
    Group,
}

/// Declares the limiter/permission configuration a plugin runs under. One
/// instance per registered plugin, set at registration time and otherwise
/// read-only to the pipeline.
#[derive(Debug, Clone, TypedBuilder)]
pub struct PluginAuthProfile {
    pub plugin_name: String,
    #[builder(default, setter(strip_option))]
    pub cooldown: Option<Duration>,
    #[builder(default, setter(strip_option))]
    pub rate_limit: Option<(u32, Duration)>,
    #[builder(default, setter(strip_option))]
    pub daily_count_limit: Option<u32>,
    #[builder(default)]
    pub cost_gold: u32,
    #[builder(default)]
    pub required_admin_level: u32,
    #[builder(default)]
    pub superuser_only: bool,
    #[builder(default = true)]
    pub private_allowed: bool,
    #[builder(default = true)]
    pub group_allowed: bool,
    /// Mirrors the source's `plugin.status`: `false` disables the plugin
    /// everywhere except for superusers.
    #[builder(default = true)]
    pub enabled: bool,
    /// Minimum group level required to run this plugin (`plugin.level`).
    #[builder(default)]
    pub required_group_level: i32,
    /// Whether this plugin acquires the per-user reentrancy lock for the
    /// duration of its run (`PluginLimitType.BLOCK`).
    #[builder(default)]
    pub user_block: bool,
    #[builder(default)]
    pub limit_scope: LimitScope,
}

/// Process-wide map of plugin name to its auth profile. Plugins register
/// themselves at startup; the pipeline looks profiles up by name and treats
/// an absent plugin as a permission exemption — the pipeline continues
/// without running it through the checks or charging it, not an error.
#[derive(Default)]
pub struct PluginRegistry {
    profiles: DashMap<String, PluginAuthProfile>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, profile: PluginAuthProfile) {
        self.profiles.insert(profile.plugin_name.clone(), profile);
    }

    pub fn unregister(&self, plugin_name: &str) {
        self.profiles.remove(plugin_name);
    }

    pub fn lookup(&self, plugin_name: &str) -> Option<PluginAuthProfile> {
        self.profiles.get(plugin_name).map(|entry| entry.clone())
    }
}

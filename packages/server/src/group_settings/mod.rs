//! Per-group plugin-config overrides merged over global defaults (§4.6).

use crate::cache::{Cache, CacheValue};
use crate::common::entity_ids::GroupPluginSettingId;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sqlx::{FromRow, PgPool};
use std::time::Duration;

pub const GROUP_SETTINGS_CACHE_NAMESPACE: &str = "group_plugin_settings";
const CACHE_TTL: Duration = Duration::from_secs(300);

fn cache_key(group_id: &str, plugin_name: &str) -> String {
    format!("{group_id}:{plugin_name}")
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct GroupPluginSettingRow {
    pub id: GroupPluginSettingId,
    pub group_id: String,
    pub plugin_name: String,
    pub settings: Value,
}

/// Global plugin defaults — a pure lookup the platform supplies (typically
/// sourced from the same plugin-registration record limiters read from).
pub trait GlobalDefaults: Send + Sync {
    fn defaults_for(&self, plugin_name: &str) -> Value;
}

pub struct GroupSettingsService {
    pool: PgPool,
    cache: Cache,
    defaults: std::sync::Arc<dyn GlobalDefaults>,
}

#[derive(Debug, thiserror::Error)]
pub enum GroupSettingsError {
    #[error(transparent)]
    Db(#[from] sqlx::Error),
    #[error("settings blob failed schema validation: {0}")]
    Invalid(String),
}

impl GroupSettingsService {
    pub fn new(pool: PgPool, defaults: std::sync::Arc<dyn GlobalDefaults>) -> Self {
        Self {
            pool,
            cache: Cache::memory(CACHE_TTL),
            defaults,
        }
    }

    async fn invalidate(&self, group_id: &str, plugin_name: &str) {
        self.cache
            .delete(GROUP_SETTINGS_CACHE_NAMESPACE, &cache_key(group_id, plugin_name))
            .await;
    }

    async fn find_row(
        &self,
        group_id: &str,
        plugin_name: &str,
    ) -> Result<Option<GroupPluginSettingRow>, sqlx::Error> {
        sqlx::query_as::<_, GroupPluginSettingRow>(
            "SELECT id, group_id, plugin_name, settings FROM group_plugin_settings
             WHERE group_id = $1 AND plugin_name = $2",
        )
        .bind(group_id)
        .bind(plugin_name)
        .fetch_optional(&self.pool)
        .await
    }

    /// Replaces the entire override blob.
    pub async fn set_full_config(
        &self,
        group_id: &str,
        plugin_name: &str,
        settings: Value,
    ) -> Result<(), GroupSettingsError> {
        sqlx::query(
            "INSERT INTO group_plugin_settings (id, group_id, plugin_name, settings)
             VALUES ($1, $2, $3, $4)
             ON CONFLICT (group_id, plugin_name) DO UPDATE SET settings = EXCLUDED.settings",
        )
        .bind(GroupPluginSettingId::new())
        .bind(group_id)
        .bind(plugin_name)
        .bind(settings)
        .execute(&self.pool)
        .await?;
        self.invalidate(group_id, plugin_name).await;
        Ok(())
    }

    /// Read-modify-write a single key in the override blob.
    pub async fn set_key(
        &self,
        group_id: &str,
        plugin_name: &str,
        key: &str,
        value: Value,
    ) -> Result<(), GroupSettingsError> {
        let mut blob = match self.find_row(group_id, plugin_name).await? {
            Some(row) => row.settings.as_object().cloned().unwrap_or_default(),
            None => Map::new(),
        };
        blob.insert(key.to_string(), value);
        self.set_full_config(group_id, plugin_name, Value::Object(blob))
            .await
    }

    /// Removes one key; deletes the row entirely once the blob becomes empty
    /// rather than leaving an empty-object row (carried from the source's
    /// `resetKey`, which does exactly this).
    pub async fn reset_key(
        &self,
        group_id: &str,
        plugin_name: &str,
        key: &str,
    ) -> Result<(), GroupSettingsError> {
        let Some(row) = self.find_row(group_id, plugin_name).await? else {
            return Ok(());
        };
        let mut blob = row.settings.as_object().cloned().unwrap_or_default();
        blob.remove(key);

        if blob.is_empty() {
            sqlx::query("DELETE FROM group_plugin_settings WHERE id = $1")
                .bind(row.id)
                .execute(&self.pool)
                .await?;
        } else {
            sqlx::query("UPDATE group_plugin_settings SET settings = $1 WHERE id = $2")
                .bind(Value::Object(blob))
                .bind(row.id)
                .execute(&self.pool)
                .await?;
        }
        self.invalidate(group_id, plugin_name).await;
        Ok(())
    }

    /// Deletes the override row entirely, restoring global defaults.
    pub async fn reset_all(&self, group_id: &str, plugin_name: &str) -> Result<(), GroupSettingsError> {
        sqlx::query("DELETE FROM group_plugin_settings WHERE group_id = $1 AND plugin_name = $2")
            .bind(group_id)
            .bind(plugin_name)
            .execute(&self.pool)
            .await?;
        self.invalidate(group_id, plugin_name).await;
        Ok(())
    }

    /// effective = global defaults ⊕ per-group overrides (override wins per key).
    pub async fn get_all_for_plugin(
        &self,
        group_id: &str,
        plugin_name: &str,
    ) -> Result<Value, GroupSettingsError> {
        let key = cache_key(group_id, plugin_name);
        if let CacheValue::Found(v) = self.cache.get(GROUP_SETTINGS_CACHE_NAMESPACE, &key).await {
            return Ok(v);
        }

        let mut merged = self
            .defaults
            .defaults_for(plugin_name)
            .as_object()
            .cloned()
            .unwrap_or_default();

        if let Some(row) = self.find_row(group_id, plugin_name).await? {
            if let Some(overrides) = row.settings.as_object() {
                for (k, v) in overrides {
                    merged.insert(k.clone(), v.clone());
                }
            }
        }

        let effective = Value::Object(merged);
        self.cache
            .set(GROUP_SETTINGS_CACHE_NAMESPACE, &key, effective.clone(), None)
            .await;
        Ok(effective)
    }
}

//! Process-wide registry of schedulable plugins (§4.5 Job sources, §9 Dynamic dispatch).
//!
//! A plugin registers its handler function plus a declared parameter schema;
//! the scheduler validates `job_kwargs` against that schema before saving
//! and invokes the handler with `(bot, context, params)` at execution time.

use super::execution::ScheduleContext;
use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

#[async_trait]
pub trait ScheduledPlugin: Send + Sync {
    /// Invoked with the session/target context and validated parameters.
    async fn invoke(&self, bot_id: &str, ctx: &ScheduleContext, params: Value) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Str,
    Int,
    Float,
    Bool,
}

impl FieldType {
    fn matches(self, value: &Value) -> bool {
        match self {
            FieldType::Str => value.is_string(),
            FieldType::Int => value.is_i64() || value.is_u64(),
            FieldType::Float => value.is_number(),
            FieldType::Bool => value.is_boolean(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ParamSchema {
    pub fields: HashMap<String, FieldType>,
}

#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("missing required field: {0}")]
    MissingField(String),
    #[error("field {0} has the wrong type")]
    WrongType(String),
}

impl ParamSchema {
    pub fn field(mut self, name: &str, field_type: FieldType) -> Self {
        self.fields.insert(name.to_string(), field_type);
        self
    }

    pub fn validate(&self, kwargs: &Value) -> Result<(), ValidationError> {
        let object = kwargs.as_object();
        for (name, field_type) in &self.fields {
            let value = object
                .and_then(|o| o.get(name))
                .ok_or_else(|| ValidationError::MissingField(name.clone()))?;
            if !field_type.matches(value) {
                return Err(ValidationError::WrongType(name.clone()));
            }
        }
        Ok(())
    }
}

/// A declarative default, registered at handler load with a typed trigger
/// and optional fan-out defaults (§4.5 Job sources: Declarative).
#[derive(Debug, Clone)]
pub struct DeclarativeDefault {
    pub target_type: super::job::TargetType,
    pub target_identifier: String,
    pub bot_id: Option<String>,
    pub trigger_type: super::job::TriggerType,
    pub trigger_config: Value,
    pub job_kwargs: Value,
}

#[derive(Clone)]
pub struct PluginScheduleRegistration {
    pub plugin_name: String,
    pub handler: Arc<dyn ScheduledPlugin>,
    pub schema: ParamSchema,
    pub default_permission: i32,
    pub default_jitter: Option<f64>,
    pub default_spread: Option<f64>,
    pub default_interval: Option<f64>,
    pub declarative: Vec<DeclarativeDefault>,
}

#[derive(Default)]
pub struct SchedulePluginRegistry {
    entries: DashMap<String, PluginScheduleRegistration>,
}

impl SchedulePluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, registration: PluginScheduleRegistration) {
        self.entries.insert(registration.plugin_name.clone(), registration);
    }

    pub fn unregister(&self, plugin_name: &str) {
        self.entries.remove(plugin_name);
    }

    pub fn lookup(&self, plugin_name: &str) -> Option<PluginScheduleRegistration> {
        self.entries.get(plugin_name).map(|entry| entry.clone())
    }

    pub fn is_registered(&self, plugin_name: &str) -> bool {
        self.entries.contains_key(plugin_name)
    }

    pub fn all(&self) -> Vec<PluginScheduleRegistration> {
        self.entries.iter().map(|entry| entry.value().clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoOpPlugin;

    #[async_trait]
    impl ScheduledPlugin for NoOpPlugin {
        async fn invoke(&self, _bot_id: &str, _ctx: &ScheduleContext, _params: Value) -> anyhow::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn schema_rejects_missing_required_field() {
        let schema = ParamSchema::default().field("text", FieldType::Str);
        let result = schema.validate(&serde_json::json!({}));
        assert!(matches!(result, Err(ValidationError::MissingField(_))));
    }

    #[test]
    fn schema_rejects_wrong_type() {
        let schema = ParamSchema::default().field("text", FieldType::Str);
        let result = schema.validate(&serde_json::json!({"text": 5}));
        assert!(matches!(result, Err(ValidationError::WrongType(_))));
    }

    #[test]
    fn schema_accepts_matching_kwargs() {
        let schema = ParamSchema::default().field("text", FieldType::Str);
        assert!(schema.validate(&serde_json::json!({"text": "hi"})).is_ok());
    }

    #[test]
    fn unknown_plugin_is_unregistered() {
        let registry = SchedulePluginRegistry::new();
        assert!(!registry.is_registered("greet"));
        registry.register(PluginScheduleRegistration {
            plugin_name: "greet".to_string(),
            handler: Arc::new(NoOpPlugin),
            schema: ParamSchema::default(),
            default_permission: 5,
            default_jitter: None,
            default_spread: None,
            default_interval: None,
            declarative: Vec::new(),
        });
        assert!(registry.is_registered("greet"));
    }
}

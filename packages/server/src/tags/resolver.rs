//! Composition, blacklist inversion, `@all`, and the 300s memoized cache
//! that feeds the scheduler's `TAG` / `ALL_GROUPS` target resolution.

use super::expr::{self, Expression};
use super::models::{GroupTag, GroupTagLink, TagType};
use super::rules::{FieldPredicate, RuleOutcome, RuleRegistry};
use crate::cache::{Cache, CacheValue};
use async_trait::async_trait;
use sqlx::PgPool;
use std::collections::BTreeSet;
use std::time::Duration;

pub const TAG_RESOLVER_CACHE_NAMESPACE: &str = "tag_resolver";
pub const TAG_RESOLVER_CACHE_TTL: Duration = Duration::from_secs(300);
pub const ALL_TAG: &str = "@all";

/// Collaborator contract for evaluating field-rule predicates and
/// enumerating known/bot-scoped groups. The resolver has no opinion on the
/// concrete group schema beyond this trait.
#[async_trait]
pub trait GroupStore: Send + Sync {
    async fn all_group_ids(&self) -> BTreeSet<String>;
    async fn bot_group_ids(&self, bot_id: &str) -> BTreeSet<String>;
    async fn query_groups(&self, predicates: &[FieldPredicate]) -> Result<BTreeSet<String>, String>;
}

#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("unknown tag '{0}'")]
    UnknownTag(String),
    #[error("{0}")]
    Malformed(String),
}

pub struct TagResolver {
    pool: PgPool,
    store: std::sync::Arc<dyn GroupStore>,
    registry: RuleRegistry,
    cache: Cache,
}

impl TagResolver {
    pub fn new(pool: PgPool, store: std::sync::Arc<dyn GroupStore>, registry: RuleRegistry) -> Self {
        Self {
            pool,
            store,
            registry,
            cache: Cache::memory(TAG_RESOLVER_CACHE_TTL),
        }
    }

    /// Any write to a tag or its links invalidates the whole resolver cache.
    pub async fn invalidate_all(&self) {
        self.cache.clear(Some(TAG_RESOLVER_CACHE_NAMESPACE)).await;
    }

    pub async fn resolve(
        &self,
        name: &str,
        bot_id: Option<&str>,
    ) -> Result<BTreeSet<String>, ResolveError> {
        let cache_key = format!("{}_{}", name, bot_id.unwrap_or(""));
        if let CacheValue::Found(v) = self.cache.get(TAG_RESOLVER_CACHE_NAMESPACE, &cache_key).await {
            if let Ok(ids) = serde_json::from_value::<Vec<String>>(v) {
                return Ok(ids.into_iter().collect());
            }
        }

        let resolved = self.resolve_uncached(name, bot_id).await?;

        let as_vec: Vec<&String> = resolved.iter().collect();
        self.cache
            .set(
                TAG_RESOLVER_CACHE_NAMESPACE,
                &cache_key,
                serde_json::to_value(as_vec).unwrap_or(serde_json::Value::Null),
                None,
            )
            .await;
        Ok(resolved)
    }

    async fn known_groups(&self, bot_id: Option<&str>) -> BTreeSet<String> {
        match bot_id {
            Some(bot) => self.store.bot_group_ids(bot).await,
            None => self.store.all_group_ids().await,
        }
    }

    async fn resolve_uncached(
        &self,
        name: &str,
        bot_id: Option<&str>,
    ) -> Result<BTreeSet<String>, ResolveError> {
        if name == ALL_TAG {
            return Ok(self.known_groups(bot_id).await);
        }

        let tag = GroupTag::find_by_name(name, bot_id, &self.pool)
            .await
            .map_err(|e| ResolveError::Malformed(e.to_string()))?
            .ok_or_else(|| ResolveError::UnknownTag(name.to_string()))?;

        let computed = match tag.tag_type {
            TagType::Static => {
                let links = GroupTagLink::for_tag(tag.id, &self.pool)
                    .await
                    .map_err(|e| ResolveError::Malformed(e.to_string()))?;
                links.into_iter().map(|l| l.group_id).collect()
            }
            TagType::Dynamic => {
                let rule = tag
                    .dynamic_rule
                    .as_deref()
                    .ok_or_else(|| ResolveError::Malformed("DYNAMIC tag missing rule".to_string()))?;
                let expression = expr::parse(rule).map_err(|e| ResolveError::Malformed(e.0))?;
                self.resolve_expression(&expression, bot_id).await?
            }
        };

        let result = if tag.is_blacklist {
            let known = self.known_groups(bot_id).await;
            known.difference(&computed).cloned().collect()
        } else {
            computed
        };

        Ok(match bot_id {
            Some(bot) => {
                let bots_groups = self.store.bot_group_ids(bot).await;
                result.intersection(&bots_groups).cloned().collect()
            }
            None => result,
        })
    }

    async fn resolve_expression(
        &self,
        expression: &Expression,
        bot_id: Option<&str>,
    ) -> Result<BTreeSet<String>, ResolveError> {
        let mut union = BTreeSet::new();
        for conjunction in &expression.disjunction {
            let part = self.evaluate_conjunction(&conjunction.rules, bot_id).await?;
            union.extend(part);
        }
        Ok(union)
    }

    async fn evaluate_conjunction(
        &self,
        rules: &[expr::AtomicRule],
        bot_id: Option<&str>,
    ) -> Result<BTreeSet<String>, ResolveError> {
        let mut predicates = Vec::new();
        let mut id_sets: Vec<BTreeSet<String>> = Vec::new();
        let mut conjunction_failed = false;

        for rule in rules {
            match self.registry.evaluate(&rule.name, &rule.args, bot_id).await {
                Err(hard_error) => return Err(ResolveError::Malformed(hard_error)),
                Ok(RuleOutcome::Query(predicate)) => predicates.push(predicate),
                Ok(RuleOutcome::IdSet(set)) => id_sets.push(set),
                Ok(RuleOutcome::Error(_)) => conjunction_failed = true,
            }
        }

        if conjunction_failed {
            return Ok(BTreeSet::new());
        }

        let from_query = if predicates.is_empty() {
            None
        } else {
            Some(
                self.store
                    .query_groups(&predicates)
                    .await
                    .map_err(ResolveError::Malformed)?,
            )
        };

        let from_sets = id_sets.into_iter().reduce(|acc, s| acc.intersection(&s).cloned().collect());

        Ok(match (from_query, from_sets) {
            (Some(q), Some(s)) => q.intersection(&s).cloned().collect(),
            (Some(q), None) => q,
            (None, Some(s)) => s,
            (None, None) => BTreeSet::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tags::rules::{FieldOp, FieldValue};

    struct FakeStore {
        all: BTreeSet<String>,
        bot_groups: BTreeSet<String>,
    }

    #[async_trait]
    impl GroupStore for FakeStore {
        async fn all_group_ids(&self) -> BTreeSet<String> {
            self.all.clone()
        }
        async fn bot_group_ids(&self, _bot_id: &str) -> BTreeSet<String> {
            self.bot_groups.clone()
        }
        async fn query_groups(&self, predicates: &[FieldPredicate]) -> Result<BTreeSet<String>, String> {
            // Minimal fake: a "level >= N" predicate resolves from a fixed table.
            let table: Vec<(&str, i64)> = vec![("1", 10), ("2", 5), ("3", 1)];
            let mut result: Option<BTreeSet<String>> = None;
            for p in predicates {
                let matched: BTreeSet<String> = match (&p.op, &p.value) {
                    (FieldOp::Ge, FieldValue::Single(v)) => {
                        let threshold: i64 = v.parse().unwrap_or(0);
                        table
                            .iter()
                            .filter(|(_, lvl)| *lvl >= threshold)
                            .map(|(id, _)| id.to_string())
                            .collect()
                    }
                    _ => table.iter().map(|(id, _)| id.to_string()).collect(),
                };
                result = Some(match result {
                    Some(acc) => acc.intersection(&matched).cloned().collect(),
                    None => matched,
                });
            }
            Ok(result.unwrap_or_default())
        }
    }

    fn ids(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn expression_with_query_rule_resolves_through_store() {
        let mut registry = RuleRegistry::new();
        registry.register_field("level", "admin_level");
        let expression = expr::parse("level >= 5").unwrap();

        let store = std::sync::Arc::new(FakeStore {
            all: ids(&["1", "2", "3"]),
            bot_groups: ids(&["1", "2", "3"]),
        });

        // Build a resolver with a dummy pool-free path by calling resolve_expression directly
        // via a thin wrapper (resolve_expression is private, so exercise it through a fresh
        // TagResolver's method using sqlx's offline test pool is unnecessary here).
        let resolver = TagResolver {
            pool: sqlx::PgPool::connect_lazy("postgres://localhost/nonexistent").unwrap(),
            store: store.clone(),
            registry,
            cache: Cache::memory(Duration::from_secs(300)),
        };

        let result = resolver.resolve_expression(&expression, None).await.unwrap();
        assert_eq!(result, ids(&["1", "2"]));
    }

    #[tokio::test]
    async fn and_intersects_or_unions() {
        let mut registry = RuleRegistry::new();
        registry.register_custom(
            "is_vip",
            std::sync::Arc::new(StaticIdSetRule(ids(&["1", "2"]))),
        );
        registry.register_custom(
            "is_active",
            std::sync::Arc::new(StaticIdSetRule(ids(&["2", "3"]))),
        );

        let store = std::sync::Arc::new(FakeStore {
            all: ids(&["1", "2", "3"]),
            bot_groups: ids(&["1", "2", "3"]),
        });

        let resolver = TagResolver {
            pool: sqlx::PgPool::connect_lazy("postgres://localhost/nonexistent").unwrap(),
            store,
            registry,
            cache: Cache::memory(Duration::from_secs(300)),
        };

        let expression = expr::parse("is_vip and is_active").unwrap();
        let result = resolver.resolve_expression(&expression, None).await.unwrap();
        assert_eq!(result, ids(&["2"]));
    }

    struct StaticIdSetRule(BTreeSet<String>);

    #[async_trait]
    impl super::super::rules::CustomRule for StaticIdSetRule {
        async fn evaluate(&self, _args: &str, _bot_id: Option<&str>) -> RuleOutcome {
            RuleOutcome::IdSet(self.0.clone())
        }
        fn suggested_format(&self) -> String {
            "<no args>".to_string()
        }
    }
}

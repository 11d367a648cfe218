//! Rule registry: field rules and custom rules, each producing exactly one
//! of `Query`, `IdSet`, or `Error` (§4.3).

use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldOp {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
    Contains,
    In,
}

impl FieldOp {
    pub fn parse(token: &str) -> Option<Self> {
        match token {
            "=" => Some(FieldOp::Eq),
            "!=" => Some(FieldOp::Ne),
            ">" => Some(FieldOp::Gt),
            ">=" => Some(FieldOp::Ge),
            "<" => Some(FieldOp::Lt),
            "<=" => Some(FieldOp::Le),
            "contains" => Some(FieldOp::Contains),
            "in" => Some(FieldOp::In),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Single(String),
    List(Vec<String>),
}

/// A predicate expressible as a DB condition. The resolver hands a batch of
/// these to a `GroupStore` for evaluation — this crate does not know the
/// concrete schema `field` refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldPredicate {
    pub field: String,
    pub op: FieldOp,
    pub value: FieldValue,
}

/// Outcome of evaluating one atomic rule.
#[derive(Debug)]
pub enum RuleOutcome {
    Query(FieldPredicate),
    IdSet(BTreeSet<String>),
    Error(String),
}

/// A rule with its own evaluation logic and argument schema (as opposed to
/// a generated field rule).
#[async_trait]
pub trait CustomRule: Send + Sync {
    async fn evaluate(&self, args: &str, bot_id: Option<&str>) -> RuleOutcome;

    /// Human-readable "did you mean" hint built from this rule's argument schema.
    fn suggested_format(&self) -> String;
}

enum Entry {
    Field { field: String },
    Custom(Arc<dyn CustomRule>),
}

/// Named-registry of rule name → handler (§9 Design Notes: dynamic dispatch
/// via a map, not a class hierarchy).
#[derive(Default)]
pub struct RuleRegistry {
    entries: HashMap<String, Entry>,
}

impl RuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a field rule: `<name> <op> <value>` maps onto a DB column `field`.
    pub fn register_field(&mut self, name: &str, field: &str) {
        self.entries.insert(
            name.to_string(),
            Entry::Field {
                field: field.to_string(),
            },
        );
    }

    pub fn register_custom(&mut self, name: &str, rule: Arc<dyn CustomRule>) {
        self.entries.insert(name.to_string(), Entry::Custom(rule));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Evaluates `name args` against the registry. `Err` is reserved for
    /// syntax the registry cannot even parse (unknown name, unsupported
    /// operator for a field rule) — these fail the whole resolution, not
    /// just the enclosing conjunction.
    pub async fn evaluate(
        &self,
        name: &str,
        args: &str,
        bot_id: Option<&str>,
    ) -> Result<RuleOutcome, String> {
        match self.entries.get(name) {
            None => Err(format!("unknown rule '{name}'")),
            Some(Entry::Custom(rule)) => Ok(rule.evaluate(args, bot_id).await),
            Some(Entry::Field { field }) => {
                let mut parts = args.splitn(2, char::is_whitespace);
                let op_tok = parts.next().unwrap_or("").trim();
                let value_tok = parts.next().unwrap_or("").trim();
                let op = FieldOp::parse(op_tok).ok_or_else(|| {
                    format!(
                        "unsupported operator '{op_tok}' for field rule '{name}' \
                         (suggested format: '{name} <op> <value>' with op in =,!=,>,>=,<,<=,contains,in)"
                    )
                })?;
                let value = if op == FieldOp::In {
                    FieldValue::List(
                        value_tok
                            .split(',')
                            .map(|s| s.trim().to_string())
                            .filter(|s| !s.is_empty())
                            .collect(),
                    )
                } else {
                    FieldValue::Single(value_tok.to_string())
                };
                Ok(RuleOutcome::Query(FieldPredicate {
                    field: field.clone(),
                    op,
                    value,
                }))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unknown_rule_name_is_a_hard_error() {
        let registry = RuleRegistry::new();
        let result = registry.evaluate("nope", "= 1", None).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn field_rule_parses_operator_and_value() {
        let mut registry = RuleRegistry::new();
        registry.register_field("level", "admin_level");
        let outcome = registry.evaluate("level", ">= 5", None).await.unwrap();
        match outcome {
            RuleOutcome::Query(p) => {
                assert_eq!(p.field, "admin_level");
                assert_eq!(p.op, FieldOp::Ge);
                assert_eq!(p.value, FieldValue::Single("5".to_string()));
            }
            _ => panic!("expected a Query outcome"),
        }
    }

    #[tokio::test]
    async fn in_operator_splits_comma_list() {
        let mut registry = RuleRegistry::new();
        registry.register_field("status", "status");
        let outcome = registry.evaluate("status", "in a, b, c", None).await.unwrap();
        match outcome {
            RuleOutcome::Query(p) => {
                assert_eq!(
                    p.value,
                    FieldValue::List(vec!["a".to_string(), "b".to_string(), "c".to_string()])
                );
            }
            _ => panic!("expected a Query outcome"),
        }
    }

    #[tokio::test]
    async fn unsupported_operator_is_a_hard_error_with_suggestion() {
        let mut registry = RuleRegistry::new();
        registry.register_field("level", "admin_level");
        let err = registry.evaluate("level", "~~ 5", None).await.unwrap_err();
        assert!(err.contains("suggested format"));
    }
}

//! Tag resolver: expression language compiling to DB predicates or explicit
//! ID sets, with blacklist inversion, feeding scheduler target resolution.

pub mod expr;
pub mod models;
pub mod resolver;
pub mod rules;

pub use models::{GroupTag, GroupTagLink, TagModelError, TagType};
pub use resolver::{GroupStore, ResolveError, TagResolver, ALL_TAG};
pub use rules::{CustomRule, FieldOp, FieldPredicate, FieldValue, RuleOutcome, RuleRegistry};

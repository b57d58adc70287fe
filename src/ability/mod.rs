//! Rule-based ability engine
//!
//! An [`Ability`] answers "can this identity perform `action` on `subject`?"
//! from an ordered list of `can`/`cannot` rules:
//!
//! - the most recently declared matching rule decides,
//! - `manage` matches every action and `all` every subject type,
//! - rules may be restricted to fields and to subject instances matching
//!   MongoDB-style conditions.
//!
//! # Example
//!
//! ```rust
//! use pep_ability::ability::{create_ability_builder, Permissions, Subject};
//! use serde_json::json;
//!
//! let mut builder = create_ability_builder();
//! builder.can("read", "Article");
//! builder.cannot("read", "Article").when(json!({ "private": true }));
//! let ability = builder.build().unwrap();
//!
//! let private = json!({ "private": true });
//! assert!(ability.can("read", "Article".into(), None));
//! assert!(!ability.can("read", Subject::object("Article", &private), None));
//! ```

pub mod builder;
pub mod matcher;
pub mod rule;

pub use builder::{create_ability_builder, AbilityBuilder, RuleBuilder};
pub use matcher::{ConditionsMatcher, MatchConditions, MongoQueryMatcher};
pub use rule::{OneOrMany, RawRule, Rule, ALL, MANAGE};

use serde_json::Value;

use crate::error::Result;

/// What a permission check is about: a subject type or a concrete instance
#[derive(Debug, Clone, Copy)]
pub enum Subject<'a> {
    /// Subject type name, e.g. `"Article"`
    Type(&'a str),
    /// Instance of `kind` with its attributes
    Object { kind: &'a str, attributes: &'a Value },
}

impl<'a> Subject<'a> {
    pub fn object(kind: &'a str, attributes: &'a Value) -> Self {
        Subject::Object { kind, attributes }
    }

    /// Subject type name
    pub fn kind(&self) -> &'a str {
        match self {
            Subject::Type(kind) => *kind,
            Subject::Object { kind, .. } => *kind,
        }
    }
}

impl<'a> From<&'a str> for Subject<'a> {
    fn from(kind: &'a str) -> Self {
        Subject::Type(kind)
    }
}

/// Capability interface of a per-request ability
///
/// Guards only depend on this trait, so the engine behind it can be swapped.
pub trait Permissions: Send + Sync {
    /// Whether `action` is allowed on `subject` (optionally on one `field`)
    fn can(&self, action: &str, subject: Subject<'_>, field: Option<&str>) -> bool;

    /// Negation of [`Permissions::can`]
    fn cannot(&self, action: &str, subject: Subject<'_>, field: Option<&str>) -> bool {
        !self.can(action, subject, field)
    }
}

/// Immutable set of compiled rules
#[derive(Debug, Clone, Default)]
pub struct Ability {
    rules: Vec<Rule>,
}

impl Ability {
    /// Compile `rules` with an optional conditions matcher
    pub fn new(rules: Vec<RawRule>, matcher: Option<&dyn ConditionsMatcher>) -> Result<Self> {
        let rules = rules
            .into_iter()
            .map(|raw| Rule::compile(raw, matcher))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { rules })
    }

    /// Ability from already compiled rules, in declaration order
    pub fn from_rules(rules: Vec<Rule>) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Rules for an action and subject type, most recent first
    pub fn rules_for(&self, action: &str, subject_type: &str) -> Vec<&Rule> {
        self.rules
            .iter()
            .rev()
            .filter(|rule| rule.matches_action(action) && rule.matches_subject_type(subject_type))
            .collect()
    }

    /// The rule deciding a check, if any rule applies
    pub fn relevant_rule_for(
        &self,
        action: &str,
        subject: Subject<'_>,
        field: Option<&str>,
    ) -> Option<&Rule> {
        self.rules.iter().rev().find(|rule| {
            rule.matches_action(action)
                && rule.matches_subject_type(subject.kind())
                && rule.matches_conditions(&subject)
                && rule.matches_field(field)
        })
    }
}

impl Permissions for Ability {
    fn can(&self, action: &str, subject: Subject<'_>, field: Option<&str>) -> bool {
        let allowed = self
            .relevant_rule_for(action, subject, field)
            .is_some_and(|rule| !rule.inverted());
        tracing::trace!(action, subject = subject.kind(), ?field, allowed, "ability check");
        allowed
    }
}

//! Fluent rule builder

use std::sync::Arc;

use serde_json::Value;

use super::matcher::{ConditionsMatcher, MongoQueryMatcher};
use super::rule::{OneOrMany, RawRule};
use super::Ability;
use crate::error::Result;

/// Collects `can`/`cannot` rules and builds an [`Ability`]
#[derive(Clone, Default)]
pub struct AbilityBuilder {
    rules: Vec<RawRule>,
    matcher: Option<Arc<dyn ConditionsMatcher>>,
}

/// Builder bound to the MongoDB-style conditions matcher
///
/// `build()` on the returned builder always uses [`MongoQueryMatcher`], so
/// callers never configure it themselves.
pub fn create_ability_builder() -> AbilityBuilder {
    AbilityBuilder::new().with_conditions_matcher(MongoQueryMatcher)
}

impl AbilityBuilder {
    /// Builder without a conditions matcher; rules with conditions fail to build
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_conditions_matcher(mut self, matcher: impl ConditionsMatcher + 'static) -> Self {
        self.matcher = Some(Arc::new(matcher));
        self
    }

    /// Grant `action` on `subject`
    pub fn can(
        &mut self,
        action: impl Into<OneOrMany>,
        subject: impl Into<OneOrMany>,
    ) -> RuleBuilder<'_> {
        self.push(RawRule::can(action, subject))
    }

    /// Revoke `action` on `subject`
    pub fn cannot(
        &mut self,
        action: impl Into<OneOrMany>,
        subject: impl Into<OneOrMany>,
    ) -> RuleBuilder<'_> {
        self.push(RawRule::cannot(action, subject))
    }

    /// Append a declared rule as-is
    pub fn push(&mut self, rule: RawRule) -> RuleBuilder<'_> {
        self.rules.push(rule);
        let last = self.rules.len() - 1;
        RuleBuilder {
            rule: &mut self.rules[last],
        }
    }

    pub fn rules(&self) -> &[RawRule] {
        &self.rules
    }

    /// Finalize with the configured matcher
    pub fn build(self) -> Result<Ability> {
        Ability::new(self.rules, self.matcher.as_deref())
    }

    /// Finalize with an explicit matcher
    pub fn build_with(self, matcher: &dyn ConditionsMatcher) -> Result<Ability> {
        Ability::new(self.rules, Some(matcher))
    }
}

impl std::fmt::Debug for AbilityBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AbilityBuilder")
            .field("rules", &self.rules)
            .field("has_matcher", &self.matcher.is_some())
            .finish()
    }
}

/// Refines the rule just added to an [`AbilityBuilder`]
#[derive(Debug)]
pub struct RuleBuilder<'a> {
    rule: &'a mut RawRule,
}

impl RuleBuilder<'_> {
    /// Restrict the rule to subject instances matching `conditions`
    pub fn when(self, conditions: Value) -> Self {
        self.rule.conditions = Some(conditions);
        self
    }

    /// Restrict the rule to fields
    pub fn fields(self, fields: impl Into<OneOrMany>) -> Self {
        self.rule.fields = Some(fields.into());
        self
    }

    /// Explain why the rule denies
    pub fn because(self, reason: impl Into<String>) -> Self {
        self.rule.reason = Some(reason.into());
        self
    }
}

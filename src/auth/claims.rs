use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ability::{create_ability_builder, Ability, MongoQueryMatcher, RawRule, Rule};
use crate::error::Result;

/// Roles carried by identity claims
///
/// Accepts `{"roles": [...]}` as well as a bare array of role names.
pub fn roles(claims: &Value) -> Vec<String> {
    let list = match claims {
        Value::Array(list) => Some(list),
        Value::Object(object) => object.get("roles").and_then(Value::as_array),
        _ => None,
    };

    list.map(|roles| {
        roles
            .iter()
            .filter_map(|r| r.as_str().map(str::to_string))
            .collect()
    })
    .unwrap_or_default()
}

/// Check if claims contain a specific role
pub fn has_role(claims: &Value, role: &str) -> bool {
    roles(claims).iter().any(|r| r == role)
}

/// Rules granted to one role
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleRules {
    pub role: String,
    #[serde(default)]
    pub rules: Vec<RawRule>,
}

#[derive(Debug, Clone)]
struct CompiledRole {
    role: String,
    rules: Vec<Rule>,
}

/// Ability resolver granting the rules of every role found in the claims
///
/// Roles are applied in the order they were declared, so declare them from
/// least to most privileged.
#[derive(Debug, Clone, Default)]
pub struct RoleAbilities {
    roles: Vec<CompiledRole>,
}

impl RoleAbilities {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compile role rule sets; invalid conditions fail here, not per request
    pub fn from_roles(roles: impl IntoIterator<Item = RoleRules>) -> Result<Self> {
        roles
            .into_iter()
            .try_fold(Self::new(), |acc, role| acc.with_role(role.role, role.rules))
    }

    /// Add the rules of `role`
    pub fn with_role(mut self, role: impl Into<String>, rules: Vec<RawRule>) -> Result<Self> {
        let rules = rules
            .into_iter()
            .map(|raw| Rule::compile(raw, Some(&MongoQueryMatcher)))
            .collect::<Result<Vec<_>>>()?;
        self.roles.push(CompiledRole {
            role: role.into(),
            rules,
        });
        Ok(self)
    }

    pub fn role_names(&self) -> impl Iterator<Item = &str> {
        self.roles.iter().map(|r| r.role.as_str())
    }

    /// Ability for the roles listed in `claims`
    pub fn define_for(&self, claims: &Value) -> Ability {
        let granted = roles(claims);
        let rules = self
            .roles
            .iter()
            .filter(|compiled| granted.contains(&compiled.role))
            .flat_map(|compiled| compiled.rules.iter().cloned())
            .collect::<Vec<_>>();

        tracing::debug!(roles = ?granted, rules = rules.len(), "defined ability from roles");
        Ability::from_rules(rules)
    }

    /// Ability built on top of the factory builder, for callers adding rules
    /// of their own before building
    pub fn builder_for(&self, claims: &Value) -> crate::ability::AbilityBuilder {
        let granted = roles(claims);
        let mut builder = create_ability_builder();
        for compiled in self.roles.iter().filter(|c| granted.contains(&c.role)) {
            for rule in &compiled.rules {
                builder.push(rule.raw().clone());
            }
        }
        builder
    }
}

impl crate::auth::DefineAbility for RoleAbilities {
    type Ability = Ability;
    type Error = crate::error::AccessError;
    type Future = futures_util::future::Ready<Result<Ability>>;

    fn define_ability(&self, claims: Value) -> Self::Future {
        futures_util::future::ready(Ok(self.define_for(&claims)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ability::{Permissions, Subject, ALL, MANAGE};
    use serde_json::json;

    fn article_roles() -> RoleAbilities {
        let mut private = RawRule::cannot("read", "Article");
        private.conditions = Some(json!({"private": true}));

        RoleAbilities::new()
            .with_role("reader", vec![RawRule::can("read", "Article"), private])
            .unwrap()
            .with_role("admin", vec![RawRule::can(MANAGE, ALL)])
            .unwrap()
    }

    #[test]
    fn test_roles_from_object_claims() {
        let claims = json!({"sub": "u1", "roles": ["admin", "user"]});
        assert_eq!(roles(&claims), vec!["admin", "user"]);
        assert!(has_role(&claims, "admin"));
        assert!(!has_role(&claims, "superadmin"));
    }

    #[test]
    fn test_roles_from_array_claims() {
        assert_eq!(roles(&json!(["reader"])), vec!["reader"]);
        assert!(roles(&json!([])).is_empty());
    }

    #[test]
    fn test_roles_ignores_non_string_entries() {
        assert_eq!(roles(&json!({"roles": ["admin", 7, null]})), vec!["admin"]);
        assert!(roles(&json!({"roles": "admin"})).is_empty());
        assert!(roles(&json!("admin")).is_empty());
    }

    #[test]
    fn test_reader_ability() {
        let ability = article_roles().define_for(&json!({"roles": ["reader"]}));
        let private = json!({"private": true});
        let public = json!({"private": false});

        assert!(ability.can("read", "Article".into(), None));
        assert!(!ability.can("create", "Article".into(), None));
        assert!(ability.can("read", Subject::object("Article", &public), None));
        assert!(!ability.can("read", Subject::object("Article", &private), None));
    }

    #[test]
    fn test_admin_overrides_reader_restrictions() {
        let ability = article_roles().define_for(&json!(["reader", "admin"]));
        let private = json!({"private": true});
        assert!(ability.can("read", Subject::object("Article", &private), None));
        assert!(ability.can("delete", "Comment".into(), None));
    }

    #[test]
    fn test_unknown_roles_get_nothing() {
        let ability = article_roles().define_for(&json!({"roles": ["guest"]}));
        assert!(ability.is_empty());
    }

    #[test]
    fn test_invalid_role_rules_fail_early() {
        let mut bad = RawRule::can("read", "Article");
        bad.conditions = Some(json!({"views": {"$near": 1}}));
        let err = RoleAbilities::from_roles([RoleRules {
            role: "reader".to_string(),
            rules: vec![bad],
        }])
        .unwrap_err();
        assert!(err.to_string().contains("$near"));
    }

    #[test]
    fn test_builder_for_allows_extra_rules() {
        let mut builder = article_roles().builder_for(&json!({"roles": ["reader"]}));
        builder.can("create", "Comment");
        let ability = builder.build().unwrap();
        assert!(ability.can("create", "Comment".into(), None));
        assert!(ability.can("read", "Article".into(), None));
    }

    #[test]
    fn test_role_names_keep_declaration_order() {
        let names: Vec<_> = article_roles().role_names().map(String::from).collect();
        assert_eq!(names, vec!["reader", "admin"]);
    }
}

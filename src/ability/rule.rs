//! Rule declarations and their compiled form

use std::fmt;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::matcher::{ConditionsMatcher, MatchConditions};
use super::Subject;
use crate::error::{AccessError, Result};

/// Action alias matching every action
pub const MANAGE: &str = "manage";

/// Subject alias matching every subject type
pub const ALL: &str = "all";

/// A single string or a list of strings, as accepted in rule declarations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    pub fn to_vec(&self) -> Vec<String> {
        match self {
            OneOrMany::One(value) => vec![value.clone()],
            OneOrMany::Many(values) => values.clone(),
        }
    }

    fn is_blank(&self) -> bool {
        match self {
            OneOrMany::One(value) => value.is_empty(),
            OneOrMany::Many(values) => values.iter().all(String::is_empty),
        }
    }
}

impl From<&str> for OneOrMany {
    fn from(value: &str) -> Self {
        OneOrMany::One(value.to_string())
    }
}

impl From<String> for OneOrMany {
    fn from(value: String) -> Self {
        OneOrMany::One(value)
    }
}

impl<const N: usize> From<[&str; N]> for OneOrMany {
    fn from(values: [&str; N]) -> Self {
        OneOrMany::Many(values.iter().map(|v| v.to_string()).collect())
    }
}

impl From<Vec<String>> for OneOrMany {
    fn from(values: Vec<String>) -> Self {
        OneOrMany::Many(values)
    }
}

/// Declarative ability rule, as written in code or configuration
///
/// ```toml
/// action = "read"
/// subject = "Article"
/// inverted = true
/// conditions = { private = true }
/// reason = "private articles are hidden"
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRule {
    /// Action or actions granted (or revoked)
    pub action: OneOrMany,
    /// Subject type or types the rule applies to
    pub subject: OneOrMany,
    /// Restrict the rule to these fields (glob patterns allowed)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fields: Option<OneOrMany>,
    /// MongoDB-style conditions on subject attributes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conditions: Option<Value>,
    /// `cannot` rule when true
    #[serde(default)]
    pub inverted: bool,
    /// Human readable explanation for a denial
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl RawRule {
    /// Rule granting `action` on `subject`
    pub fn can(action: impl Into<OneOrMany>, subject: impl Into<OneOrMany>) -> Self {
        Self {
            action: action.into(),
            subject: subject.into(),
            fields: None,
            conditions: None,
            inverted: false,
            reason: None,
        }
    }

    /// Rule revoking `action` on `subject`
    pub fn cannot(action: impl Into<OneOrMany>, subject: impl Into<OneOrMany>) -> Self {
        Self {
            inverted: true,
            ..Self::can(action, subject)
        }
    }
}

/// Compiled rule held by an [`Ability`](super::Ability)
#[derive(Clone)]
pub struct Rule {
    raw: RawRule,
    actions: Vec<String>,
    subjects: Vec<String>,
    fields: Option<Vec<Regex>>,
    conditions: Option<MatchConditions>,
}

impl Rule {
    /// Compile a raw rule. Conditions require a matcher.
    pub fn compile(raw: RawRule, matcher: Option<&dyn ConditionsMatcher>) -> Result<Self> {
        if raw.action.is_blank() {
            return Err(AccessError::Config("rule has no action".to_string()));
        }
        if raw.subject.is_blank() {
            return Err(AccessError::Config("rule has no subject".to_string()));
        }

        let conditions = match (&raw.conditions, matcher) {
            (None, _) => None,
            (Some(conditions), Some(matcher)) => Some(matcher.compile(conditions)?),
            (Some(_), None) => {
                return Err(AccessError::Config(
                    "rule has conditions but the ability has no conditions matcher".to_string(),
                ))
            }
        };

        let fields = raw
            .fields
            .as_ref()
            .map(|fields| {
                fields
                    .to_vec()
                    .iter()
                    .map(|f| field_pattern(f))
                    .collect::<Result<Vec<_>>>()
            })
            .transpose()?;

        Ok(Self {
            actions: raw.action.to_vec(),
            subjects: raw.subject.to_vec(),
            fields,
            conditions,
            raw,
        })
    }

    pub fn raw(&self) -> &RawRule {
        &self.raw
    }

    pub fn inverted(&self) -> bool {
        self.raw.inverted
    }

    pub fn reason(&self) -> Option<&str> {
        self.raw.reason.as_deref()
    }

    pub fn has_conditions(&self) -> bool {
        self.conditions.is_some()
    }

    pub fn matches_action(&self, action: &str) -> bool {
        self.actions.iter().any(|a| a == action || a == MANAGE)
    }

    pub fn matches_subject_type(&self, subject_type: &str) -> bool {
        self.subjects.iter().any(|s| s == subject_type || s == ALL)
    }

    /// A subject type (no instance) satisfies conditions of a granting rule
    /// but never those of a revoking one.
    pub fn matches_conditions(&self, subject: &Subject<'_>) -> bool {
        let Some(conditions) = &self.conditions else {
            return true;
        };
        match subject {
            Subject::Type(_) => !self.inverted(),
            Subject::Object { attributes, .. } => conditions(*attributes),
        }
    }

    pub fn matches_field(&self, field: Option<&str>) -> bool {
        let Some(patterns) = &self.fields else {
            return true;
        };
        match field {
            None => !self.inverted(),
            Some(field) => patterns.iter().any(|p| p.is_match(field)),
        }
    }
}

impl fmt::Debug for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rule").field("raw", &self.raw).finish()
    }
}

/// `*` matches within one path segment, `**` across segments. A trailing
/// `.*` also matches the parent field itself.
fn field_pattern(pattern: &str) -> Result<Regex> {
    let mut regex = String::from("^");
    let (body, parent_too) = match pattern.strip_suffix(".*") {
        Some(parent) if !parent.contains('*') => (parent, true),
        _ => (pattern, false),
    };

    let mut chars = body.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '*' {
            if chars.peek() == Some(&'*') {
                chars.next();
                regex.push_str(".*");
            } else {
                regex.push_str("[^.]*");
            }
        } else {
            regex.push_str(&regex::escape(&c.to_string()));
        }
    }
    if parent_too {
        regex.push_str(r"(\.[^.]+)?");
    }
    regex.push('$');

    Regex::new(&regex)
        .map_err(|e| AccessError::Config(format!("invalid field pattern {}: {}", pattern, e)))
}

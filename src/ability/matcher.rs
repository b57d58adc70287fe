//! Conditions matching for ability rules
//!
//! Rule conditions are JSON objects written in a MongoDB-like query language:
//!
//! ```json
//! { "private": true, "author.id": { "$in": ["u1", "u2"] }, "$or": [{ "draft": false }] }
//! ```
//!
//! A [`ConditionsMatcher`] turns such an object into a predicate over subject
//! attributes once, when an ability is built.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use regex::Regex;
use serde_json::{Map, Value};

use crate::error::{AccessError, Result};

/// Compiled conditions of a single rule
pub type MatchConditions = Arc<dyn Fn(&Value) -> bool + Send + Sync>;

/// Strategy compiling rule conditions into predicates
pub trait ConditionsMatcher: Send + Sync {
    /// Compile the conditions object of a rule
    fn compile(&self, conditions: &Value) -> Result<MatchConditions>;
}

/// MongoDB-style query matcher
///
/// Supported operators: `$eq`, `$ne`, `$in`, `$nin`, `$gt`, `$gte`, `$lt`,
/// `$lte`, `$exists`, `$regex`, `$size`, `$all`, `$elemMatch`, `$not`, and
/// the logical `$and`, `$or`, `$nor`.
#[derive(Debug, Clone, Copy, Default)]
pub struct MongoQueryMatcher;

impl ConditionsMatcher for MongoQueryMatcher {
    fn compile(&self, conditions: &Value) -> Result<MatchConditions> {
        let query = Query::parse(conditions)?;
        Ok(Arc::new(move |object: &Value| query.matches(object)))
    }
}

#[derive(Debug)]
enum Query {
    And(Vec<Query>),
    Or(Vec<Query>),
    Nor(Vec<Query>),
    Field { path: Vec<String>, ops: Vec<FieldOp> },
}

#[derive(Debug)]
enum FieldOp {
    Eq(Value),
    Ne(Value),
    In(Vec<Value>),
    Nin(Vec<Value>),
    Cmp(Ordering, bool, Value),
    Exists(bool),
    Regex(Regex),
    Size(usize),
    All(Vec<Value>),
    ElemMatch(Box<ElemQuery>),
    Not(Vec<FieldOp>),
}

#[derive(Debug)]
enum ElemQuery {
    Ops(Vec<FieldOp>),
    Query(Query),
}

fn invalid(message: impl fmt::Display) -> AccessError {
    AccessError::Config(format!("invalid conditions: {}", message))
}

impl Query {
    fn parse(value: &Value) -> Result<Self> {
        let object = value
            .as_object()
            .ok_or_else(|| invalid("conditions must be an object"))?;
        Self::parse_object(object)
    }

    fn parse_object(object: &Map<String, Value>) -> Result<Self> {
        let mut parts = Vec::with_capacity(object.len());
        for (key, value) in object {
            let part = match key.as_str() {
                "$and" => Query::And(Self::parse_list(key, value)?),
                "$or" => Query::Or(Self::parse_list(key, value)?),
                "$nor" => Query::Nor(Self::parse_list(key, value)?),
                op if op.starts_with('$') => {
                    return Err(invalid(format!("unsupported top-level operator {}", op)))
                }
                field => Query::Field {
                    path: field.split('.').map(str::to_string).collect(),
                    ops: parse_field_ops(value)?,
                },
            };
            parts.push(part);
        }

        Ok(match parts.len() {
            1 => parts.remove(0),
            _ => Query::And(parts),
        })
    }

    fn parse_list(operator: &str, value: &Value) -> Result<Vec<Query>> {
        let items = value
            .as_array()
            .filter(|items| !items.is_empty())
            .ok_or_else(|| invalid(format!("{} expects a non-empty array", operator)))?;
        items.iter().map(Self::parse).collect()
    }

    fn matches(&self, object: &Value) -> bool {
        match self {
            Query::And(parts) => parts.iter().all(|q| q.matches(object)),
            Query::Or(parts) => parts.iter().any(|q| q.matches(object)),
            Query::Nor(parts) => !parts.iter().any(|q| q.matches(object)),
            Query::Field { path, ops } => {
                let mut found = Vec::new();
                lookup(object, path, &mut found);
                ops.iter().all(|op| op.matches(&found))
            }
        }
    }
}

/// An object with at least one `$` key is an operator expression; anything
/// else is an equality match against the literal value.
fn is_operator_object(value: &Value) -> bool {
    value
        .as_object()
        .is_some_and(|object| object.keys().any(|key| key.starts_with('$')))
}

fn parse_field_ops(value: &Value) -> Result<Vec<FieldOp>> {
    let Some(object) = value.as_object().filter(|_| is_operator_object(value)) else {
        return Ok(vec![FieldOp::Eq(value.clone())]);
    };

    if object.contains_key("$options") && !object.contains_key("$regex") {
        return Err(invalid("$options used without $regex"));
    }
    let options = object.get("$options").and_then(Value::as_str).unwrap_or("");
    let mut ops = Vec::with_capacity(object.len());
    for (key, operand) in object {
        let op = match key.as_str() {
            "$eq" => FieldOp::Eq(operand.clone()),
            "$ne" => FieldOp::Ne(operand.clone()),
            "$in" => FieldOp::In(array_operand(key, operand)?),
            "$nin" => FieldOp::Nin(array_operand(key, operand)?),
            "$gt" => FieldOp::Cmp(Ordering::Greater, false, operand.clone()),
            "$gte" => FieldOp::Cmp(Ordering::Greater, true, operand.clone()),
            "$lt" => FieldOp::Cmp(Ordering::Less, false, operand.clone()),
            "$lte" => FieldOp::Cmp(Ordering::Less, true, operand.clone()),
            "$exists" => FieldOp::Exists(
                operand
                    .as_bool()
                    .ok_or_else(|| invalid("$exists expects a boolean"))?,
            ),
            "$regex" => FieldOp::Regex(compile_regex(operand, options)?),
            "$options" => continue,
            "$size" => FieldOp::Size(
                operand
                    .as_u64()
                    .ok_or_else(|| invalid("$size expects a non-negative integer"))?
                    as usize,
            ),
            "$all" => FieldOp::All(array_operand(key, operand)?),
            "$elemMatch" => FieldOp::ElemMatch(Box::new(parse_elem_match(operand)?)),
            "$not" => {
                if !is_operator_object(operand) {
                    return Err(invalid("$not expects an operator expression"));
                }
                FieldOp::Not(parse_field_ops(operand)?)
            }
            other => return Err(invalid(format!("unsupported operator {}", other))),
        };
        ops.push(op);
    }
    Ok(ops)
}

fn parse_elem_match(operand: &Value) -> Result<ElemQuery> {
    if !operand.is_object() {
        return Err(invalid("$elemMatch expects an object"));
    }
    let logical = operand
        .as_object()
        .is_some_and(|o| o.keys().any(|k| matches!(k.as_str(), "$and" | "$or" | "$nor")));
    if is_operator_object(operand) && !logical {
        Ok(ElemQuery::Ops(parse_field_ops(operand)?))
    } else {
        Ok(ElemQuery::Query(Query::parse(operand)?))
    }
}

fn array_operand(operator: &str, operand: &Value) -> Result<Vec<Value>> {
    operand
        .as_array()
        .cloned()
        .ok_or_else(|| invalid(format!("{} expects an array", operator)))
}

fn compile_regex(operand: &Value, options: &str) -> Result<Regex> {
    let pattern = operand
        .as_str()
        .ok_or_else(|| invalid("$regex expects a string"))?;
    let flags: String = options
        .chars()
        .filter(|c| matches!(c, 'i' | 'm' | 's' | 'x'))
        .collect();
    let pattern = if flags.is_empty() {
        pattern.to_string()
    } else {
        format!("(?{}){}", flags, pattern)
    };
    Regex::new(&pattern).map_err(|e| invalid(format!("bad $regex: {}", e)))
}

/// Collect every value reachable through `path`, walking into arrays the way
/// MongoDB does: a non-numeric segment applied to an array fans out over its
/// elements.
fn lookup<'a>(value: &'a Value, path: &[String], found: &mut Vec<&'a Value>) {
    let Some((segment, rest)) = path.split_first() else {
        found.push(value);
        return;
    };

    match value {
        Value::Object(object) => {
            if let Some(next) = object.get(segment) {
                lookup(next, rest, found);
            }
        }
        Value::Array(items) => {
            if let Ok(index) = segment.parse::<usize>() {
                if let Some(next) = items.get(index) {
                    lookup(next, rest, found);
                }
            } else {
                for item in items {
                    if item.is_object() {
                        lookup(item, path, found);
                    }
                }
            }
        }
        _ => {}
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(a, b)| values_equal(a, b))
        }
        _ => a == b,
    }
}

fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

/// A found value or, for arrays, any of its elements
fn any_scalar(found: &[&Value], mut predicate: impl FnMut(&Value) -> bool) -> bool {
    found.iter().any(|value| match value {
        Value::Array(items) => predicate(value) || items.iter().any(&mut predicate),
        other => predicate(other),
    })
}

fn matches_eq(found: &[&Value], expected: &Value) -> bool {
    if found.is_empty() {
        return expected.is_null();
    }
    any_scalar(found, |value| values_equal(value, expected))
}

impl FieldOp {
    fn matches(&self, found: &[&Value]) -> bool {
        match self {
            FieldOp::Eq(expected) => matches_eq(found, expected),
            FieldOp::Ne(expected) => !matches_eq(found, expected),
            FieldOp::In(candidates) => candidates.iter().any(|c| matches_eq(found, c)),
            FieldOp::Nin(candidates) => !candidates.iter().any(|c| matches_eq(found, c)),
            FieldOp::Cmp(wanted, inclusive, operand) => any_scalar(found, |value| {
                match compare(value, operand) {
                    Some(Ordering::Equal) => *inclusive,
                    Some(ordering) => ordering == *wanted,
                    None => false,
                }
            }),
            FieldOp::Exists(expected) => !found.is_empty() == *expected,
            FieldOp::Regex(regex) => any_scalar(found, |value| {
                value.as_str().is_some_and(|s| regex.is_match(s))
            }),
            FieldOp::Size(size) => found
                .iter()
                .any(|value| value.as_array().is_some_and(|items| items.len() == *size)),
            FieldOp::All(required) => found.iter().any(|value| {
                value.as_array().is_some_and(|items| {
                    required
                        .iter()
                        .all(|r| items.iter().any(|item| values_equal(item, r)))
                })
            }),
            FieldOp::ElemMatch(query) => found.iter().any(|value| {
                value.as_array().is_some_and(|items| {
                    items.iter().any(|item| match query.as_ref() {
                        ElemQuery::Ops(ops) => ops.iter().all(|op| op.matches(&[item])),
                        ElemQuery::Query(query) => query.matches(item),
                    })
                })
            }),
            FieldOp::Not(ops) => !ops.iter().all(|op| op.matches(found)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn check(conditions: Value, object: Value) -> bool {
        let predicate = MongoQueryMatcher.compile(&conditions).unwrap();
        predicate(&object)
    }

    #[test]
    fn test_plain_equality() {
        assert!(check(json!({"private": true}), json!({"private": true})));
        assert!(!check(json!({"private": true}), json!({"private": false})));
        assert!(!check(json!({"private": true}), json!({})));
    }

    #[test]
    fn test_equality_against_array_field() {
        let article = json!({"tags": ["rust", "web"]});
        assert!(check(json!({"tags": "rust"}), article.clone()));
        assert!(check(json!({"tags": ["rust", "web"]}), article.clone()));
        assert!(!check(json!({"tags": "go"}), article));
    }

    #[test]
    fn test_numbers_compare_across_representations() {
        assert!(check(json!({"version": 1}), json!({"version": 1.0})));
        assert!(check(json!({"score": {"$gte": 10}}), json!({"score": 10.0})));
    }

    #[test]
    fn test_dotted_paths() {
        let article = json!({"author": {"id": "u1", "name": "Ann"}});
        assert!(check(json!({"author.id": "u1"}), article.clone()));
        assert!(!check(json!({"author.id": "u2"}), article.clone()));
        assert!(!check(json!({"author.missing.deeper": 1}), article));
    }

    #[test]
    fn test_path_walks_into_arrays() {
        let doc = json!({"comments": [{"by": "ann"}, {"by": "bob"}]});
        assert!(check(json!({"comments.by": "bob"}), doc.clone()));
        assert!(check(json!({"comments.0.by": "ann"}), doc.clone()));
        assert!(!check(json!({"comments.1.by": "ann"}), doc));
    }

    #[test]
    fn test_ne_and_missing_fields() {
        assert!(check(json!({"status": {"$ne": "archived"}}), json!({"status": "draft"})));
        assert!(check(json!({"status": {"$ne": "archived"}}), json!({})));
        assert!(!check(json!({"status": {"$ne": "archived"}}), json!({"status": "archived"})));
        assert!(check(json!({"deleted": null}), json!({})));
    }

    #[test]
    fn test_in_and_nin() {
        let cond = json!({"status": {"$in": ["draft", "review"]}});
        assert!(check(cond.clone(), json!({"status": "review"})));
        assert!(!check(cond, json!({"status": "published"})));

        let cond = json!({"status": {"$nin": ["archived"]}});
        assert!(check(cond.clone(), json!({"status": "draft"})));
        assert!(!check(cond, json!({"status": "archived"})));
    }

    #[test]
    fn test_range_operators() {
        let cond = json!({"age": {"$gt": 18, "$lte": 65}});
        assert!(check(cond.clone(), json!({"age": 30})));
        assert!(check(cond.clone(), json!({"age": 65})));
        assert!(!check(cond.clone(), json!({"age": 18})));
        assert!(!check(cond.clone(), json!({"age": "30"})));
        assert!(!check(cond, json!({})));
        assert!(check(json!({"name": {"$lt": "m"}}), json!({"name": "alice"})));
    }

    #[test]
    fn test_exists() {
        assert!(check(json!({"owner": {"$exists": true}}), json!({"owner": null})));
        assert!(!check(json!({"owner": {"$exists": true}}), json!({})));
        assert!(check(json!({"owner": {"$exists": false}}), json!({})));
    }

    #[test]
    fn test_regex_with_options() {
        let cond = json!({"title": {"$regex": "^draft", "$options": "i"}});
        assert!(check(cond.clone(), json!({"title": "DRAFT: notes"})));
        assert!(!check(cond, json!({"title": "final"})));
    }

    #[test]
    fn test_options_require_regex() {
        for cond in [
            json!({"title": {"$options": "i"}}),
            json!({"title": {"$eq": "x", "$options": "i"}}),
        ] {
            let err = MongoQueryMatcher.compile(&cond).err().unwrap();
            assert!(err.to_string().contains("$options used without $regex"));
        }
    }

    #[test]
    fn test_array_operators() {
        let doc = json!({"tags": ["a", "b", "c"], "scores": [3, 8, 12]});
        assert!(check(json!({"tags": {"$size": 3}}), doc.clone()));
        assert!(!check(json!({"tags": {"$size": 2}}), doc.clone()));
        assert!(check(json!({"tags": {"$all": ["a", "c"]}}), doc.clone()));
        assert!(!check(json!({"tags": {"$all": ["a", "z"]}}), doc.clone()));
        assert!(check(json!({"scores": {"$elemMatch": {"$gt": 10, "$lt": 13}}}), doc.clone()));
        assert!(!check(json!({"scores": {"$elemMatch": {"$gt": 12}}}), doc));
    }

    #[test]
    fn test_elem_match_on_documents() {
        let doc = json!({"members": [{"id": "u1", "role": "viewer"}, {"id": "u2", "role": "editor"}]});
        assert!(check(
            json!({"members": {"$elemMatch": {"id": "u2", "role": "editor"}}}),
            doc.clone()
        ));
        assert!(!check(
            json!({"members": {"$elemMatch": {"id": "u1", "role": "editor"}}}),
            doc
        ));
    }

    #[test]
    fn test_logical_operators() {
        let cond = json!({"$or": [{"private": false}, {"author": "u1"}]});
        assert!(check(cond.clone(), json!({"private": true, "author": "u1"})));
        assert!(check(cond.clone(), json!({"private": false, "author": "u2"})));
        assert!(!check(cond, json!({"private": true, "author": "u2"})));

        let cond = json!({"$nor": [{"locked": true}]});
        assert!(check(cond.clone(), json!({"locked": false})));
        assert!(!check(cond, json!({"locked": true})));

        let cond = json!({"$and": [{"a": 1}, {"b": 2}]});
        assert!(check(cond.clone(), json!({"a": 1, "b": 2})));
        assert!(!check(cond, json!({"a": 1, "b": 3})));
    }

    #[test]
    fn test_not() {
        let cond = json!({"age": {"$not": {"$gt": 40}}});
        assert!(check(cond.clone(), json!({"age": 30})));
        assert!(check(cond.clone(), json!({})));
        assert!(!check(cond, json!({"age": 50})));
    }

    #[test]
    fn test_unknown_operator_rejected() {
        let err = MongoQueryMatcher
            .compile(&json!({"age": {"$between": [1, 2]}}))
            .err()
            .unwrap();
        assert!(err.to_string().contains("unsupported operator $between"));
    }

    #[test]
    fn test_invalid_shapes_rejected() {
        assert!(MongoQueryMatcher.compile(&json!(["private"])).is_err());
        assert!(MongoQueryMatcher.compile(&json!({"$or": []})).is_err());
        assert!(MongoQueryMatcher.compile(&json!({"tags": {"$in": "a"}})).is_err());
        assert!(MongoQueryMatcher.compile(&json!({"title": {"$regex": "("}})).is_err());
        assert!(MongoQueryMatcher.compile(&json!({"$where": "1"})).is_err());
    }
}

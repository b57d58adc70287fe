//! Per-request context for authorization
//!
//! This module provides the request-scoped state shared by the middleware:
//! - Named request properties, where upstream authentication stores identity
//!   claims (under `"auth"` by default)
//! - The resolved ability, attached by [`Authorize`](crate::Authorize)
//! - `CurrentAbility`, a `FromRequestParts` extractor for handler-level checks
//!
//! # Example
//!
//! ```rust,ignore
//! use axum::{routing::get, Json};
//! use pep_ability::context::CurrentAbility;
//!
//! async fn show_article(ability: CurrentAbility, Json(article): Json<Article>) -> StatusCode {
//!     if ability.can_object("read", "Article", &article, None)? { ... }
//! }
//! ```

use std::collections::HashMap;
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::Request;
use serde::Serialize;
use serde_json::Value;

use crate::ability::{Permissions, Subject};
use crate::error::{AccessError, Result};

/// Default request property holding identity claims
pub const DEFAULT_REQUEST_PROPERTY: &str = "auth";

/// Named values attached to a request by earlier middleware
#[derive(Debug, Clone, Default)]
pub struct RequestProperties(HashMap<String, Value>);

impl RequestProperties {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn insert(&mut self, name: impl Into<String>, value: Value) -> Option<Value> {
        self.0.insert(name.into(), value)
    }
}

/// Store `value` under `name` in the request's properties
pub fn set_request_property<B>(request: &mut Request<B>, name: impl Into<String>, value: Value) {
    let extensions = request.extensions_mut();
    match extensions.get_mut::<RequestProperties>() {
        Some(properties) => {
            properties.insert(name, value);
        }
        None => {
            let mut properties = RequestProperties::new();
            properties.insert(name, value);
            extensions.insert(properties);
        }
    }
}

/// Identity claims stored under `name`
///
/// `null`, `false`, `""` and `0` count as absent; empty arrays and objects
/// are present.
pub fn request_property<'r, B>(request: &'r Request<B>, name: &str) -> Option<&'r Value> {
    request
        .extensions()
        .get::<RequestProperties>()
        .and_then(|properties| properties.get(name))
        .filter(|value| !is_falsy(value))
}

fn is_falsy(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::String(s) => s.is_empty(),
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::Array(_) | Value::Object(_) => false,
    }
}

/// Ability attached to a request by [`Authorize`](crate::Authorize)
#[derive(Clone)]
pub struct RequestAbility(Arc<dyn Permissions>);

impl RequestAbility {
    pub fn new(ability: impl Permissions + 'static) -> Self {
        Self(Arc::new(ability))
    }

    /// Ability of `request`, if one was attached
    pub fn of<B>(request: &Request<B>) -> Option<&dyn Permissions> {
        request
            .extensions()
            .get::<RequestAbility>()
            .map(|ability| ability.0.as_ref())
    }
}

impl Deref for RequestAbility {
    type Target = dyn Permissions;

    fn deref(&self) -> &Self::Target {
        self.0.as_ref()
    }
}

impl fmt::Debug for RequestAbility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RequestAbility(..)")
    }
}

/// Axum extractor for the request's ability
///
/// Rejects with 403 when no ability was attached: a missing ability denies.
#[derive(Debug, Clone)]
pub struct CurrentAbility(pub RequestAbility);

impl Deref for CurrentAbility {
    type Target = dyn Permissions;

    fn deref(&self) -> &Self::Target {
        &*self.0
    }
}

impl CurrentAbility {
    /// Check `action` against a serializable subject instance
    pub fn can_object<T: Serialize>(
        &self,
        action: &str,
        kind: &str,
        object: &T,
        field: Option<&str>,
    ) -> Result<bool> {
        let attributes = serde_json::to_value(object)?;
        Ok(self.can(action, Subject::object(kind, &attributes), field))
    }

    /// Like [`can_object`](Self::can_object), turning a denial into `Forbidden`
    pub fn ensure<T: Serialize>(&self, action: &str, kind: &str, object: &T) -> Result<()> {
        if self.can_object(action, kind, object, None)? {
            Ok(())
        } else {
            tracing::warn!(action, subject = kind, "object access denied");
            Err(AccessError::Forbidden)
        }
    }
}

impl<S> FromRequestParts<S> for CurrentAbility
where
    S: Send + Sync,
{
    type Rejection = AccessError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self> {
        parts
            .extensions
            .get::<RequestAbility>()
            .cloned()
            .map(CurrentAbility)
            .ok_or(AccessError::Forbidden)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ability::create_ability_builder;
    use axum::body::Body;
    use serde_json::json;

    fn reader() -> RequestAbility {
        let mut builder = create_ability_builder();
        builder.can("read", "Article");
        builder.cannot("read", "Article").when(json!({"private": true}));
        RequestAbility::new(builder.build().unwrap())
    }

    #[derive(Serialize)]
    struct Article {
        title: String,
        private: bool,
    }

    #[test]
    fn test_request_property_roundtrip() {
        let mut request = Request::builder().uri("/").body(Body::empty()).unwrap();
        assert!(request_property(&request, "auth").is_none());

        set_request_property(&mut request, "auth", json!({"roles": ["admin"]}));
        set_request_property(&mut request, "user", json!("u1"));

        assert_eq!(
            request_property(&request, "auth"),
            Some(&json!({"roles": ["admin"]}))
        );
        assert_eq!(request_property(&request, "user"), Some(&json!("u1")));
    }

    #[test]
    fn test_null_property_is_absent() {
        let mut request = Request::builder().uri("/").body(Body::empty()).unwrap();
        set_request_property(&mut request, "auth", Value::Null);
        assert!(request_property(&request, "auth").is_none());
    }

    #[test]
    fn test_falsy_property_is_absent() {
        for claims in [json!(false), json!(""), json!(0), json!(0.0)] {
            let mut request = Request::builder().uri("/").body(Body::empty()).unwrap();
            set_request_property(&mut request, "auth", claims.clone());
            assert!(request_property(&request, "auth").is_none(), "{claims}");
        }
    }

    #[test]
    fn test_empty_claims_are_present() {
        let mut request = Request::builder().uri("/").body(Body::empty()).unwrap();
        set_request_property(&mut request, "auth", json!([]));
        assert!(request_property(&request, "auth").is_some());
    }

    #[test]
    fn test_request_ability_lookup() {
        let mut request = Request::builder().uri("/").body(Body::empty()).unwrap();
        assert!(RequestAbility::of(&request).is_none());

        request.extensions_mut().insert(reader());
        let ability = RequestAbility::of(&request).unwrap();
        assert!(ability.can("read", "Article".into(), None));
    }

    #[test]
    fn test_can_object() {
        let ability = CurrentAbility(reader());
        let public = Article {
            title: "Hello".to_string(),
            private: false,
        };
        let private = Article {
            title: "Secret".to_string(),
            private: true,
        };

        assert!(ability.can_object("read", "Article", &public, None).unwrap());
        assert!(!ability.can_object("read", "Article", &private, None).unwrap());
        assert!(ability.ensure("read", "Article", &public).is_ok());
        assert!(matches!(
            ability.ensure("read", "Article", &private),
            Err(AccessError::Forbidden)
        ));
    }

    #[tokio::test]
    async fn test_extractor_requires_ability() {
        let request = Request::builder().uri("/").body(Body::empty()).unwrap();
        let (mut parts, _) = request.into_parts();
        let result = CurrentAbility::from_request_parts(&mut parts, &()).await;
        assert!(matches!(result, Err(AccessError::Forbidden)));

        let mut request = Request::builder().uri("/").body(Body::empty()).unwrap();
        request.extensions_mut().insert(reader());
        let (mut parts, _) = request.into_parts();
        let ability = CurrentAbility::from_request_parts(&mut parts, &())
            .await
            .unwrap();
        assert!(ability.can("read", "Article".into(), None));
    }
}

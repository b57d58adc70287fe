use std::sync::Arc;

use axum::extract::Request;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use tower::Layer;
use tower::Service;

use super::method::action_for_method;
use crate::ability::Permissions;
use crate::context::RequestAbility;
use crate::error::{AccessError, Result};

/// Rule checked by [`Allow`]: `can(action, subject)`, or `cannot(...)` when
/// inverted
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuardRule {
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub inverted: bool,
}

impl GuardRule {
    /// Require `can(action, subject)`
    pub fn can(action: impl Into<String>, subject: impl Into<String>) -> Self {
        Self {
            action: Some(action.into()),
            subject: Some(subject.into()),
            inverted: false,
        }
    }

    /// Require `cannot(action, subject)`
    pub fn cannot(action: impl Into<String>, subject: impl Into<String>) -> Self {
        Self {
            inverted: true,
            ..Self::can(action, subject)
        }
    }
}

#[derive(Debug, Clone)]
struct CheckedRule {
    action: String,
    subject: String,
    inverted: bool,
}

/// Check run by a guard layer before the inner service
pub trait RequestGuard: Clone + Send + Sync + 'static {
    fn check(&self, request: &Request) -> Result<()>;
}

/// Guard passing only when every rule holds for the request's ability
#[derive(Debug, Clone)]
pub struct Allow {
    rules: Arc<Vec<CheckedRule>>,
}

/// Validate `rules` and build an [`Allow`] guard
///
/// Fails when `rules` is empty or a rule lacks its action or subject; the
/// message names the zero-based rule index.
pub fn allow(rules: impl IntoIterator<Item = GuardRule>) -> Result<Allow> {
    let rules = rules
        .into_iter()
        .enumerate()
        .map(|(i, rule)| {
            let action = rule
                .action
                .filter(|a| !a.is_empty())
                .ok_or_else(|| AccessError::config(format!("action missing in rule {}", i)))?;
            let subject = rule
                .subject
                .filter(|s| !s.is_empty())
                .ok_or_else(|| AccessError::config(format!("subject missing in rule {}", i)))?;
            Ok(CheckedRule {
                action,
                subject,
                inverted: rule.inverted,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    if rules.is_empty() {
        return Err(AccessError::config("no rules defined"));
    }

    Ok(Allow {
        rules: Arc::new(rules),
    })
}

impl Allow {
    /// Evaluate the rules in order against `ability`; a missing ability fails
    /// every rule
    pub fn evaluate(&self, ability: Option<&dyn Permissions>) -> Result<()> {
        for rule in self.rules.iter() {
            let passed = ability.is_some_and(|ability| {
                let subject = rule.subject.as_str().into();
                if rule.inverted {
                    ability.cannot(&rule.action, subject, None)
                } else {
                    ability.can(&rule.action, subject, None)
                }
            });

            if !passed {
                tracing::warn!(
                    action = %rule.action,
                    subject = %rule.subject,
                    inverted = rule.inverted,
                    has_ability = ability.is_some(),
                    "Authorization denied"
                );
                return Err(AccessError::Forbidden);
            }
        }
        Ok(())
    }
}

impl RequestGuard for Allow {
    fn check(&self, request: &Request) -> Result<()> {
        self.evaluate(RequestAbility::of(request))
    }
}

/// Guard deriving the action from the request method and checking it on one
/// subject
#[derive(Debug, Clone)]
pub struct AllowSubject {
    subject: Arc<str>,
}

/// Build an [`AllowSubject`] guard; fails when `subject` is empty
pub fn allow_subject(subject: impl AsRef<str>) -> Result<AllowSubject> {
    let subject = subject.as_ref();
    if subject.is_empty() {
        return Err(AccessError::config("subject is undefined"));
    }
    Ok(AllowSubject {
        subject: Arc::from(subject),
    })
}

impl AllowSubject {
    pub fn subject(&self) -> &str {
        &self.subject
    }
}

impl RequestGuard for AllowSubject {
    fn check(&self, request: &Request) -> Result<()> {
        let action = action_for_method(request.method());
        let allowed = match (action, RequestAbility::of(request)) {
            (Some(action), Some(ability)) => ability.can(action.as_str(), (&*self.subject).into(), None),
            _ => false,
        };

        if allowed {
            Ok(())
        } else {
            tracing::warn!(
                method = %request.method(),
                action = ?action,
                subject = %self.subject,
                "Authorization denied"
            );
            Err(AccessError::Forbidden)
        }
    }
}

impl<S> Layer<S> for Allow {
    type Service = GuardMiddleware<S, Allow>;

    fn layer(&self, inner: S) -> Self::Service {
        GuardMiddleware {
            inner,
            guard: self.clone(),
        }
    }
}

impl<S> Layer<S> for AllowSubject {
    type Service = GuardMiddleware<S, AllowSubject>;

    fn layer(&self, inner: S) -> Self::Service {
        GuardMiddleware {
            inner,
            guard: self.clone(),
        }
    }
}

#[derive(Clone)]
pub struct GuardMiddleware<S, G> {
    inner: S,
    guard: G,
}

impl<S, G> Service<Request> for GuardMiddleware<S, G>
where
    S: Service<Request, Response = Response> + Clone + Send + 'static,
    S::Future: Send + 'static,
    G: RequestGuard,
{
    type Response = Response;
    type Error = S::Error;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = std::result::Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(
        &mut self,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<std::result::Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request) -> Self::Future {
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let verdict = self.guard.check(&request);

        Box::pin(async move {
            if let Err(err) = verdict {
                return Ok(err.into_response());
            }
            inner.call(request).await
        })
    }
}

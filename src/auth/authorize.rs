use std::future::Future;
use std::sync::Arc;

use axum::extract::Request;
use axum::response::{IntoResponse, Response};
use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tower::{Layer, Service};

use crate::ability::Permissions;
use crate::context::{request_property, RequestAbility, DEFAULT_REQUEST_PROPERTY};
use crate::error::{AccessError, BoxError, Result};

/// Resolves identity claims into an ability
///
/// Implemented for every `Fn(Value) -> impl Future<Output = Result<A, E>>`,
/// so plain async functions and closures work:
///
/// ```rust,ignore
/// async fn define_ability_for(claims: Value) -> Result<Ability, AccessError> { ... }
/// let layer = authorize(define_ability_for);
/// ```
pub trait DefineAbility: Send + Sync + 'static {
    type Ability: Permissions + 'static;
    type Error: Into<BoxError>;
    type Future: Future<Output = std::result::Result<Self::Ability, Self::Error>> + Send + 'static;

    fn define_ability(&self, claims: Value) -> Self::Future;
}

impl<F, Fut, A, E> DefineAbility for F
where
    F: Fn(Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = std::result::Result<A, E>> + Send + 'static,
    A: Permissions + 'static,
    E: Into<BoxError>,
{
    type Ability = A;
    type Error = E;
    type Future = Fut;

    fn define_ability(&self, claims: Value) -> Self::Future {
        self(claims)
    }
}

/// Options of the [`Authorize`] middleware
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizeOptions {
    /// Request property holding the identity claims
    #[serde(default = "default_request_property")]
    pub request_property: String,
}

fn default_request_property() -> String {
    DEFAULT_REQUEST_PROPERTY.to_string()
}

impl Default for AuthorizeOptions {
    fn default() -> Self {
        Self {
            request_property: default_request_property(),
        }
    }
}

/// Middleware layer resolving the request's identity claims into an ability
///
/// Requests without claims are answered with 401 and the resolver is not
/// called. Resolver failures are answered with 500.
pub struct Authorize<R> {
    resolver: Arc<R>,
    options: Arc<AuthorizeOptions>,
}

impl<R> Clone for Authorize<R> {
    fn clone(&self) -> Self {
        Self {
            resolver: self.resolver.clone(),
            options: self.options.clone(),
        }
    }
}

/// Authorize with claims read from the default `"auth"` property
pub fn authorize<R: DefineAbility>(resolver: R) -> Authorize<R> {
    authorize_with(resolver, AuthorizeOptions::default())
}

/// Authorize with explicit options
pub fn authorize_with<R: DefineAbility>(resolver: R, options: AuthorizeOptions) -> Authorize<R> {
    Authorize {
        resolver: Arc::new(resolver),
        options: Arc::new(options),
    }
}

impl<R: DefineAbility> Authorize<R> {
    pub fn options(&self) -> &AuthorizeOptions {
        &self.options
    }

    /// Resolve the ability for `request` and attach it as [`RequestAbility`]
    pub async fn authorize_request<B>(&self, request: &mut Request<B>) -> Result<()> {
        let ability = resolve(&self.resolver, &self.options, request).await?;
        request.extensions_mut().insert(ability);
        Ok(())
    }
}

fn resolve<R: DefineAbility, B>(
    resolver: &Arc<R>,
    options: &AuthorizeOptions,
    request: &Request<B>,
) -> BoxFuture<'static, Result<RequestAbility>> {
    let Some(claims) = request_property(request, &options.request_property).cloned() else {
        tracing::warn!(
            property = %options.request_property,
            "no identity claims on request"
        );
        return Box::pin(async { Err(AccessError::Unauthorized) });
    };

    let resolver = resolver.clone();
    Box::pin(async move {
        match resolver.define_ability(claims).await {
            Ok(ability) => Ok(RequestAbility::new(ability)),
            Err(err) => Err(AccessError::Resolver(err.into())),
        }
    })
}

impl<S, R: DefineAbility> Layer<S> for Authorize<R> {
    type Service = AuthorizeMiddleware<S, R>;

    fn layer(&self, inner: S) -> Self::Service {
        AuthorizeMiddleware {
            inner,
            resolver: self.resolver.clone(),
            options: self.options.clone(),
        }
    }
}

pub struct AuthorizeMiddleware<S, R> {
    inner: S,
    resolver: Arc<R>,
    options: Arc<AuthorizeOptions>,
}

impl<S: Clone, R> Clone for AuthorizeMiddleware<S, R> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            resolver: self.resolver.clone(),
            options: self.options.clone(),
        }
    }
}

impl<S, R> Service<Request> for AuthorizeMiddleware<S, R>
where
    S: Service<Request, Response = Response> + Clone + Send + 'static,
    S::Future: Send + 'static,
    R: DefineAbility,
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

    fn call(&mut self, mut request: Request) -> Self::Future {
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let resolving = resolve(&self.resolver, &self.options, &request);

        Box::pin(async move {
            match resolving.await {
                Ok(ability) => {
                    request.extensions_mut().insert(ability);
                    inner.call(request).await
                }
                Err(err) => Ok(err.into_response()),
            }
        })
    }
}

//! Authorization middleware for ability-based access control
//!
//! This module wires an ability into Axum/Tower request pipelines.
//!
//! # Features
//!
//! - [`authorize`] layer resolving identity claims into a per-request ability
//! - [`allow`] layer checking an ordered list of `can`/`cannot` rules
//! - [`allow_subject`] layer deriving the action from the HTTP method
//! - [`RoleAbilities`] resolver mapping claim roles to configured rules
//!
//! `authorize` must run before the guards; a guard that finds no ability
//! rejects the request.
//!
//! # Example
//!
//! ```ignore
//! use axum::{routing::get, Router};
//! use pep_ability::auth::{allow_subject, authorize, RoleAbilities};
//!
//! let app = Router::new()
//!     .route("/articles", get(list_articles).post(create_article))
//!     .route_layer(allow_subject("Article")?)
//!     .layer(authorize(role_abilities))
//!     .layer(protect); // puts decoded token claims under the "auth" property
//! ```

pub mod authorize;
pub mod claims;
pub mod guard;
pub mod method;

pub use authorize::{authorize, authorize_with, Authorize, AuthorizeMiddleware, AuthorizeOptions, DefineAbility};
pub use claims::{has_role, roles, RoleAbilities, RoleRules};
pub use guard::{allow, allow_subject, Allow, AllowSubject, GuardMiddleware, GuardRule, RequestGuard};
pub use method::{action_for_method, CrudAction};

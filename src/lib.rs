//! # PEP Ability - ability-based Policy Enforcement Point
//!
//! Authorization middleware for Axum/Tower. An `authorize` layer turns the
//! identity claims of a request into an ability (a set of `can`/`cannot`
//! rules), and guard layers allow or reject the request based on it.
//!
//! - [`authorize`]: resolves the claims stored under a request property
//!   (`"auth"` by default) and attaches the ability; 401 without claims
//! - [`allow`]: every rule must hold; 403 otherwise
//! - [`allow_subject`]: CRUD action derived from the HTTP method; 403 otherwise
//! - [`create_ability_builder`]: rule builder bound to MongoDB-style conditions
//!
//! ## Features
//!
//! - `config` (default): TOML loading of role rules and guard rule lists

pub mod ability;
pub mod auth;
pub mod context;
pub mod error;

#[cfg(feature = "config")]
pub mod config;

pub use error::{AccessError, BoxError, Result};

pub use crate::ability::{create_ability_builder, Ability, AbilityBuilder, Permissions, RawRule, Subject};
pub use crate::auth::{
    allow, allow_subject, authorize, authorize_with, Allow, AllowSubject, Authorize, AuthorizeOptions,
    DefineAbility, GuardRule, RoleAbilities,
};
pub use crate::context::{set_request_property, CurrentAbility, RequestAbility};

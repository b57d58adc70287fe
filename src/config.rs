//! Configuration parsing module for access control
//!
//! This module provides configuration loading from TOML files: authorize
//! options, rule sets per role, and named guard rule lists.
//!
//! # Example
//!
//! ```toml
//! [authorize]
//! request_property = "auth"
//!
//! # from least to most privileges
//! [[roles]]
//! role = "reader"
//! rules = [
//!     { action = "read", subject = "Article" },
//!     { action = "read", subject = "Article", inverted = true, conditions = { private = true } },
//! ]
//!
//! [[roles]]
//! role = "admin"
//! rules = [{ action = "manage", subject = "all" }]
//!
//! [guards.create_article]
//! rules = [{ action = "create", subject = "Article" }]
//! ```
//!
//! ```rust,ignore
//! let config = pep_ability::config::load_config("access.toml")?;
//! let app = Router::new()
//!     .route("/articles", post(create_article))
//!     .route_layer(config.guard("create_article")?)
//!     .layer(authorize_with(config.role_abilities()?, config.authorize.clone()));
//! ```

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::auth::{allow, Allow, AuthorizeOptions, GuardRule, RoleAbilities, RoleRules};
use crate::error::{AccessError, Result};

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccessConfig {
    /// Options of the authorize middleware
    #[serde(default)]
    pub authorize: AuthorizeOptions,

    /// Rule sets per role, least privileged first
    #[serde(default)]
    pub roles: Vec<RoleRules>,

    /// Named rule lists for `allow` guards
    #[serde(default)]
    pub guards: HashMap<String, GuardConfig>,
}

/// Rule list of one guard
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GuardConfig {
    #[serde(default)]
    pub rules: Vec<GuardRule>,
}

impl AccessConfig {
    /// Load configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        load_config(path)
    }

    /// Parse configuration from a TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| AccessError::Config(format!("Failed to parse TOML config: {}", e)))
    }

    /// Resolver granting the configured role rules
    pub fn role_abilities(&self) -> Result<RoleAbilities> {
        RoleAbilities::from_roles(self.roles.iter().cloned())
    }

    /// `allow` guard for the named rule list
    pub fn guard(&self, name: &str) -> Result<Allow> {
        let config = self
            .guards
            .get(name)
            .ok_or_else(|| AccessError::Config(format!("guard {} not found in config file", name)))?;
        allow(config.rules.iter().cloned())
            .map_err(|e| AccessError::Config(format!("guard {}: {}", name, e)))
    }

    /// Build every configured guard, failing on the first invalid one
    pub fn guards(&self) -> Result<HashMap<String, Allow>> {
        self.guards
            .keys()
            .map(|name| self.guard(name).map(|guard| (name.clone(), guard)))
            .collect()
    }
}

/// Load configuration from a TOML file
///
/// # Arguments
///
/// * `path` - Path to the TOML configuration file
///
/// # Example
///
/// ```rust,ignore
/// let config = pep_ability::config::load_config("access.toml")?;
/// ```
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<AccessConfig> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)
        .map_err(|e| AccessError::Config(format!("Failed to read config file: {}", e)))?;
    tracing::debug!(path = %path.display(), "loading access control config");

    AccessConfig::from_toml(&content)
}

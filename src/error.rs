//! Error types for access control

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// Boxed error returned by ability resolvers
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Access control error
#[derive(Debug, thiserror::Error)]
pub enum AccessError {
    /// Invalid setup: empty rule lists, rules without action or subject,
    /// malformed conditions or configuration files
    #[error("{0}")]
    Config(String),

    /// No identity claims on the request
    #[error("Unauthorized")]
    Unauthorized,

    /// The ability denies the request
    #[error("Forbidden")]
    Forbidden,

    /// The ability resolver failed; the source error is kept untouched
    #[error(transparent)]
    Resolver(BoxError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, AccessError>;

impl AccessError {
    pub fn config(message: impl Into<String>) -> Self {
        AccessError::Config(message.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AccessError::Unauthorized => StatusCode::UNAUTHORIZED,
            AccessError::Forbidden => StatusCode::FORBIDDEN,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AccessError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "access control failure");
        }
        let message = status.canonical_reason().unwrap_or("Error");
        (status, message).into_response()
    }
}

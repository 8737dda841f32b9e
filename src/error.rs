/// Unified error types for the key resolver
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::error;

/// Failures while walking a redirection chain
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectionError {
    #[error("cyclic dependency detected")]
    Cyclic,

    #[error("maximum redirection reached")]
    MaxDepth,
}

/// Main error type for the resolver
#[derive(Error, Debug)]
pub enum ResolverError {
    /// Hash absent or soft-deleted
    #[error("hash not found")]
    NotFound,

    /// Malformed body, bad routing id, hash mismatch, bad redirect target
    #[error("{0}")]
    Validation(String),

    /// Bearer signature or invite token rejected
    #[error("unauthenticated")]
    Authentication,

    /// Proof-of-work missing, inconsistent or too weak
    #[error("{0}")]
    ProofOfWork(String),

    /// Stale serial on a compare-and-swap write, or a create racing another
    #[error("error while updating")]
    Conflict,

    /// Redirection chain is cyclic or too deep
    #[error(transparent)]
    Redirection(#[from] RedirectionError),

    /// Relational storage errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Key-value storage errors
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Other storage failures (corrupt rows, undecodable values)
    #[error("Storage error: {0}")]
    Storage(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal server errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ResolverError {
    pub fn validation(message: impl Into<String>) -> Self {
        ResolverError::Validation(message.into())
    }

    /// True for failures originating below the engine (storage, IO, wiring)
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            ResolverError::Database(_)
                | ResolverError::Redis(_)
                | ResolverError::Storage(_)
                | ResolverError::Io(_)
                | ResolverError::Internal(_)
        )
    }
}

/// Error response body
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

/// Convert ResolverError to HTTP response
impl IntoResponse for ResolverError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match &self {
            ResolverError::NotFound => (StatusCode::NOT_FOUND, "NotFound", self.to_string()),
            ResolverError::Validation(_) => {
                (StatusCode::BAD_REQUEST, "InvalidRequest", self.to_string())
            }
            ResolverError::Authentication => (
                StatusCode::UNAUTHORIZED,
                "AuthenticationRequired",
                self.to_string(),
            ),
            ResolverError::ProofOfWork(_) => {
                (StatusCode::UNAUTHORIZED, "InvalidProofOfWork", self.to_string())
            }
            ResolverError::Redirection(_) => {
                (StatusCode::BAD_REQUEST, "InvalidRedirection", self.to_string())
            }
            ResolverError::Conflict => {
                error!("compare-and-swap write lost: {}", self);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "InternalServerError",
                    self.to_string(),
                )
            }
            _ => {
                error!("request failed: {}", self);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "InternalServerError",
                    "internal server error".to_string(), // Don't leak details
                )
            }
        };

        let body = Json(ErrorResponse {
            error: error_code.to_string(),
            message,
        });

        (status, body).into_response()
    }
}

/// Result type alias for resolver operations
pub type ResolverResult<T> = Result<T, ResolverError>;

//! API error type and its JSON response mapping.
//!
//! Every failure leaves the server as `{ "error": "<message>" }` with the
//! status of its variant. Internal errors carry a fixed, route-specific
//! message; the underlying cause is logged and never sent to the client.

use axum::{
    extract::{rejection::JsonRejection, Request},
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use promptlab_core::{session::ScopeError, PromptLabError};
use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// Error response body
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Authentication required")]
    Unauthenticated,

    #[error("Invalid tenant")]
    Unauthorized,

    #[error("{0}")]
    InvalidParameter(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Method not allowed")]
    MethodNotAllowed,

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn invalid(message: impl Into<String>) -> Self {
        ApiError::InvalidParameter(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        ApiError::NotFound(message.into())
    }

    /// Log `cause` and return an internal error carrying only `message`.
    pub fn internal(message: &str, cause: impl Display) -> Self {
        tracing::error!(error = %cause, "{}", message);
        #[cfg(feature = "metrics")]
        crate::metrics::record_internal_error(message);
        ApiError::Internal(message.to_string())
    }

    /// Map a store failure. `NotFound` and `InvalidParameter` pass through;
    /// anything else becomes an internal error with `message`.
    pub fn store(message: &str, err: PromptLabError) -> Self {
        match err {
            PromptLabError::NotFound(what) => ApiError::NotFound(what),
            PromptLabError::InvalidParameter(msg) => ApiError::InvalidParameter(msg),
            other => ApiError::internal(message, other),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthenticated | ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::InvalidParameter(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        (
            status,
            Json(ErrorResponse {
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}

/// Fallback for paths no route matches.
pub async fn route_not_found() -> ApiError {
    ApiError::not_found("Not found")
}

/// Give the router's bodiless 405 the same `{ error }` shape, keeping `Allow`.
pub async fn method_not_allowed_body(request: Request, next: Next) -> Response {
    let response = next.run(request).await;
    if response.status() != StatusCode::METHOD_NOT_ALLOWED {
        return response;
    }

    let mut replaced = ApiError::MethodNotAllowed.into_response();
    if let Some(allow) = response.headers().get(header::ALLOW) {
        replaced.headers_mut().insert(header::ALLOW, allow.clone());
    }
    replaced
}

/// Validation failures from the core crate.
impl From<PromptLabError> for ApiError {
    fn from(err: PromptLabError) -> Self {
        match err {
            PromptLabError::InvalidParameter(msg) | PromptLabError::ValidationError(msg) => {
                ApiError::InvalidParameter(msg)
            }
            PromptLabError::ConflictingPath(_) => ApiError::InvalidParameter(err.to_string()),
            PromptLabError::NotFound(msg) => ApiError::NotFound(msg),
            other => ApiError::internal("Internal server error", other),
        }
    }
}

impl From<ScopeError> for ApiError {
    fn from(err: ScopeError) -> Self {
        match err {
            ScopeError::MissingSession => ApiError::Unauthenticated,
            ScopeError::InvalidTenant => ApiError::Unauthorized,
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        tracing::debug!(error = %rejection, "Rejected request body");
        ApiError::invalid("Invalid request body")
    }
}

//! Authorization gate.
//!
//! Turns the resolved session into a [`TenantScope`] or rejects the request.
//! Runs before any handler extractor, so a request without a usable session
//! gets 401 even when its path is malformed.

use axum::{
    extract::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};
use promptlab_core::{Session, TenantScope};

use crate::error::ApiError;

/// Build the tenant scope for a request.
///
/// - no session → [`ApiError::Unauthenticated`]
/// - sentinel tenant → [`ApiError::Unauthorized`]
pub fn authorize(session: Option<&Session>) -> Result<TenantScope, ApiError> {
    Ok(TenantScope::from_session(session)?)
}

/// Middleware requiring a tenant-bound session.
///
/// Inserts the [`TenantScope`] into request extensions for handlers.
/// Requires [`crate::session::resolve_session`] to run first.
pub async fn require_tenant(mut req: Request, next: Next) -> Response {
    let scope = match authorize(req.extensions().get::<Session>()) {
        Ok(scope) => scope,
        Err(e) => {
            tracing::debug!(error = %e, path = %req.uri().path(), "Rejected request");
            return e.into_response();
        }
    };

    req.extensions_mut().insert(scope);
    next.run(req).await
}

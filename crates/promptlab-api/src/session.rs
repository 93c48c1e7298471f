//! Identity resolution.
//!
//! Reads the session token from the request and resolves it through the
//! store. The token is taken from `Authorization: Bearer <token>` first and
//! from the session cookie otherwise.
//!
//! # Architecture
//!
//! ```text
//! Request → resolve_session → require_tenant → Handler
//!                ↓                  ↓
//!          Option<Session>     TenantScope
//! ```
//!
//! A missing, unknown or expired token is not an error here: the request
//! continues without a [`Session`] extension and [`crate::auth`] decides.
//! Only a store failure stops the request (500).

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Response},
};
use promptlab_storage::Store;

use crate::{error::ApiError, AppState};

/// Extract the session token from the request headers.
///
/// A bearer token wins over the cookie. Empty tokens are ignored.
pub fn extract_token(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    bearer_token(headers).or_else(|| cookie_token(headers, cookie_name))
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then(|| token.to_string())
}

fn cookie_token(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == cookie_name)
        .map(|(_, token)| token.trim().trim_matches('"').to_string())
        .filter(|token| !token.is_empty())
}

/// Middleware that resolves the request's session, if any.
///
/// On success the [`promptlab_core::Session`] is inserted into request
/// extensions.
pub async fn resolve_session<S: Store>(
    State(state): State<AppState<S>>,
    mut req: Request,
    next: Next,
) -> Response {
    let Some(token) = extract_token(req.headers(), &state.config.session_cookie) else {
        return next.run(req).await;
    };

    match state.store.resolve_session(&token).await {
        Ok(Some(session)) => {
            tracing::debug!(
                tenant_id = session.tenant_id,
                user_id = %session.user_id,
                "Resolved session"
            );
            req.extensions_mut().insert(session);
        }
        Ok(None) => {
            tracing::debug!("Session token did not resolve");
        }
        Err(e) => {
            return ApiError::internal("Failed to resolve session", e).into_response();
        }
    }

    next.run(req).await
}

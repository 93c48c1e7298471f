//! Sessions and tenant scoping.
//!
//! A [`Session`] is issued by the identity provider and only ever read here.
//! A [`TenantScope`] is what every store call receives; it can only be built
//! from a session, so the tenant id reaching a query is always the session's.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Tenant id meaning "no tenant assigned".
pub const SENTINEL_TENANT_ID: i64 = -1;

/// An authenticated session as resolved from a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub session_id: String,
    pub user_id: String,
    pub tenant_id: i64,
}

impl Session {
    pub fn new(
        session_id: impl Into<String>,
        user_id: impl Into<String>,
        tenant_id: i64,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            user_id: user_id.into(),
            tenant_id,
        }
    }

    /// Whether the session carries a real tenant.
    pub fn has_tenant(&self) -> bool {
        self.tenant_id != SENTINEL_TENANT_ID
    }
}

/// Why a session could not be turned into a [`TenantScope`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ScopeError {
    #[error("no session")]
    MissingSession,
    #[error("session has no tenant")]
    InvalidTenant,
}

/// Tenant context threaded explicitly into every store call.
///
/// Fields are private: the only constructor is [`TenantScope::from_session`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantScope {
    tenant_id: i64,
    user_id: String,
}

impl TenantScope {
    /// Build a scope from an optional resolved session.
    ///
    /// # Errors
    ///
    /// - [`ScopeError::MissingSession`] when there is no session
    /// - [`ScopeError::InvalidTenant`] when the session's tenant is the sentinel
    pub fn from_session(session: Option<&Session>) -> std::result::Result<Self, ScopeError> {
        let session = session.ok_or(ScopeError::MissingSession)?;
        if !session.has_tenant() {
            return Err(ScopeError::InvalidTenant);
        }
        Ok(Self {
            tenant_id: session.tenant_id,
            user_id: session.user_id.clone(),
        })
    }

    pub fn tenant_id(&self) -> i64 {
        self.tenant_id
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }
}

impl fmt::Display for TenantScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tenant:{}/user:{}", self.tenant_id, self.user_id)
    }
}

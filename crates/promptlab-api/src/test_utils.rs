//! Test Utilities Module
//!
//! Shared infrastructure for integration testing the PromptLab API.
//! Enable via the `test-utils` feature flag.
//!
//! - `TestApp`: router over an [`InMemoryStore`] with seeded sessions
//! - `TestDb` / `SqliteTestApp`: router over a temporary SQLite database
//! - `send_request`: drive a router with `oneshot` and decode the JSON body
//!
//! # Usage
//!
//! ```rust,ignore
//! use promptlab_api::test_utils::{send_request, TestApp, TENANT_A_TOKEN};
//!
//! #[tokio::test]
//! async fn test_list_projects() {
//!     let app = TestApp::new();
//!     let (status, body) = send_request(app.router(), "GET", "/api/projects", None, Some(TENANT_A_TOKEN)).await;
//!     assert_eq!(status, StatusCode::OK);
//! }
//! ```

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use promptlab_core::{PromptLabError, Result, SENTINEL_TENANT_ID};
use promptlab_storage::{InMemoryStore, SqliteStore};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::{tempdir, TempDir};
use tower::ServiceExt;

use crate::{router, ApiConfig, AppState};

pub const TENANT_A: i64 = 100;
pub const TENANT_B: i64 = 200;

pub const TENANT_A_TOKEN: &str = "tok-tenant-a";
pub const TENANT_B_TOKEN: &str = "tok-tenant-b";
/// Session whose tenant is the "no tenant" sentinel
pub const SENTINEL_TOKEN: &str = "tok-sentinel";

// ============================================================================
// Request helper
// ============================================================================

/// Send a request through `app` and return the status and decoded body.
///
/// `token` is sent as a bearer token. Non-JSON bodies come back as a JSON string.
pub async fn send_request(
    app: Router,
    method: &str,
    path: &str,
    body: Option<Value>,
    token: Option<&str>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder()
        .uri(path)
        .method(method)
        .header(header::CONTENT_TYPE, "application/json");

    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }

    let body = match body {
        Some(v) => Body::from(v.to_string()),
        None => Body::empty(),
    };

    let request = builder.body(body).expect("valid request");
    send_raw(app, request).await
}

/// Send a prebuilt request (custom headers, raw bodies).
pub async fn send_raw(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.expect("router is infallible");
    let status = response.status();

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("readable body");

    let json = serde_json::from_slice(&bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).to_string()));

    (status, json)
}

// ============================================================================
// In-memory app
// ============================================================================

/// Router over an in-memory store.
///
/// Sessions for [`TENANT_A`], [`TENANT_B`] and the sentinel tenant are seeded.
pub struct TestApp {
    state: AppState<InMemoryStore>,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_config(ApiConfig::default())
    }

    pub fn with_config(config: ApiConfig) -> Self {
        let state = AppState::new(InMemoryStore::new(), config);
        state.store.insert_session(TENANT_A_TOKEN, "alice", TENANT_A);
        state.store.insert_session(TENANT_B_TOKEN, "bob", TENANT_B);
        state
            .store
            .insert_session(SENTINEL_TOKEN, "nobody", SENTINEL_TENANT_ID);
        Self { state }
    }

    pub fn store(&self) -> &Arc<InMemoryStore> {
        &self.state.store
    }

    pub fn router(&self) -> Router {
        router(self.state.clone())
    }
}

impl Default for TestApp {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// SQLite app
// ============================================================================

/// A temporary database file removed on drop.
pub struct TestDb {
    _temp_dir: TempDir,
    db_path: PathBuf,
}

impl TestDb {
    pub fn new() -> Result<Self> {
        let temp_dir = tempdir()
            .map_err(|e| PromptLabError::Other(format!("Failed to create temp dir: {}", e)))?;
        let db_path = temp_dir.path().join("promptlab_test.db");
        Ok(Self {
            _temp_dir: temp_dir,
            db_path,
        })
    }

    pub fn path_string(&self) -> String {
        self.db_path.to_string_lossy().to_string()
    }
}

/// Router over an initialized SQLite store in a temporary directory.
pub struct SqliteTestApp {
    _db: TestDb,
    state: AppState<SqliteStore>,
}

impl SqliteTestApp {
    pub async fn new() -> Result<Self> {
        let db = TestDb::new()?;
        let config = ApiConfig {
            db_path: db.path_string(),
            ..Default::default()
        };
        let store = SqliteStore::new(config.db_path.clone());
        store.initialize().await?;
        Ok(Self {
            _db: db,
            state: AppState::new(store, config),
        })
    }

    pub fn store(&self) -> &Arc<SqliteStore> {
        &self.state.store
    }

    pub fn router(&self) -> Router {
        router(self.state.clone())
    }

    /// Issue a non-expiring session and return its token.
    pub async fn session_for(&self, user_id: &str, tenant_id: i64) -> Result<String> {
        let (session, _) = self.state.store.create_session(user_id, tenant_id, None).await?;
        Ok(session.session_id)
    }
}

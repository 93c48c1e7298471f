//! PromptLab API Library
//!
//! Tenant-scoped REST API for projects, datasets and their records, prompts
//! with versions and routers, and evaluation logs.
//!
//! # Request pipeline
//!
//! ```text
//! Request → resolve_session → require_tenant → path validation → store → JSON
//!               (session)          (auth)         (routes::*)
//! ```
//!
//! Handlers are generic over [`Store`], so the server runs on
//! [`promptlab_storage::SqliteStore`] while tests use the in-memory store.

use axum::{middleware, routing::get, Router};
use promptlab_storage::Store;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub mod auth;
pub mod config;
pub mod error;
pub mod health;
pub mod routes;
pub mod session;

#[cfg(feature = "metrics")]
pub mod metrics;

#[cfg(feature = "test-utils")]
pub mod test_utils;

pub use config::ApiConfig;
pub use error::{ApiError, ErrorResponse};

/// Application state shared across handlers
pub struct AppState<S> {
    pub store: Arc<S>,
    pub config: Arc<ApiConfig>,
}

impl<S> AppState<S> {
    pub fn new(store: S, config: ApiConfig) -> Self {
        Self {
            store: Arc::new(store),
            config: Arc::new(config),
        }
    }
}

impl<S> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            config: Arc::clone(&self.config),
        }
    }
}

/// Build the full application router.
pub fn router<S: Store>(state: AppState<S>) -> Router {
    let api = routes::api_routes::<S>()
        .route_layer(middleware::from_fn(auth::require_tenant))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            session::resolve_session::<S>,
        ));

    let app = Router::new()
        .route("/health", get(health::health_check))
        .route("/live", get(health::liveness_check))
        .route("/ready", get(health::readiness_check::<S>))
        .merge(api)
        .fallback(error::route_not_found);

    #[cfg(feature = "metrics")]
    let app = app
        .route("/metrics", get(metrics::metrics_handler))
        .layer(middleware::from_fn(metrics::track_metrics));

    app.layer(middleware::from_fn(error::method_not_allowed_body))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

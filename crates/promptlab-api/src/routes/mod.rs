//! Route handlers.
//!
//! Each handler receives the [`promptlab_core::TenantScope`] inserted by the
//! authorization gate, parses its path identifiers with
//! [`promptlab_core::validation::parse_ids`] and only then calls the store.

use async_trait::async_trait;
use axum::{
    extract::{FromRequestParts, Path},
    http::request::Parts,
    routing::get,
    Router,
};
use promptlab_storage::Store;
use serde::de::DeserializeOwned;

use crate::{error::ApiError, AppState};

pub mod datasets;
pub mod evaluations;
pub mod projects;
pub mod prompts;
pub mod records;

/// Raw path segments, with extraction failures reported as a JSON 400.
///
/// Segments are kept as strings; handlers validate them as identifiers.
pub struct RawPath<T>(pub T);

#[async_trait]
impl<T, St> FromRequestParts<St> for RawPath<T>
where
    T: DeserializeOwned + Send,
    St: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &St) -> Result<Self, Self::Rejection> {
        match Path::<T>::from_request_parts(parts, state).await {
            Ok(Path(segments)) => Ok(RawPath(segments)),
            Err(rejection) => {
                tracing::debug!(error = %rejection, "Rejected path parameters");
                Err(ApiError::invalid("Invalid path parameters"))
            }
        }
    }
}

/// All tenant-scoped `/api` routes.
pub fn api_routes<S: Store>() -> Router<AppState<S>> {
    Router::new()
        // Projects
        .route(
            "/api/projects",
            get(projects::list_projects::<S>).post(projects::create_project::<S>),
        )
        .route("/api/projects/:project_id", get(projects::get_project::<S>))
        // Datasets
        .route(
            "/api/projects/:project_id/datasets",
            get(datasets::list_datasets::<S>).post(datasets::create_dataset::<S>),
        )
        .route(
            "/api/projects/:project_id/datasets/:dataset_id",
            get(datasets::get_dataset::<S>)
                .put(datasets::update_dataset::<S>)
                .delete(datasets::delete_dataset::<S>),
        )
        // Records
        .route(
            "/api/projects/:project_id/datasets/:dataset_id/records",
            get(records::list_records::<S>)
                .post(records::create_record::<S>)
                .delete(records::delete_records::<S>),
        )
        // Prompts
        .route(
            "/api/projects/:project_id/prompts",
            get(prompts::list_prompts::<S>).post(prompts::create_prompt::<S>),
        )
        .route(
            "/api/projects/:project_id/prompts/:prompt_id",
            get(prompts::get_prompt::<S>).put(prompts::update_prompt::<S>),
        )
        .route(
            "/api/projects/:project_id/prompts/:prompt_id/versions",
            get(prompts::list_versions::<S>).post(prompts::create_version::<S>),
        )
        .route(
            "/api/projects/:project_id/prompts/:prompt_id/versions/:version",
            get(prompts::get_version::<S>),
        )
        .route(
            "/api/projects/:project_id/prompts/:prompt_id/router",
            get(prompts::get_router::<S>).put(prompts::set_router::<S>),
        )
        // Evaluation logs
        .route(
            "/api/projects/:project_id/evaluations",
            get(evaluations::list_evaluation_logs::<S>)
                .post(evaluations::create_evaluation_log::<S>),
        )
        .route(
            "/api/projects/:project_id/evaluations/:evaluation_id",
            get(evaluations::get_evaluation_log::<S>),
        )
}

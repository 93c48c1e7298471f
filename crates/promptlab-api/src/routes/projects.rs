//! Project endpoints.

use axum::{
    extract::{rejection::JsonRejection, State},
    Extension, Json,
};
use promptlab_core::{validation, TenantScope};
use promptlab_storage::Store;
use serde::Deserialize;
use serde_json::{json, Value};

use super::RawPath;
use crate::{error::ApiError, AppState};

#[derive(Debug, Deserialize)]
pub struct CreateProjectRequest {
    #[serde(default)]
    pub name: String,
}

/// `GET /api/projects`
pub async fn list_projects<S: Store>(
    State(state): State<AppState<S>>,
    Extension(scope): Extension<TenantScope>,
) -> Result<Json<Value>, ApiError> {
    let projects = state
        .store
        .list_projects(&scope)
        .await
        .map_err(|e| ApiError::store("Failed to fetch projects", e))?;

    Ok(Json(json!({ "projects": projects })))
}

/// `POST /api/projects`
pub async fn create_project<S: Store>(
    State(state): State<AppState<S>>,
    Extension(scope): Extension<TenantScope>,
    body: Result<Json<CreateProjectRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(req) = body?;
    validation::validate_name(&req.name, "Project name")?;

    let project = state
        .store
        .create_project(&scope, req.name.trim())
        .await
        .map_err(|e| ApiError::store("Failed to create project", e))?;

    tracing::info!(tenant_id = scope.tenant_id(), project_id = project.id, "Project created");
    Ok(Json(json!({ "project": project })))
}

/// `GET /api/projects/:project_id`
pub async fn get_project<S: Store>(
    State(state): State<AppState<S>>,
    Extension(scope): Extension<TenantScope>,
    RawPath(project_id): RawPath<String>,
) -> Result<Json<Value>, ApiError> {
    let [project_id] = validation::parse_ids([("project ID", project_id.as_str())])?;

    let project = state
        .store
        .get_project(&scope, project_id)
        .await
        .map_err(|e| ApiError::store("Failed to fetch project", e))?
        .ok_or_else(|| ApiError::not_found("Project not found"))?;

    Ok(Json(json!({ "project": project })))
}

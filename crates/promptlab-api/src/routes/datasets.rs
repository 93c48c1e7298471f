//! Dataset endpoints.

use axum::{
    extract::{rejection::JsonRejection, State},
    Extension, Json,
};
use promptlab_core::{validation, DatasetSchema, DatasetUpdate, NewDataset, TenantScope};
use promptlab_storage::Store;
use serde::Deserialize;
use serde_json::{json, Value};

use super::RawPath;
use crate::{error::ApiError, AppState};

#[derive(Debug, Deserialize)]
pub struct CreateDatasetRequest {
    #[serde(default)]
    pub name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub schema: DatasetSchema,
}

/// `GET /api/projects/:project_id/datasets`
pub async fn list_datasets<S: Store>(
    State(state): State<AppState<S>>,
    Extension(scope): Extension<TenantScope>,
    RawPath(project_id): RawPath<String>,
) -> Result<Json<Value>, ApiError> {
    let [project_id] = validation::parse_ids([("project ID", project_id.as_str())])?;

    let datasets = state
        .store
        .list_datasets(&scope, project_id)
        .await
        .map_err(|e| ApiError::store("Failed to fetch datasets", e))?;

    Ok(Json(json!({ "datasets": datasets })))
}

/// `POST /api/projects/:project_id/datasets`
pub async fn create_dataset<S: Store>(
    State(state): State<AppState<S>>,
    Extension(scope): Extension<TenantScope>,
    RawPath(project_id): RawPath<String>,
    body: Result<Json<CreateDatasetRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let [project_id] = validation::parse_ids([("project ID", project_id.as_str())])?;
    let Json(req) = body?;
    validation::validate_name(&req.name, "Dataset name")?;

    let dataset = state
        .store
        .create_dataset(
            &scope,
            project_id,
            NewDataset {
                name: req.name.trim().to_string(),
                description: req.description,
                schema: req.schema,
            },
        )
        .await
        .map_err(|e| ApiError::store("Failed to create dataset", e))?
        .ok_or_else(|| ApiError::not_found("Project not found"))?;

    tracing::info!(
        tenant_id = scope.tenant_id(),
        project_id,
        dataset_id = dataset.id,
        "Dataset created"
    );
    Ok(Json(json!({ "dataset": dataset })))
}

/// `GET /api/projects/:project_id/datasets/:dataset_id`
pub async fn get_dataset<S: Store>(
    State(state): State<AppState<S>>,
    Extension(scope): Extension<TenantScope>,
    RawPath((project_id, dataset_id)): RawPath<(String, String)>,
) -> Result<Json<Value>, ApiError> {
    let [project_id, dataset_id] = validation::parse_ids([
        ("project ID", project_id.as_str()),
        ("dataset ID", dataset_id.as_str()),
    ])?;

    let dataset = state
        .store
        .get_dataset(&scope, project_id, dataset_id)
        .await
        .map_err(|e| ApiError::store("Failed to fetch dataset", e))?
        .ok_or_else(|| ApiError::not_found("Dataset not found"))?;

    Ok(Json(json!({ "dataset": dataset })))
}

/// `PUT /api/projects/:project_id/datasets/:dataset_id`
pub async fn update_dataset<S: Store>(
    State(state): State<AppState<S>>,
    Extension(scope): Extension<TenantScope>,
    RawPath((project_id, dataset_id)): RawPath<(String, String)>,
    body: Result<Json<DatasetUpdate>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let [project_id, dataset_id] = validation::parse_ids([
        ("project ID", project_id.as_str()),
        ("dataset ID", dataset_id.as_str()),
    ])?;
    let Json(mut update) = body?;
    if let Some(name) = update.name.as_deref() {
        validation::validate_name(name, "Dataset name")?;
        update.name = Some(name.trim().to_string());
    }

    let dataset = state
        .store
        .update_dataset(&scope, project_id, dataset_id, update)
        .await
        .map_err(|e| ApiError::store("Failed to update dataset", e))?
        .ok_or_else(|| ApiError::not_found("Dataset not found"))?;

    Ok(Json(json!({ "dataset": dataset })))
}

/// `DELETE /api/projects/:project_id/datasets/:dataset_id`
pub async fn delete_dataset<S: Store>(
    State(state): State<AppState<S>>,
    Extension(scope): Extension<TenantScope>,
    RawPath((project_id, dataset_id)): RawPath<(String, String)>,
) -> Result<Json<Value>, ApiError> {
    let [project_id, dataset_id] = validation::parse_ids([
        ("project ID", project_id.as_str()),
        ("dataset ID", dataset_id.as_str()),
    ])?;

    let deleted = state
        .store
        .delete_dataset(&scope, project_id, dataset_id)
        .await
        .map_err(|e| ApiError::store("Failed to delete dataset", e))?;

    if !deleted {
        return Err(ApiError::not_found("Dataset not found"));
    }

    tracing::info!(tenant_id = scope.tenant_id(), project_id, dataset_id, "Dataset deleted");
    Ok(Json(json!({ "success": true })))
}

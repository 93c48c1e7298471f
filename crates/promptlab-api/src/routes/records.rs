//! Dataset record endpoints.
//!
//! Records can be created from a ready-made `variables` object or from flat
//! `fields` (dotted path → raw string), which are run through the variable
//! builder using the dataset's schema.

use axum::{
    extract::{rejection::JsonRejection, State},
    Extension, Json,
};
use promptlab_core::{validation, variables::build_variables, TenantScope};
use promptlab_storage::Store;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;

use super::RawPath;
use crate::{error::ApiError, AppState};

#[derive(Debug, Deserialize)]
pub struct CreateRecordRequest {
    pub variables: Option<Value>,
    pub fields: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteRecordsRequest {
    #[serde(default)]
    pub record_ids: Value,
}

fn parse_dataset_path(project_id: &str, dataset_id: &str) -> Result<(i64, i64), ApiError> {
    let [project_id, dataset_id] =
        validation::parse_ids([("project ID", project_id), ("dataset ID", dataset_id)])?;
    Ok((project_id, dataset_id))
}

/// `GET /api/projects/:project_id/datasets/:dataset_id/records`
pub async fn list_records<S: Store>(
    State(state): State<AppState<S>>,
    Extension(scope): Extension<TenantScope>,
    RawPath((project_id, dataset_id)): RawPath<(String, String)>,
) -> Result<Json<Value>, ApiError> {
    let (project_id, dataset_id) = parse_dataset_path(&project_id, &dataset_id)?;

    let records = state
        .store
        .list_records(&scope, project_id, dataset_id)
        .await
        .map_err(|e| ApiError::store("Failed to fetch records", e))?
        .ok_or_else(|| ApiError::not_found("Dataset not found"))?;

    Ok(Json(json!({ "records": records })))
}

/// `POST /api/projects/:project_id/datasets/:dataset_id/records`
pub async fn create_record<S: Store>(
    State(state): State<AppState<S>>,
    Extension(scope): Extension<TenantScope>,
    RawPath((project_id, dataset_id)): RawPath<(String, String)>,
    body: Result<Json<CreateRecordRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let (project_id, dataset_id) = parse_dataset_path(&project_id, &dataset_id)?;
    let Json(req) = body?;

    let variables = match (req.variables, req.fields) {
        (Some(variables @ Value::Object(_)), _) => variables,
        (None, Some(fields)) => {
            let dataset = state
                .store
                .get_dataset(&scope, project_id, dataset_id)
                .await
                .map_err(|e| ApiError::store("Failed to create record", e))?
                .ok_or_else(|| ApiError::not_found("Dataset not found"))?;
            Value::Object(build_variables(&fields, &dataset.schema)?)
        }
        _ => return Err(ApiError::invalid("Variables must be an object")),
    };

    let record = state
        .store
        .create_record(&scope, project_id, dataset_id, variables)
        .await
        .map_err(|e| ApiError::store("Failed to create record", e))?
        .ok_or_else(|| ApiError::not_found("Dataset not found"))?;

    tracing::debug!(
        tenant_id = scope.tenant_id(),
        dataset_id,
        record_id = record.id,
        "Record created"
    );
    Ok(Json(json!({ "record": record })))
}

/// `DELETE /api/projects/:project_id/datasets/:dataset_id/records`
///
/// Non-integer entries of `recordIds` are dropped before the store is called.
pub async fn delete_records<S: Store>(
    State(state): State<AppState<S>>,
    Extension(scope): Extension<TenantScope>,
    RawPath((project_id, dataset_id)): RawPath<(String, String)>,
    body: Result<Json<DeleteRecordsRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let (project_id, dataset_id) = parse_dataset_path(&project_id, &dataset_id)?;
    let Json(req) = body?;

    let record_ids = req
        .record_ids
        .as_array()
        .map(|values| validation::filter_integer_ids(values))
        .unwrap_or_default();
    if record_ids.is_empty() {
        return Err(ApiError::invalid("Record IDs are required"));
    }

    let deleted = state
        .store
        .delete_records(&scope, project_id, dataset_id, &record_ids)
        .await
        .map_err(|e| ApiError::store("Failed to delete records", e))?;

    tracing::info!(
        tenant_id = scope.tenant_id(),
        project_id,
        dataset_id,
        deleted,
        "Records deleted"
    );
    Ok(Json(json!({ "success": true, "deleted": deleted })))
}

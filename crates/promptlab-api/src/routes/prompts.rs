//! Prompt, prompt version and prompt router endpoints.

use axum::{
    extract::{rejection::JsonRejection, State},
    Extension, Json,
};
use promptlab_core::{
    validation, NewPrompt, NewPromptVersion, PromptUpdate, TenantScope,
};
use promptlab_storage::{RouterUpdate, Store};
use serde::Deserialize;
use serde_json::{json, Value};

use super::RawPath;
use crate::{error::ApiError, AppState};

#[derive(Debug, Deserialize)]
pub struct CreatePromptRequest {
    #[serde(default)]
    pub name: String,
    pub description: Option<String>,
    pub template: Option<String>,
    #[serde(default)]
    pub config: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateVersionRequest {
    pub template: Option<String>,
    #[serde(default)]
    pub config: Value,
    pub commit_message: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SetRouterRequest {
    #[serde(default)]
    pub version: Value,
}

fn parse_prompt_path(project_id: &str, prompt_id: &str) -> Result<(i64, i64), ApiError> {
    let [project_id, prompt_id] =
        validation::parse_ids([("project ID", project_id), ("prompt ID", prompt_id)])?;
    Ok((project_id, prompt_id))
}

/// Router versions may be sent as a JSON number or a digit string.
fn parse_router_version(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().filter(|v| *v > 0),
        Value::String(s) => validation::parse_resource_id(s),
        _ => None,
    }
}

// ============================================================================
// Prompts
// ============================================================================

/// `GET /api/projects/:project_id/prompts`
pub async fn list_prompts<S: Store>(
    State(state): State<AppState<S>>,
    Extension(scope): Extension<TenantScope>,
    RawPath(project_id): RawPath<String>,
) -> Result<Json<Value>, ApiError> {
    let [project_id] = validation::parse_ids([("project ID", project_id.as_str())])?;

    let prompts = state
        .store
        .list_prompts(&scope, project_id)
        .await
        .map_err(|e| ApiError::store("Failed to fetch prompts", e))?;

    Ok(Json(json!({ "prompts": prompts })))
}

/// `POST /api/projects/:project_id/prompts`
///
/// Creates version 1 from `template` and points the router at it.
pub async fn create_prompt<S: Store>(
    State(state): State<AppState<S>>,
    Extension(scope): Extension<TenantScope>,
    RawPath(project_id): RawPath<String>,
    body: Result<Json<CreatePromptRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let [project_id] = validation::parse_ids([("project ID", project_id.as_str())])?;
    let Json(req) = body?;
    validation::validate_name(&req.name, "Prompt name")?;
    let template = req
        .template
        .ok_or_else(|| ApiError::invalid("Template is required"))?;

    let prompt = state
        .store
        .create_prompt(
            &scope,
            project_id,
            NewPrompt {
                name: req.name.trim().to_string(),
                description: req.description,
                template,
                config: req.config,
            },
        )
        .await
        .map_err(|e| ApiError::store("Failed to create prompt", e))?
        .ok_or_else(|| ApiError::not_found("Project not found"))?;

    tracing::info!(
        tenant_id = scope.tenant_id(),
        project_id,
        prompt_id = prompt.id,
        "Prompt created"
    );
    Ok(Json(json!({ "prompt": prompt })))
}

/// `GET /api/projects/:project_id/prompts/:prompt_id`
pub async fn get_prompt<S: Store>(
    State(state): State<AppState<S>>,
    Extension(scope): Extension<TenantScope>,
    RawPath((project_id, prompt_id)): RawPath<(String, String)>,
) -> Result<Json<Value>, ApiError> {
    let (project_id, prompt_id) = parse_prompt_path(&project_id, &prompt_id)?;

    let prompt = state
        .store
        .get_prompt(&scope, project_id, prompt_id)
        .await
        .map_err(|e| ApiError::store("Failed to fetch prompt", e))?
        .ok_or_else(|| ApiError::not_found("Prompt not found"))?;

    Ok(Json(json!({ "prompt": prompt })))
}

/// `PUT /api/projects/:project_id/prompts/:prompt_id`
pub async fn update_prompt<S: Store>(
    State(state): State<AppState<S>>,
    Extension(scope): Extension<TenantScope>,
    RawPath((project_id, prompt_id)): RawPath<(String, String)>,
    body: Result<Json<PromptUpdate>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let (project_id, prompt_id) = parse_prompt_path(&project_id, &prompt_id)?;
    let Json(mut update) = body?;
    if let Some(name) = update.name.as_deref() {
        validation::validate_name(name, "Prompt name")?;
        update.name = Some(name.trim().to_string());
    }

    let prompt = state
        .store
        .update_prompt(&scope, project_id, prompt_id, update)
        .await
        .map_err(|e| ApiError::store("Failed to update prompt", e))?
        .ok_or_else(|| ApiError::not_found("Prompt not found"))?;

    Ok(Json(json!({ "prompt": prompt })))
}

// ============================================================================
// Versions
// ============================================================================

/// `GET /api/projects/:project_id/prompts/:prompt_id/versions`
pub async fn list_versions<S: Store>(
    State(state): State<AppState<S>>,
    Extension(scope): Extension<TenantScope>,
    RawPath((project_id, prompt_id)): RawPath<(String, String)>,
) -> Result<Json<Value>, ApiError> {
    let (project_id, prompt_id) = parse_prompt_path(&project_id, &prompt_id)?;

    let versions = state
        .store
        .list_versions(&scope, project_id, prompt_id)
        .await
        .map_err(|e| ApiError::store("Failed to fetch prompt versions", e))?
        .ok_or_else(|| ApiError::not_found("Prompt not found"))?;

    Ok(Json(json!({ "versions": versions })))
}

/// `POST /api/projects/:project_id/prompts/:prompt_id/versions`
pub async fn create_version<S: Store>(
    State(state): State<AppState<S>>,
    Extension(scope): Extension<TenantScope>,
    RawPath((project_id, prompt_id)): RawPath<(String, String)>,
    body: Result<Json<CreateVersionRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let (project_id, prompt_id) = parse_prompt_path(&project_id, &prompt_id)?;
    let Json(req) = body?;
    let template = req
        .template
        .ok_or_else(|| ApiError::invalid("Template is required"))?;

    let version = state
        .store
        .create_version(
            &scope,
            project_id,
            prompt_id,
            NewPromptVersion {
                template,
                config: req.config,
                commit_message: req.commit_message,
            },
        )
        .await
        .map_err(|e| ApiError::store("Failed to create prompt version", e))?
        .ok_or_else(|| ApiError::not_found("Prompt not found"))?;

    tracing::info!(
        tenant_id = scope.tenant_id(),
        prompt_id,
        version = version.version,
        "Prompt version created"
    );
    Ok(Json(json!({ "version": version })))
}

/// `GET /api/projects/:project_id/prompts/:prompt_id/versions/:version`
pub async fn get_version<S: Store>(
    State(state): State<AppState<S>>,
    Extension(scope): Extension<TenantScope>,
    RawPath((project_id, prompt_id, version)): RawPath<(String, String, String)>,
) -> Result<Json<Value>, ApiError> {
    let [project_id, prompt_id, version] = validation::parse_ids([
        ("project ID", project_id.as_str()),
        ("prompt ID", prompt_id.as_str()),
        ("version", version.as_str()),
    ])?;

    let version = state
        .store
        .get_version(&scope, project_id, prompt_id, version)
        .await
        .map_err(|e| ApiError::store("Failed to fetch prompt version", e))?
        .ok_or_else(|| ApiError::not_found("Prompt version not found"))?;

    Ok(Json(json!({ "version": version })))
}

// ============================================================================
// Router
// ============================================================================

/// `GET /api/projects/:project_id/prompts/:prompt_id/router`
pub async fn get_router<S: Store>(
    State(state): State<AppState<S>>,
    Extension(scope): Extension<TenantScope>,
    RawPath((project_id, prompt_id)): RawPath<(String, String)>,
) -> Result<Json<Value>, ApiError> {
    let (project_id, prompt_id) = parse_prompt_path(&project_id, &prompt_id)?;

    let router = state
        .store
        .get_router(&scope, project_id, prompt_id)
        .await
        .map_err(|e| ApiError::store("Failed to fetch prompt router", e))?
        .ok_or_else(|| ApiError::not_found("Prompt not found"))?;

    Ok(Json(json!({ "router": router })))
}

/// `PUT /api/projects/:project_id/prompts/:prompt_id/router`
pub async fn set_router<S: Store>(
    State(state): State<AppState<S>>,
    Extension(scope): Extension<TenantScope>,
    RawPath((project_id, prompt_id)): RawPath<(String, String)>,
    body: Result<Json<SetRouterRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let (project_id, prompt_id) = parse_prompt_path(&project_id, &prompt_id)?;
    let Json(req) = body?;
    let version =
        parse_router_version(&req.version).ok_or_else(|| ApiError::invalid("Invalid version"))?;

    let update = state
        .store
        .set_router(&scope, project_id, prompt_id, version)
        .await
        .map_err(|e| ApiError::store("Failed to update prompt router", e))?;

    match update {
        RouterUpdate::Updated(router) => {
            tracing::info!(
                tenant_id = scope.tenant_id(),
                prompt_id,
                version,
                "Prompt router updated"
            );
            Ok(Json(json!({ "router": router })))
        }
        RouterUpdate::PromptNotFound => Err(ApiError::not_found("Prompt not found")),
        RouterUpdate::VersionNotFound => Err(ApiError::not_found("Prompt version not found")),
    }
}

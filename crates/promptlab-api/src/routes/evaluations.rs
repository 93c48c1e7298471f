//! Evaluation log endpoints.

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Query, State,
    },
    Extension, Json,
};
use promptlab_core::{
    validation, EvaluationLog, EvaluationLogQuery, NewEvaluationLog, TenantScope,
};
use promptlab_storage::Store;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::HashMap;

use super::RawPath;
use crate::{error::ApiError, AppState};

/// Paged listing response
#[derive(Debug, Serialize)]
pub struct EvaluationLogListResponse {
    pub logs: Vec<EvaluationLog>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

/// Parse `limit`, `offset` and `promptId` query parameters.
fn parse_log_query(params: &HashMap<String, String>) -> Result<EvaluationLogQuery, ApiError> {
    let (limit, offset) = validation::validate_page(
        params.get("limit").map(String::as_str),
        params.get("offset").map(String::as_str),
    )?;

    let prompt_id = match params.get("promptId") {
        Some(raw) => Some(
            validation::parse_resource_id(raw)
                .ok_or_else(|| ApiError::invalid("Invalid prompt ID"))?,
        ),
        None => None,
    };

    Ok(EvaluationLogQuery {
        prompt_id,
        limit,
        offset,
    })
}

/// `GET /api/projects/:project_id/evaluations?limit&offset&promptId`
pub async fn list_evaluation_logs<S: Store>(
    State(state): State<AppState<S>>,
    Extension(scope): Extension<TenantScope>,
    RawPath(project_id): RawPath<String>,
    query: Result<Query<HashMap<String, String>>, QueryRejection>,
) -> Result<Json<EvaluationLogListResponse>, ApiError> {
    let [project_id] = validation::parse_ids([("project ID", project_id.as_str())])?;
    let Query(params) =
        query.map_err(|_| ApiError::invalid("Invalid pagination parameters"))?;
    let query = parse_log_query(&params)?;

    let page = state
        .store
        .list_evaluation_logs(&scope, project_id, query)
        .await
        .map_err(|e| ApiError::store("Failed to fetch evaluation logs", e))?;

    Ok(Json(EvaluationLogListResponse {
        logs: page.logs,
        total: page.total,
        limit: query.limit,
        offset: query.offset,
    }))
}

/// `POST /api/projects/:project_id/evaluations`
pub async fn create_evaluation_log<S: Store>(
    State(state): State<AppState<S>>,
    Extension(scope): Extension<TenantScope>,
    RawPath(project_id): RawPath<String>,
    body: Result<Json<NewEvaluationLog>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let [project_id] = validation::parse_ids([("project ID", project_id.as_str())])?;
    let Json(log) = body?;

    // A version only means something relative to a prompt
    if log
        .prompt_version
        .is_some_and(|v| v <= 0 || log.prompt_id.is_none())
    {
        return Err(ApiError::invalid("Invalid version"));
    }

    let log = state
        .store
        .create_evaluation_log(&scope, project_id, log)
        .await
        .map_err(|e| ApiError::store("Failed to create evaluation log", e))?
        .ok_or_else(|| ApiError::not_found("Project not found"))?;

    tracing::debug!(
        tenant_id = scope.tenant_id(),
        project_id,
        log_id = log.id,
        "Evaluation log created"
    );
    Ok(Json(json!({ "log": log })))
}

/// `GET /api/projects/:project_id/evaluations/:evaluation_id`
pub async fn get_evaluation_log<S: Store>(
    State(state): State<AppState<S>>,
    Extension(scope): Extension<TenantScope>,
    RawPath((project_id, evaluation_id)): RawPath<(String, String)>,
) -> Result<Json<Value>, ApiError> {
    let [project_id, evaluation_id] = validation::parse_ids([
        ("project ID", project_id.as_str()),
        ("evaluation ID", evaluation_id.as_str()),
    ])?;

    let log = state
        .store
        .get_evaluation_log(&scope, project_id, evaluation_id)
        .await
        .map_err(|e| ApiError::store("Failed to fetch evaluation log", e))?
        .ok_or_else(|| ApiError::not_found("Evaluation log not found"))?;

    Ok(Json(json!({ "log": log })))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_parse_log_query_defaults() {
        let query = parse_log_query(&params(&[])).unwrap();
        assert_eq!(query, EvaluationLogQuery::default());
    }

    #[test]
    fn test_parse_log_query_bounds() {
        assert!(parse_log_query(&params(&[("limit", "100")])).is_ok());
        assert!(parse_log_query(&params(&[("limit", "101")])).is_err());
        assert!(parse_log_query(&params(&[("limit", "0")])).is_err());
        assert!(parse_log_query(&params(&[("offset", "-1")])).is_err());
        assert!(parse_log_query(&params(&[("limit", "ten")])).is_err());
    }

    #[test]
    fn test_parse_log_query_prompt_filter() {
        let query = parse_log_query(&params(&[("promptId", "7")])).unwrap();
        assert_eq!(query.prompt_id, Some(7));
        assert!(parse_log_query(&params(&[("promptId", "x")])).is_err());
    }
}

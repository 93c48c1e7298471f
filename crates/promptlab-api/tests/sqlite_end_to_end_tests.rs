//! End-to-end tests over a real SQLite database.
//!
//! Sessions are issued through the store, so these tests exercise token
//! lookup, expiry and tenant scoping in SQL rather than in the fake.

#![cfg(feature = "test-utils")]

use axum::http::StatusCode;
use chrono::Duration;
use promptlab_api::test_utils::{send_request, SqliteTestApp};
use promptlab_core::SENTINEL_TENANT_ID;
use serde_json::{json, Value};

const TENANT_ONE: i64 = 1;
const TENANT_TWO: i64 = 2;

async fn create(app: &SqliteTestApp, token: &str, path: &str, body: Value) -> Value {
    let (status, body) = send_request(app.router(), "POST", path, Some(body), Some(token)).await;
    assert_eq!(status, StatusCode::OK, "POST {} failed: {}", path, body);
    body
}

#[tokio::test]
async fn test_full_workflow() {
    let app = SqliteTestApp::new().await.unwrap();
    let token = app.session_for("alice", TENANT_ONE).await.unwrap();

    let body = create(&app, &token, "/api/projects", json!({ "name": "Support" })).await;
    let project_id = body["project"]["id"].as_i64().unwrap();

    // Dataset with a schema, record built from form fields
    let body = create(
        &app,
        &token,
        &format!("/api/projects/{}/datasets", project_id),
        json!({
            "name": "tickets",
            "schema": {
                "user.age": { "type": "number" },
                "user.vip": { "type": "boolean" },
                "tags": { "type": "array" }
            }
        }),
    )
    .await;
    let dataset_id = body["dataset"]["id"].as_i64().unwrap();
    let records = format!(
        "/api/projects/{}/datasets/{}/records",
        project_id, dataset_id
    );

    let body = create(
        &app,
        &token,
        &records,
        json!({ "fields": { "user.age": "30", "user.vip": "true", "tags": "a, b" } }),
    )
    .await;
    assert_eq!(
        body["record"]["variables"],
        json!({ "user": { "age": 30, "vip": true }, "tags": ["a", "b"] })
    );
    let first = body["record"]["id"].as_i64().unwrap();

    let body = create(
        &app,
        &token,
        &records,
        json!({ "variables": { "question": "Where is my order?" } }),
    )
    .await;
    let second = body["record"]["id"].as_i64().unwrap();

    let (_, body) = send_request(app.router(), "GET", &records, None, Some(token.as_str())).await;
    assert_eq!(body["records"].as_array().unwrap().len(), 2);

    let (status, body) = send_request(
        app.router(),
        "DELETE",
        &records,
        Some(json!({ "recordIds": [first, "nope", second, 987654] })),
        Some(token.as_str()),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["deleted"], 2);

    // Prompt with versions and router
    let body = create(
        &app,
        &token,
        &format!("/api/projects/{}/prompts", project_id),
        json!({ "name": "triage", "template": "Classify: {{question}}", "config": { "temperature": 0 } }),
    )
    .await;
    let prompt_id = body["prompt"]["id"].as_i64().unwrap();
    let prompt = format!("/api/projects/{}/prompts/{}", project_id, prompt_id);

    let body = create(
        &app,
        &token,
        &format!("{}/versions", prompt),
        json!({ "template": "Classify briefly: {{question}}" }),
    )
    .await;
    assert_eq!(body["version"]["version"], 2);
    assert_eq!(body["version"]["createdBy"], "alice");

    let (_, body) = send_request(app.router(), "GET", &prompt, None, Some(token.as_str())).await;
    assert_eq!(body["prompt"]["latestVersion"], 2);

    let (_, body) =
        send_request(app.router(), "GET", &format!("{}/versions", prompt), None, Some(token.as_str()))
            .await;
    let versions: Vec<i64> = body["versions"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v["version"].as_i64().unwrap())
        .collect();
    assert_eq!(versions, vec![1, 2]);

    let (status, body) = send_request(
        app.router(),
        "PUT",
        &format!("{}/router", prompt),
        Some(json!({ "version": 2 })),
        Some(token.as_str()),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["router"]["version"], 2);

    // Evaluation logs
    let evaluations = format!("/api/projects/{}/evaluations", project_id);
    for score in [0.25, 0.5, 0.75] {
        create(
            &app,
            &token,
            &evaluations,
            json!({
                "promptId": prompt_id,
                "promptVersion": 2,
                "input": { "question": "?" },
                "output": "billing",
                "score": score
            }),
        )
        .await;
    }

    let (status, body) = send_request(
        app.router(),
        "GET",
        &format!("{}?limit=2&offset=1", evaluations),
        None,
        Some(token.as_str()),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 3);
    let logs = body["logs"].as_array().unwrap();
    assert_eq!(logs.len(), 2);
    // Newest first, so offset 1 skips the 0.75 run
    assert_eq!(logs[0]["score"], 0.5);

    let log_id = logs[0]["id"].as_i64().unwrap();
    let (status, body) = send_request(
        app.router(),
        "GET",
        &format!("{}/{}", evaluations, log_id),
        None,
        Some(token.as_str()),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["log"]["output"], "billing");

    let (status, body) = send_request(
        app.router(),
        "POST",
        &evaluations,
        Some(json!({ "promptId": prompt_id, "promptVersion": 7 })),
        Some(token.as_str()),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Prompt version not found");
}

#[tokio::test]
async fn test_tenants_are_isolated() {
    let app = SqliteTestApp::new().await.unwrap();
    let owner = app.session_for("alice", TENANT_ONE).await.unwrap();
    let intruder = app.session_for("mallory", TENANT_TWO).await.unwrap();

    let body = create(&app, &owner, "/api/projects", json!({ "name": "Private" })).await;
    let project_id = body["project"]["id"].as_i64().unwrap();
    let body = create(
        &app,
        &owner,
        &format!("/api/projects/{}/datasets", project_id),
        json!({ "name": "secrets" }),
    )
    .await;
    let dataset_id = body["dataset"]["id"].as_i64().unwrap();

    let (_, body) = send_request(app.router(), "GET", "/api/projects", None, Some(intruder.as_str())).await;
    assert_eq!(body["projects"], json!([]));

    let (status, _) = send_request(
        app.router(),
        "GET",
        &format!("/api/projects/{}/datasets/{}", project_id, dataset_id),
        None,
        Some(intruder.as_str()),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send_request(
        app.router(),
        "POST",
        &format!("/api/projects/{}/datasets", project_id),
        Some(json!({ "name": "planted" })),
        Some(intruder.as_str()),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send_request(
        app.router(),
        "PUT",
        &format!("/api/projects/{}/datasets/{}", project_id, dataset_id),
        Some(json!({ "name": "pwned" })),
        Some(intruder.as_str()),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, body) = send_request(
        app.router(),
        "GET",
        &format!("/api/projects/{}/datasets/{}", project_id, dataset_id),
        None,
        Some(owner.as_str()),
    )
    .await;
    assert_eq!(body["dataset"]["name"], "secrets");
}

#[tokio::test]
async fn test_expired_and_revoked_sessions() {
    let app = SqliteTestApp::new().await.unwrap();

    let (expired, _) = app
        .store()
        .create_session("alice", TENANT_ONE, Some(Duration::seconds(-5)))
        .await
        .unwrap();
    let (status, body) = send_request(
        app.router(),
        "GET",
        "/api/projects",
        None,
        Some(expired.session_id.as_str()),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Authentication required");

    let token = app.session_for("alice", TENANT_ONE).await.unwrap();
    let (status, _) = send_request(app.router(), "GET", "/api/projects", None, Some(token.as_str())).await;
    assert_eq!(status, StatusCode::OK);

    assert!(app.store().revoke_session(&token).await.unwrap());
    let (status, _) = send_request(app.router(), "GET", "/api/projects", None, Some(token.as_str())).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_sentinel_session_is_rejected() {
    let app = SqliteTestApp::new().await.unwrap();
    let token = app.session_for("nobody", SENTINEL_TENANT_ID).await.unwrap();

    let (status, body) = send_request(app.router(), "GET", "/api/projects", None, Some(token.as_str())).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Invalid tenant");
}

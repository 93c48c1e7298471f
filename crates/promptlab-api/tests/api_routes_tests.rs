//! Route-level tests against the in-memory store.
//!
//! Covers path validation, response shapes, the record variable builder and
//! store failure handling. Tenant isolation lives in
//! `security_integration_tests.rs`.

#![cfg(feature = "test-utils")]

use axum::http::StatusCode;
use promptlab_api::test_utils::{send_request, TestApp, TENANT_A, TENANT_A_TOKEN};
use promptlab_core::{DatasetSchema, FieldType, SchemaField};
use serde_json::{json, Value};

/// Every tenant-scoped route, with `{p}` `{d}` `{q}` `{v}` `{e}` placeholders.
const ROUTES: &[(&str, &str)] = &[
    ("GET", "/api/projects"),
    ("POST", "/api/projects"),
    ("GET", "/api/projects/{p}"),
    ("GET", "/api/projects/{p}/datasets"),
    ("POST", "/api/projects/{p}/datasets"),
    ("GET", "/api/projects/{p}/datasets/{d}"),
    ("PUT", "/api/projects/{p}/datasets/{d}"),
    ("DELETE", "/api/projects/{p}/datasets/{d}"),
    ("GET", "/api/projects/{p}/datasets/{d}/records"),
    ("POST", "/api/projects/{p}/datasets/{d}/records"),
    ("DELETE", "/api/projects/{p}/datasets/{d}/records"),
    ("GET", "/api/projects/{p}/prompts"),
    ("POST", "/api/projects/{p}/prompts"),
    ("GET", "/api/projects/{p}/prompts/{q}"),
    ("PUT", "/api/projects/{p}/prompts/{q}"),
    ("GET", "/api/projects/{p}/prompts/{q}/versions"),
    ("POST", "/api/projects/{p}/prompts/{q}/versions"),
    ("GET", "/api/projects/{p}/prompts/{q}/versions/{v}"),
    ("GET", "/api/projects/{p}/prompts/{q}/router"),
    ("PUT", "/api/projects/{p}/prompts/{q}/router"),
    ("GET", "/api/projects/{p}/evaluations"),
    ("POST", "/api/projects/{p}/evaluations"),
    ("GET", "/api/projects/{p}/evaluations/{e}"),
];

fn fill(template: &str, id: &str) -> String {
    template
        .replace("{p}", id)
        .replace("{d}", id)
        .replace("{q}", id)
        .replace("{v}", id)
        .replace("{e}", id)
}

/// A body each write route accepts, so only the path decides the outcome.
fn valid_body(method: &str, template: &str) -> Option<Value> {
    match method {
        "GET" => None,
        _ if template.ends_with("/records") && method == "DELETE" => {
            Some(json!({ "recordIds": [1] }))
        }
        _ if template.ends_with("/records") => Some(json!({ "variables": {} })),
        _ if template.ends_with("/router") => Some(json!({ "version": 1 })),
        _ if template.ends_with("/versions") => Some(json!({ "template": "Hi" })),
        _ if template.ends_with("/prompts") => {
            Some(json!({ "name": "greeting", "template": "Hi" }))
        }
        _ if template.ends_with("/evaluations") => Some(json!({ "input": {} })),
        "DELETE" => None,
        _ => Some(json!({ "name": "thing" })),
    }
}

// ============================================================================
// Path validation
// ============================================================================

#[tokio::test]
async fn test_invalid_ids_return_400_without_store_calls() {
    for bad in ["abc", "0", "-1", "1.5", "12abc"] {
        for (method, template) in ROUTES.iter().filter(|(_, t)| t.contains('{')) {
            let app = TestApp::new();
            let path = fill(template, bad);

            let (status, body) = send_request(
                app.router(),
                method,
                &path,
                valid_body(method, template),
                Some(TENANT_A_TOKEN),
            )
            .await;

            assert_eq!(status, StatusCode::BAD_REQUEST, "{} {}", method, path);
            let message = body["error"].as_str().unwrap_or_default();
            assert!(message.starts_with("Invalid "), "{} {}: {}", method, path, message);
            assert!(
                app.store().calls().is_empty(),
                "{} {} reached the store",
                method,
                path
            );
        }
    }
}

#[tokio::test]
async fn test_invalid_id_message_names_every_role() {
    let app = TestApp::new();

    let (_, body) = send_request(
        app.router(),
        "GET",
        "/api/projects/1/datasets/x",
        None,
        Some(TENANT_A_TOKEN),
    )
    .await;
    assert_eq!(body["error"], "Invalid project ID or dataset ID");

    let (_, body) = send_request(
        app.router(),
        "GET",
        "/api/projects/x/prompts/1/versions/1",
        None,
        Some(TENANT_A_TOKEN),
    )
    .await;
    assert_eq!(body["error"], "Invalid project ID, prompt ID or version");

    let (_, body) = send_request(
        app.router(),
        "GET",
        "/api/projects/nope",
        None,
        Some(TENANT_A_TOKEN),
    )
    .await;
    assert_eq!(body["error"], "Invalid project ID");
}

// ============================================================================
// Projects and datasets
// ============================================================================

#[tokio::test]
async fn test_project_create_and_fetch() {
    let app = TestApp::new();

    let (status, body) = send_request(
        app.router(),
        "POST",
        "/api/projects",
        Some(json!({ "name": "  Support bot " })),
        Some(TENANT_A_TOKEN),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["project"]["name"], "Support bot");
    assert_eq!(body["project"]["tenantId"], TENANT_A);

    let id = body["project"]["id"].as_i64().unwrap();
    let (status, body) = send_request(
        app.router(),
        "GET",
        &format!("/api/projects/{}", id),
        None,
        Some(TENANT_A_TOKEN),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["project"]["id"], id);

    let (status, body) =
        send_request(app.router(), "GET", "/api/projects", None, Some(TENANT_A_TOKEN)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["projects"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_project_name_required() {
    let app = TestApp::new();

    let (status, body) = send_request(
        app.router(),
        "POST",
        "/api/projects",
        Some(json!({ "name": "   " })),
        Some(TENANT_A_TOKEN),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Project name is required");
    assert!(app.store().calls_for("create_project").is_empty());
}

#[tokio::test]
async fn test_missing_project_is_404() {
    let app = TestApp::new();

    let (status, body) =
        send_request(app.router(), "GET", "/api/projects/999", None, Some(TENANT_A_TOKEN)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Project not found");

    let (status, body) = send_request(
        app.router(),
        "POST",
        "/api/projects/999/datasets",
        Some(json!({ "name": "faq" })),
        Some(TENANT_A_TOKEN),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Project not found");
}

#[tokio::test]
async fn test_dataset_lifecycle() {
    let app = TestApp::new();
    let project = app.store().insert_project(TENANT_A, "bot");
    let base = format!("/api/projects/{}/datasets", project.id);

    let (status, body) = send_request(
        app.router(),
        "POST",
        &base,
        Some(json!({
            "name": "faq",
            "schema": { "question": { "type": "string" } }
        })),
        Some(TENANT_A_TOKEN),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["dataset"]["schema"]["question"]["type"], "string");
    let dataset_id = body["dataset"]["id"].as_i64().unwrap();
    let item = format!("{}/{}", base, dataset_id);

    let (status, body) = send_request(
        app.router(),
        "PUT",
        &item,
        Some(json!({ "description": "Frequently asked" })),
        Some(TENANT_A_TOKEN),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["dataset"]["name"], "faq");
    assert_eq!(body["dataset"]["description"], "Frequently asked");

    let (status, body) =
        send_request(app.router(), "DELETE", &item, None, Some(TENANT_A_TOKEN)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);

    let (status, body) = send_request(app.router(), "GET", &item, None, Some(TENANT_A_TOKEN)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Dataset not found");

    let (status, _) = send_request(app.router(), "DELETE", &item, None, Some(TENANT_A_TOKEN)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// ============================================================================
// Records
// ============================================================================

#[tokio::test]
async fn test_record_from_fields_uses_dataset_schema() {
    let app = TestApp::new();
    let project = app.store().insert_project(TENANT_A, "bot");
    let mut schema = DatasetSchema::new();
    schema.insert("user.age".into(), SchemaField::new(FieldType::Number));
    schema.insert("tags".into(), SchemaField::new(FieldType::Array));
    let dataset = app.store().insert_dataset(project.id, "users", schema);
    let path = format!(
        "/api/projects/{}/datasets/{}/records",
        project.id, dataset.id
    );

    let (status, body) = send_request(
        app.router(),
        "POST",
        &path,
        Some(json!({ "fields": { "user.age": "30", "tags": "a,b,c" } })),
        Some(TENANT_A_TOKEN),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body["record"]["variables"],
        json!({ "user": { "age": 30 }, "tags": ["a", "b", "c"] })
    );

    let (status, body) = send_request(
        app.router(),
        "POST",
        &path,
        Some(json!({ "fields": { "user.age": "" } })),
        Some(TENANT_A_TOKEN),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["record"]["variables"], json!({}));
}

#[tokio::test]
async fn test_record_fields_with_conflicting_paths() {
    let app = TestApp::new();
    let project = app.store().insert_project(TENANT_A, "bot");
    let dataset = app
        .store()
        .insert_dataset(project.id, "users", DatasetSchema::new());

    let (status, body) = send_request(
        app.router(),
        "POST",
        &format!(
            "/api/projects/{}/datasets/{}/records",
            project.id, dataset.id
        ),
        Some(json!({ "fields": { "user": "bob", "user.age": "30" } })),
        Some(TENANT_A_TOKEN),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"]
        .as_str()
        .unwrap()
        .starts_with("Conflicting field path"));
    assert!(app.store().calls_for("create_record").is_empty());
}

#[tokio::test]
async fn test_record_variables_must_be_object() {
    let app = TestApp::new();
    let project = app.store().insert_project(TENANT_A, "bot");
    let dataset = app
        .store()
        .insert_dataset(project.id, "users", DatasetSchema::new());
    let path = format!(
        "/api/projects/{}/datasets/{}/records",
        project.id, dataset.id
    );

    for body in [json!({ "variables": [1, 2] }), json!({ "variables": "x" }), json!({})] {
        let (status, resp) =
            send_request(app.router(), "POST", &path, Some(body), Some(TENANT_A_TOKEN)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(resp["error"], "Variables must be an object");
    }
    assert!(app.store().calls().is_empty());
}

#[tokio::test]
async fn test_delete_records_filters_non_integer_ids() {
    let app = TestApp::new();
    let project = app.store().insert_project(TENANT_A, "bot");
    let dataset = app
        .store()
        .insert_dataset(project.id, "users", DatasetSchema::new());
    let first = app.store().insert_record(dataset.id, json!({ "n": 1 }));
    let second = app.store().insert_record(dataset.id, json!({ "n": 2 }));
    let kept = app.store().insert_record(dataset.id, json!({ "n": 3 }));

    let (status, body) = send_request(
        app.router(),
        "DELETE",
        &format!(
            "/api/projects/{}/datasets/{}/records",
            project.id, dataset.id
        ),
        Some(json!({ "recordIds": [first.id, "x", second.id, null] })),
        Some(TENANT_A_TOKEN),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["deleted"], 2);

    let calls = app.store().calls_for("delete_records");
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].ids, vec![project.id, dataset.id, first.id, second.id]);
    assert_eq!(app.store().record_ids(dataset.id), vec![kept.id]);
}

#[tokio::test]
async fn test_delete_records_requires_ids() {
    let app = TestApp::new();
    let path = "/api/projects/1/datasets/2/records";

    for body in [
        json!({ "recordIds": [] }),
        json!({ "recordIds": ["x"] }),
        json!({ "recordIds": [null, true, 1.5] }),
        json!({ "recordIds": "1,2" }),
        json!({}),
    ] {
        let (status, resp) =
            send_request(app.router(), "DELETE", path, Some(body), Some(TENANT_A_TOKEN)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(resp["error"], "Record IDs are required");
    }
    assert!(app.store().calls_for("delete_records").is_empty());
}

// ============================================================================
// Prompts
// ============================================================================

#[tokio::test]
async fn test_prompt_versions_and_router() {
    let app = TestApp::new();
    let project = app.store().insert_project(TENANT_A, "bot");
    let base = format!("/api/projects/{}/prompts", project.id);

    let (status, body) = send_request(
        app.router(),
        "POST",
        &base,
        Some(json!({ "name": "greeting", "template": "Hello {{name}}" })),
        Some(TENANT_A_TOKEN),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["prompt"]["latestVersion"], 1);
    let prompt = format!("{}/{}", base, body["prompt"]["id"].as_i64().unwrap());

    let (status, body) = send_request(
        app.router(),
        "POST",
        &format!("{}/versions", prompt),
        Some(json!({ "template": "Hi {{name}}", "commitMessage": "shorter" })),
        Some(TENANT_A_TOKEN),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["version"]["version"], 2);
    assert_eq!(body["version"]["commitMessage"], "shorter");

    // New versions do not move the router
    let (_, body) = send_request(
        app.router(),
        "GET",
        &format!("{}/router", prompt),
        None,
        Some(TENANT_A_TOKEN),
    )
    .await;
    assert_eq!(body["router"]["version"], 1);

    let (status, body) = send_request(
        app.router(),
        "PUT",
        &format!("{}/router", prompt),
        Some(json!({ "version": "2" })),
        Some(TENANT_A_TOKEN),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["router"]["version"], 2);

    let (status, body) = send_request(
        app.router(),
        "PUT",
        &format!("{}/router", prompt),
        Some(json!({ "version": 9 })),
        Some(TENANT_A_TOKEN),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Prompt version not found");

    let (status, body) = send_request(
        app.router(),
        "PUT",
        &format!("{}/router", prompt),
        Some(json!({ "version": "latest" })),
        Some(TENANT_A_TOKEN),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid version");

    let (status, body) = send_request(
        app.router(),
        "GET",
        &format!("{}/versions/2", prompt),
        None,
        Some(TENANT_A_TOKEN),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["version"]["template"], "Hi {{name}}");
    assert_eq!(body["version"]["createdBy"], "alice");

    let (status, body) = send_request(
        app.router(),
        "GET",
        &format!("{}/versions/3", prompt),
        None,
        Some(TENANT_A_TOKEN),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Prompt version not found");
}

#[tokio::test]
async fn test_prompt_requires_template() {
    let app = TestApp::new();
    let project = app.store().insert_project(TENANT_A, "bot");

    let (status, body) = send_request(
        app.router(),
        "POST",
        &format!("/api/projects/{}/prompts", project.id),
        Some(json!({ "name": "greeting" })),
        Some(TENANT_A_TOKEN),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Template is required");
}

// ============================================================================
// Evaluation logs
// ============================================================================

#[tokio::test]
async fn test_evaluation_log_paging() {
    let app = TestApp::new();
    let project = app.store().insert_project(TENANT_A, "bot");
    let prompt = app.store().insert_prompt(project.id, "greeting", "Hello");
    let base = format!("/api/projects/{}/evaluations", project.id);

    for i in 0..3 {
        let (status, _) = send_request(
            app.router(),
            "POST",
            &base,
            Some(json!({
                "promptId": prompt.id,
                "promptVersion": 1,
                "input": { "i": i },
                "score": 0.5
            })),
            Some(TENANT_A_TOKEN),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }
    send_request(
        app.router(),
        "POST",
        &base,
        Some(json!({ "input": { "adhoc": true } })),
        Some(TENANT_A_TOKEN),
    )
    .await;

    let (status, body) = send_request(
        app.router(),
        "GET",
        &format!("{}?limit=2&offset=0&promptId={}", base, prompt.id),
        None,
        Some(TENANT_A_TOKEN),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 3);
    assert_eq!(body["limit"], 2);
    assert_eq!(body["offset"], 0);
    assert_eq!(body["logs"].as_array().unwrap().len(), 2);

    let (_, body) =
        send_request(app.router(), "GET", &base, None, Some(TENANT_A_TOKEN)).await;
    assert_eq!(body["total"], 4);
    assert_eq!(body["limit"], 50);
}

#[tokio::test]
async fn test_evaluation_log_bad_query() {
    let app = TestApp::new();

    for query in ["limit=0", "limit=101", "offset=-1", "limit=abc"] {
        let (status, body) = send_request(
            app.router(),
            "GET",
            &format!("/api/projects/1/evaluations?{}", query),
            None,
            Some(TENANT_A_TOKEN),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{}", query);
        assert_eq!(body["error"], "Invalid pagination parameters");
    }

    let (status, body) = send_request(
        app.router(),
        "GET",
        "/api/projects/1/evaluations?promptId=x",
        None,
        Some(TENANT_A_TOKEN),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid prompt ID");
    assert!(app.store().calls().is_empty());
}

#[tokio::test]
async fn test_evaluation_log_unknown_prompt() {
    let app = TestApp::new();
    let project = app.store().insert_project(TENANT_A, "bot");

    let (status, body) = send_request(
        app.router(),
        "POST",
        &format!("/api/projects/{}/evaluations", project.id),
        Some(json!({ "promptId": 424242 })),
        Some(TENANT_A_TOKEN),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Prompt not found");
}

#[tokio::test]
async fn test_evaluation_log_version_without_prompt_is_400() {
    let app = TestApp::new();
    let project = app.store().insert_project(TENANT_A, "bot");
    let path = format!("/api/projects/{}/evaluations", project.id);

    for body in [
        json!({ "promptVersion": 1 }),
        json!({ "promptVersion": 0, "promptId": 1 }),
    ] {
        let (status, response) =
            send_request(app.router(), "POST", &path, Some(body.clone()), Some(TENANT_A_TOKEN))
                .await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{}", body);
        assert_eq!(response["error"], "Invalid version");
    }
    assert!(app.store().calls().is_empty());
}

// ============================================================================
// Bodies and failures
// ============================================================================

#[tokio::test]
async fn test_malformed_body_is_400() {
    use axum::{body::Body, http::Request};
    use promptlab_api::test_utils::send_raw;

    let app = TestApp::new();
    let request = Request::builder()
        .method("POST")
        .uri("/api/projects")
        .header("content-type", "application/json")
        .header("authorization", format!("Bearer {}", TENANT_A_TOKEN))
        .body(Body::from("{not json"))
        .unwrap();

    let (status, body) = send_raw(app.router(), request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid request body");
    assert!(app.store().calls().is_empty());
}

#[tokio::test]
async fn test_store_failure_is_generic_500() {
    let app = TestApp::new();
    app.store().fail_with("SQLITE_CORRUPT: database disk image is malformed");

    let cases = [
        ("GET", "/api/projects", "Failed to fetch projects"),
        ("GET", "/api/projects/1/datasets", "Failed to fetch datasets"),
        ("GET", "/api/projects/1/datasets/2/records", "Failed to fetch records"),
        ("GET", "/api/projects/1/prompts", "Failed to fetch prompts"),
        ("GET", "/api/projects/1/evaluations", "Failed to fetch evaluation logs"),
    ];

    for (method, path, message) in cases {
        let (status, body) =
            send_request(app.router(), method, path, None, Some(TENANT_A_TOKEN)).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR, "{}", path);
        assert_eq!(body["error"], message);
        assert!(!body.to_string().contains("SQLITE_CORRUPT"));
    }
}

#[tokio::test]
async fn test_unknown_route_has_error_body() {
    let app = TestApp::new();

    for (method, path, token) in [
        ("GET", "/api/nope", Some(TENANT_A_TOKEN)),
        ("GET", "/api/projects/1/widgets", Some(TENANT_A_TOKEN)),
        ("GET", "/nothing-here", None),
    ] {
        let (status, body) = send_request(app.router(), method, path, None, token).await;
        assert_eq!(status, StatusCode::NOT_FOUND, "{} {}", method, path);
        assert_eq!(body, json!({ "error": "Not found" }));
    }
}

#[tokio::test]
async fn test_wrong_method_has_error_body() {
    let app = TestApp::new();

    for (method, path) in [
        ("PATCH", "/api/projects"),
        ("DELETE", "/api/projects/1/prompts/2/versions"),
        ("POST", "/health"),
    ] {
        let (status, body) =
            send_request(app.router(), method, path, None, Some(TENANT_A_TOKEN)).await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED, "{} {}", method, path);
        assert_eq!(body, json!({ "error": "Method not allowed" }));
    }
    assert!(app.store().calls().is_empty());
}

#[tokio::test]
async fn test_health_endpoints_need_no_session() {
    let app = TestApp::new();

    let (status, body) = send_request(app.router(), "GET", "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "ok");

    let (status, body) = send_request(app.router(), "GET", "/ready", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");

    app.store().fail_with("down");
    let (status, body) = send_request(app.router(), "GET", "/ready", None, None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["status"], "unhealthy");
}

//! HTTP API tests driven through the router with `tower::ServiceExt::oneshot`.

use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode, header},
};
use dbadmin_server::ai::{AiClient, AiConfigStore, AiService, RoleRegistry};
use dbadmin_server::api::{self, AppState};
use dbadmin_server::db::SessionRegistry;
use serde_json::{Value, json};
use std::time::Duration;
use tower::ServiceExt;

fn app() -> Router {
    let ai = AiService::new(
        AiClient::new(Duration::from_secs(5)).unwrap(),
        AiConfigStore::new(),
        RoleRegistry::with_presets(),
        Duration::from_secs(5),
    );
    api::router(AppState::new(SessionRegistry::default(), ai))
}

async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| {
            Value::String(String::from_utf8_lossy(&bytes).into_owned())
        })
    };
    (status, value)
}

async fn connect_memory(app: &Router) -> String {
    let (status, body) = send(
        app,
        Method::POST,
        "/api/connections/connect",
        Some(json!({ "name": "scratch", "dbType": "sqlite", "database": ":memory:" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Connected successfully");
    body["sessionId"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_connection_lifecycle() {
    let app = app();
    let session_id = connect_memory(&app).await;

    let (status, body) = send(
        &app,
        Method::GET,
        &format!("/api/connections/{session_id}/status"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["valid"], true);
    assert_eq!(body["connection"]["name"], "scratch");
    assert!(body["connection"].get("password").is_none());

    let (status, body) = send(&app, Method::GET, "/api/connections/sessions", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body[0]["sessionId"], session_id.as_str());
    assert_eq!(body[0]["dbType"], "sqlite");
    assert!(body[0]["connectedAt"].is_string());

    let uri = format!("/api/connections/{session_id}/disconnect");
    let (status, body) = send(&app, Method::POST, &uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Disconnected");

    // Idempotent
    let (status, _) = send(&app, Method::POST, &uri, None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(
        &app,
        Method::GET,
        &format!("/api/connections/{session_id}/status"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_connection_test_route() {
    let app = app();
    let (status, body) = send(
        &app,
        Method::POST,
        "/api/connections/test",
        Some(json!({ "dbType": "sqlite", "database": ":memory:" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/connections/test",
        Some(json!({ "dbType": "sqlite" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert!(body["error"].as_str().unwrap().starts_with("Invalid connection"));
}

#[tokio::test]
async fn test_execute_routes() {
    let app = app();
    let session_id = connect_memory(&app).await;

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/sql/execute",
        Some(json!({ "sessionId": session_id, "sql": "CREATE TABLE t (id INTEGER PRIMARY KEY, v TEXT)" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["kind"], "mutation");

    for i in 1..=12 {
        let sql = format!("INSERT INTO t VALUES ({i}, 'v{i}')");
        let (_, body) = send(
            &app,
            Method::POST,
            "/api/sql/execute",
            Some(json!({ "sessionId": session_id, "sql": sql })),
        )
        .await;
        assert_eq!(body["payload"]["affectedRows"], 1);
    }

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/sql/execute",
        Some(json!({ "sessionId": session_id, "sql": "SELECT * FROM t ORDER BY id", "page": 2, "pageSize": 5 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["kind"], "resultset");
    assert_eq!(body["payload"]["totalCount"], 12);
    assert_eq!(body["payload"]["currentPage"], 2);
    assert_eq!(body["payload"]["data"][0]["id"], 6);
    assert_eq!(body["payload"]["columns"], json!(["id", "v"]));

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/sql/execute",
        Some(json!({ "sessionId": session_id, "sql": "BEGIN" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["kind"], "transaction");
    assert_eq!(body["payload"]["autocommit"], false);

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/sql/query",
        Some(json!({ "sessionId": session_id, "sql": "SELECT v FROM t WHERE id = 1" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"], json!([{ "v": "v1" }]));
}

#[tokio::test]
async fn test_execute_errors() {
    let app = app();
    let session_id = connect_memory(&app).await;

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/sql/execute",
        Some(json!({ "sql": "SELECT 1" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "sessionId and sql are required");

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/sql/execute",
        Some(json!({ "sessionId": "missing", "sql": "SELECT 1" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Connection not found or closed");

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/sql/execute",
        Some(json!({ "sessionId": session_id, "sql": "SELEC nonsense" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().starts_with("Failed to execute update"));
    assert!(body["suggestion"].is_string());
}

#[tokio::test]
async fn test_metadata_routes() {
    let app = app();
    let session_id = connect_memory(&app).await;
    send(
        &app,
        Method::POST,
        "/api/sql/execute",
        Some(json!({ "sessionId": session_id, "sql": "CREATE TABLE users (id INTEGER PRIMARY KEY, email TEXT NOT NULL)" })),
    )
    .await;

    let (status, body) = send(&app, Method::GET, &format!("/api/sql/tables/{session_id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["tables"], json!(["users"]));

    let (_, body) = send(&app, Method::GET, &format!("/api/sql/views/{session_id}"), None).await;
    assert_eq!(body["views"], json!([]));

    let (_, body) = send(&app, Method::GET, &format!("/api/sql/procedures/{session_id}"), None).await;
    assert_eq!(body["procedures"], json!([]));

    let (_, body) = send(&app, Method::GET, &format!("/api/sql/functions/{session_id}"), None).await;
    assert_eq!(body["functions"], json!([]));

    let (_, body) = send(&app, Method::GET, &format!("/api/sql/databases/{session_id}"), None).await;
    assert_eq!(body["databases"], json!(["main"]));

    let (_, body) = send(
        &app,
        Method::GET,
        &format!("/api/sql/current-database/{session_id}"),
        None,
    )
    .await;
    assert_eq!(body["database"], "main");

    let (status, body) = send(
        &app,
        Method::GET,
        &format!("/api/sql/schema/{session_id}/users"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["tableName"], "users");
    assert_eq!(body["columns"][1]["name"], "email");
    assert_eq!(body["indexes"][0]["name"], "PRIMARY");

    let (status, _) = send(
        &app,
        Method::GET,
        &format!("/api/sql/schema/{session_id}/nope"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(
        &app,
        Method::POST,
        &format!("/api/sql/switch-database/{session_id}"),
        Some(json!({ "database": "" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Database name is required");
}

#[tokio::test]
async fn test_ai_config_and_role_routes() {
    let app = app();

    let (_, providers) = send(&app, Method::GET, "/api/ai/providers", None).await;
    assert_eq!(providers["deepseek"]["baseUrl"], "https://api.deepseek.com");
    assert_eq!(providers["iflow"]["models"][0], "Iflow-chat");

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/ai/config",
        Some(json!({ "name": "local", "baseUrl": "http://127.0.0.1:9", "model": "m", "apiKey": "secret" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    let id = body["id"].as_str().unwrap().to_string();

    let (_, configs) = send(&app, Method::GET, "/api/ai/configs", None).await;
    assert_eq!(configs[0]["id"], id.as_str());
    assert!(configs[0].get("apiKey").is_none());

    let (status, body) = send(&app, Method::POST, "/api/ai/config/unknown/test", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Configuration not found");

    let (status, _) = send(&app, Method::DELETE, &format!("/api/ai/config/{id}"), None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/ai/generate-sql",
        Some(json!({ "input": "all users" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "no available AI configuration");

    let (_, roles) = send(&app, Method::GET, "/api/ai/roles", None).await;
    assert_eq!(roles.as_array().unwrap().len(), 4);

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/ai/roles",
        Some(json!({ "name": "Reviewer", "systemPrompt": "Review SQL." })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let role_id = body["id"].as_str().unwrap().to_string();

    let (status, _) = send(
        &app,
        Method::PUT,
        "/api/ai/roles/missing",
        Some(json!({ "name": "x", "systemPrompt": "y" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = send(&app, Method::DELETE, "/api/ai/roles/sql-expert", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Preset roles cannot be deleted");

    let (status, _) = send(&app, Method::DELETE, &format!("/api/ai/roles/{role_id}"), None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_stream_without_config_reports_error_event() {
    let app = app();
    let request = Request::builder()
        .uri("/api/ai/chat/stream?message=hello")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "text/event-stream"
    );

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("event: error"));
    assert!(text.contains(r#"{"error":"no available AI configuration"}"#));
    assert!(text.trim_end().ends_with("data: [DONE]"));
}

async fn send_raw(app: &Router, uri: &str, content_type: Option<&str>, body: &str) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(Method::POST).uri(uri);
    if let Some(content_type) = content_type {
        builder = builder.header(header::CONTENT_TYPE, content_type);
    }
    let request = builder.body(Body::from(body.to_string())).unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn test_malformed_bodies_render_json_errors() {
    let app = app();

    let (status, body) = send_raw(&app, "/api/sql/execute", Some("application/json"), "{not json").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());

    let (status, body) = send_raw(
        &app,
        "/api/connections/connect",
        Some("application/json"),
        r#"{"port": "not a number"}"#,
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["error"].as_str().unwrap().contains("port"));

    let (status, body) = send_raw(&app, "/api/ai/generate-sql", None, "{}").await;
    assert_eq!(status, StatusCode::UNSUPPORTED_MEDIA_TYPE);
    assert!(body["error"].is_string());
}

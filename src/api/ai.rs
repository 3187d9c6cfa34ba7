//! AI assistant routes under `/api/ai`.

use crate::ai::{AiConfig, AiRole, ChatRequest, StreamEvent, provider_catalog};
use crate::api::{ApiJson, ApiQuery, ApiResult, AppError, AppState};
use crate::error::AiError;
use axum::{
    Json, Router,
    extract::{Path, State},
    response::{
        Sse,
        sse::{Event, KeepAlive},
    },
    routing::{get, post, put},
};
use futures_util::{Stream, StreamExt};
use serde::Deserialize;
use serde_json::{Map, Value, json};
use std::convert::Infallible;
use tokio_stream::wrappers::ReceiverStream;
use tracing::info;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/generate-sql", post(generate_sql))
        .route("/explain-sql", post(explain_sql))
        .route("/optimize-sql", post(optimize_sql))
        .route("/generate-crud", post(generate_crud))
        .route("/generate-test-data", post(generate_test_data))
        .route("/explain-query-plan", post(explain_query_plan))
        .route("/analyze-query-result", post(analyze_query_result))
        .route("/analyze-error", post(analyze_error))
        .route("/providers", get(providers))
        .route("/config", post(create_config))
        .route("/configs", get(list_configs))
        .route("/config/{id}", put(update_config).delete(delete_config))
        .route("/config/{id}/test", post(test_config))
        .route("/chat/stream", get(stream_chat_query).post(stream_chat_body))
        .route("/chat/free", post(free_chat))
        .route("/roles", get(list_roles).post(create_role))
        .route("/roles/{id}", put(update_role).delete(delete_role))
}

/// Body shared by the single-shot assistant routes; each route reads its own fields.
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AssistRequest {
    pub input: String,
    pub sql: String,
    pub table_name: String,
    pub columns: String,
    pub row_count: Option<u32>,
    pub explain_result: String,
    pub result: Value,
    pub error: String,
    pub config_id: Option<String>,
}

impl AssistRequest {
    fn config_id(&self) -> Option<&str> {
        self.config_id.as_deref()
    }
}

async fn generate_sql(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<AssistRequest>,
) -> ApiResult<Json<Value>> {
    let sql = state.ai.generate_sql(&req.input, req.config_id()).await?;
    Ok(Json(json!({ "sql": sql })))
}

async fn explain_sql(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<AssistRequest>,
) -> ApiResult<Json<Value>> {
    let explanation = state.ai.explain_sql(&req.sql, req.config_id()).await?;
    Ok(Json(json!({ "explanation": explanation })))
}

async fn optimize_sql(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<AssistRequest>,
) -> ApiResult<Json<Value>> {
    let optimized = state.ai.optimize_sql(&req.sql, req.config_id()).await?;
    Ok(Json(json!({ "optimized": optimized })))
}

async fn generate_crud(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<AssistRequest>,
) -> ApiResult<Json<Value>> {
    let crud = state
        .ai
        .generate_crud(&req.table_name, &req.columns, req.config_id())
        .await?;
    Ok(Json(json!({ "crud": crud })))
}

async fn generate_test_data(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<AssistRequest>,
) -> ApiResult<Json<Value>> {
    let test_data = state
        .ai
        .generate_test_data(&req.table_name, &req.columns, req.row_count, req.config_id())
        .await?;
    Ok(Json(json!({ "testData": test_data })))
}

async fn explain_query_plan(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<AssistRequest>,
) -> ApiResult<Json<Value>> {
    let explanation = state
        .ai
        .explain_query_plan(&req.sql, &req.explain_result, req.config_id())
        .await?;
    Ok(Json(json!({ "explanation": explanation })))
}

async fn analyze_query_result(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<AssistRequest>,
) -> ApiResult<Json<Value>> {
    let analysis = state
        .ai
        .analyze_query_result(&req.sql, &req.result, req.config_id())
        .await?;
    Ok(Json(json!({ "analysis": analysis })))
}

async fn analyze_error(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<AssistRequest>,
) -> ApiResult<Json<Value>> {
    let analysis = state
        .ai
        .analyze_error(&req.sql, &req.error, req.config_id())
        .await?;
    Ok(Json(json!({ "analysis": analysis })))
}

/// Provider catalog keyed by provider id.
async fn providers() -> Json<Map<String, Value>> {
    let catalog = provider_catalog()
        .into_iter()
        .map(|provider| {
            let value = serde_json::to_value(&provider).unwrap_or(Value::Null);
            (provider.id.to_string(), value)
        })
        .collect();
    Json(catalog)
}

async fn create_config(
    State(state): State<AppState>,
    ApiJson(config): ApiJson<AiConfig>,
) -> Json<Value> {
    let id = state.ai.configs().save(config).await;
    Json(json!({ "success": true, "id": id }))
}

async fn list_configs(State(state): State<AppState>) -> Json<Vec<AiConfig>> {
    Json(state.ai.configs().list().await)
}

async fn update_config(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ApiJson(config): ApiJson<AiConfig>,
) -> Json<Value> {
    state.ai.configs().update(&id, config).await;
    Json(json!({ "success": true }))
}

async fn delete_config(State(state): State<AppState>, Path(id): Path<String>) -> Json<Value> {
    state.ai.configs().delete(&id).await;
    Json(json!({ "success": true }))
}

async fn test_config(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    match state.ai.test_config(&id).await {
        Ok(()) => Ok(Json(
            json!({ "success": true, "message": "Connection successful" }),
        )),
        Err(AiError::ConfigNotFound { .. }) => {
            Err(AppError::bad_request("Configuration not found"))
        }
        Err(e) => Err(AppError::bad_request(format!("Connection failed: {e}"))),
    }
}

/// Query string accepted by `GET /chat/stream`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamQuery {
    #[serde(default)]
    pub message: String,
    pub config_id: Option<String>,
    pub role_id: Option<String>,
}

impl From<StreamQuery> for ChatRequest {
    fn from(query: StreamQuery) -> Self {
        Self {
            message: query.message,
            config_id: query.config_id,
            role_id: query.role_id,
            ..Self::default()
        }
    }
}

async fn stream_chat_query(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<StreamQuery>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    chat_stream(&state, query.into())
}

async fn stream_chat_body(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<ChatRequest>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    chat_stream(&state, request)
}

fn chat_stream(
    state: &AppState,
    request: ChatRequest,
) -> Sse<impl Stream<Item = Result<Event, Infallible>> + use<>> {
    info!(
        config_id = request.config_id.as_deref().unwrap_or(""),
        role_id = request.role_id.as_deref().unwrap_or(""),
        "Chat stream requested"
    );

    let events = ReceiverStream::new(state.ai.stream_chat(request))
        .map(|event| Ok::<_, Infallible>(sse_event(event)));
    Sse::new(events).keep_alive(KeepAlive::default())
}

/// Render one stream event as an SSE frame.
fn sse_event(event: StreamEvent) -> Event {
    match event {
        StreamEvent::Chunk(content) => Event::default()
            .json_data(json!({ "content": content }))
            .unwrap_or_else(|_| Event::default().data(content)),
        StreamEvent::Error(message) => Event::default()
            .event("error")
            .json_data(json!({ "error": message }))
            .unwrap_or_else(|_| Event::default().event("error").data("stream failed")),
        StreamEvent::Done => Event::default().data("[DONE]"),
    }
}

async fn free_chat(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<ChatRequest>,
) -> ApiResult<Json<Value>> {
    let response = state.ai.free_chat(&request).await?;
    Ok(Json(json!({ "response": response })))
}

async fn list_roles(State(state): State<AppState>) -> Json<Vec<AiRole>> {
    Json(state.ai.roles().list().await)
}

async fn create_role(
    State(state): State<AppState>,
    ApiJson(role): ApiJson<AiRole>,
) -> ApiResult<Json<Value>> {
    let id = state.ai.roles().create(role).await?;
    Ok(Json(json!({ "success": true, "id": id })))
}

async fn update_role(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ApiJson(role): ApiJson<AiRole>,
) -> ApiResult<Json<Value>> {
    state.ai.roles().update(&id, role).await?;
    Ok(Json(json!({ "success": true })))
}

async fn delete_role(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    state.ai.roles().delete(&id).await?;
    Ok(Json(json!({ "success": true })))
}

//! Statement execution and metadata routes under `/api/sql`.

use crate::api::{ApiJson, ApiQuery, ApiResult, AppError, AppState};
use crate::db::PageRequest;
use crate::models::{ExecuteOutcome, QueryResult, TableSchema};
use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{get, post},
};
use serde::Deserialize;
use serde_json::{Value, json};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/query", post(query))
        .route("/execute", post(execute))
        .route("/tables/{session_id}", get(tables))
        .route("/views/{session_id}", get(views))
        .route("/procedures/{session_id}", get(procedures))
        .route("/functions/{session_id}", get(functions))
        .route("/databases/{session_id}", get(databases))
        .route("/switch-database/{session_id}", post(switch_database))
        .route("/current-database/{session_id}", get(current_database))
        .route("/schema/{session_id}/{table}", get(table_schema))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SqlRequest {
    pub session_id: Option<String>,
    pub sql: Option<String>,
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

impl SqlRequest {
    fn parts(&self) -> ApiResult<(&str, &str)> {
        match (self.session_id.as_deref(), self.sql.as_deref()) {
            (Some(session_id), Some(sql)) if !session_id.is_empty() => Ok((session_id, sql)),
            _ => Err(AppError::bad_request("sessionId and sql are required")),
        }
    }
}

async fn query(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<SqlRequest>,
) -> ApiResult<Json<QueryResult>> {
    let (session_id, sql) = request.parts()?;
    Ok(Json(state.engine.query(session_id, sql).await?))
}

async fn execute(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<SqlRequest>,
) -> ApiResult<Json<ExecuteOutcome>> {
    let (session_id, sql) = request.parts()?;
    let page = PageRequest::from_parts(request.page, request.page_size);
    Ok(Json(state.engine.execute(session_id, sql, page).await?))
}

#[derive(Debug, Default, Deserialize)]
pub struct DatabaseParam {
    pub database: Option<String>,
}

impl DatabaseParam {
    fn name(&self) -> Option<&str> {
        self.database.as_deref().filter(|d| !d.trim().is_empty())
    }
}

async fn tables(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    ApiQuery(param): ApiQuery<DatabaseParam>,
) -> ApiResult<Json<Value>> {
    let tables = state.inspector.list_tables(&session_id, param.name()).await?;
    Ok(Json(json!({ "tables": tables })))
}

async fn views(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    ApiQuery(param): ApiQuery<DatabaseParam>,
) -> ApiResult<Json<Value>> {
    let views = state.inspector.list_views(&session_id, param.name()).await?;
    Ok(Json(json!({ "views": views })))
}

async fn procedures(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    ApiQuery(param): ApiQuery<DatabaseParam>,
) -> ApiResult<Json<Value>> {
    let procedures = state
        .inspector
        .list_procedures(&session_id, param.name())
        .await?;
    Ok(Json(json!({ "procedures": procedures })))
}

async fn functions(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    ApiQuery(param): ApiQuery<DatabaseParam>,
) -> ApiResult<Json<Value>> {
    let functions = state
        .inspector
        .list_functions(&session_id, param.name())
        .await?;
    Ok(Json(json!({ "functions": functions })))
}

async fn databases(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<Json<Value>> {
    let databases = state.inspector.list_databases(&session_id).await?;
    Ok(Json(json!({ "databases": databases })))
}

async fn switch_database(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    ApiJson(param): ApiJson<DatabaseParam>,
) -> ApiResult<Json<Value>> {
    let database = param.database.as_deref().map(str::trim).unwrap_or("");
    state.inspector.switch_database(&session_id, database).await?;
    Ok(Json(json!({ "message": format!("Switched to database: {database}") })))
}

async fn current_database(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<Json<Value>> {
    let database = state.inspector.current_database(&session_id).await?;
    Ok(Json(json!({ "database": database })))
}

async fn table_schema(
    State(state): State<AppState>,
    Path((session_id, table)): Path<(String, String)>,
    ApiQuery(param): ApiQuery<DatabaseParam>,
) -> ApiResult<Json<TableSchema>> {
    let schema = state
        .inspector
        .table_schema(&session_id, &table, param.name())
        .await?;
    Ok(Json(schema))
}

//! Session lifecycle routes under `/api/connections`.

use crate::api::{ApiJson, ApiResult, AppError, AppState};
use crate::models::{ConnectionInfo, SessionSummary};
use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Serialize;
use serde_json::json;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/connect", post(connect))
        .route("/test", post(test))
        .route("/sessions", get(sessions))
        .route("/{session_id}/disconnect", post(disconnect))
        .route("/{session_id}/status", get(status))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectResponse {
    pub session_id: String,
    pub message: String,
}

async fn connect(
    State(state): State<AppState>,
    ApiJson(info): ApiJson<ConnectionInfo>,
) -> ApiResult<Json<ConnectResponse>> {
    let session_id = state.registry.connect(info).await?;
    Ok(Json(ConnectResponse {
        session_id,
        message: "Connected successfully".to_string(),
    }))
}

async fn test(State(state): State<AppState>, ApiJson(info): ApiJson<ConnectionInfo>) -> Response {
    match state.registry.test_connection(&info).await {
        Ok(success) => Json(json!({ "success": success })).into_response(),
        Err(e) => (
            StatusCode::BAD_REQUEST,
            Json(json!({ "success": false, "error": e.to_string() })),
        )
            .into_response(),
    }
}

async fn disconnect(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Json<serde_json::Value> {
    state.registry.close(&session_id).await;
    Json(json!({ "message": "Disconnected" }))
}

/// Connection details reported by the status route. The password is omitted.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionDetails {
    pub name: String,
    pub host: String,
    pub port: u16,
    pub database: Option<String>,
    pub username: String,
}

impl From<ConnectionInfo> for ConnectionDetails {
    fn from(info: ConnectionInfo) -> Self {
        Self {
            name: info.name,
            host: info.host,
            port: info.port,
            database: info.database,
            username: info.username,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub valid: bool,
    pub connection: ConnectionDetails,
}

async fn status(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<Json<StatusResponse>> {
    let valid = state.registry.is_valid(&session_id).await;
    let info = state
        .registry
        .get_info(&session_id)
        .await
        .ok_or_else(|| AppError::not_found("Connection not found or closed"))?;

    Ok(Json(StatusResponse {
        valid,
        connection: info.into(),
    }))
}

async fn sessions(State(state): State<AppState>) -> Json<Vec<SessionSummary>> {
    Json(state.registry.list_sessions().await)
}

//! HTTP error mapping.
//!
//! Every failure is rendered as `{"error": "..."}`, with a `suggestion` field
//! when the database error carries one.

use crate::error::{AiError, DbError};
use axum::{
    Json,
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Db(#[from] DbError),

    #[error(transparent)]
    Ai(#[from] AiError),

    /// Malformed or missing JSON body
    #[error(transparent)]
    Body(#[from] JsonRejection),

    #[error(transparent)]
    QueryString(#[from] QueryRejection),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),
}

impl AppError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Db(DbError::Internal { .. }) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Db(_) => StatusCode::BAD_REQUEST,
            Self::Ai(AiError::RoleNotFound { .. }) => StatusCode::NOT_FOUND,
            Self::Ai(_) => StatusCode::BAD_REQUEST,
            Self::Body(rejection) => rejection.status(),
            Self::QueryString(rejection) => rejection.status(),
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            Self::Db(err) => match err.suggestion() {
                Some(suggestion) => json!({ "error": err.to_string(), "suggestion": suggestion }),
                None => json!({ "error": err.to_string() }),
            },
            other => json!({ "error": other.to_string() }),
        };

        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        } else {
            tracing::debug!(status = status.as_u16(), error = %self, "Request rejected");
        }

        (status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<T, AppError>;

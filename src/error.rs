use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::remote::RemoteError;
use crate::services::archive_store::StoreError;
use crate::services::engine::EngineError;

#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Unprocessable(String),

    #[error("{0}")]
    ServiceUnavailable(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, msg) = match &self {
            AppError::NotFound(m) => (StatusCode::NOT_FOUND, m.clone()),
            AppError::BadRequest(m) => (StatusCode::BAD_REQUEST, m.clone()),
            AppError::Conflict(m) => (StatusCode::CONFLICT, m.clone()),
            AppError::Unprocessable(m) => (StatusCode::UNPROCESSABLE_ENTITY, m.clone()),
            AppError::ServiceUnavailable(m) => (StatusCode::SERVICE_UNAVAILABLE, m.clone()),
            AppError::Internal(e) => {
                tracing::error!("Internal error: {e:#}");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".into())
            }
        };
        (status, Json(json!({ "error": msg }))).into_response()
    }
}

impl From<EngineError> for AppError {
    fn from(e: EngineError) -> Self {
        match e {
            EngineError::RemoteNotConfigured => AppError::ServiceUnavailable(e.to_string()),
            EngineError::InvalidLabel(_) => AppError::BadRequest(e.to_string()),
            EngineError::Lifecycle { .. } => AppError::Conflict(e.to_string()),
            EngineError::RestoreRecovered { .. } | EngineError::RestoreUnrecovered { .. } => {
                AppError::Unprocessable(e.to_string())
            }
            EngineError::Cancelled => AppError::ServiceUnavailable(e.to_string()),
            EngineError::Store(StoreError::NotFound(_)) => AppError::NotFound(e.to_string()),
            EngineError::Store(StoreError::InvalidName(_)) => AppError::BadRequest(e.to_string()),
            EngineError::Remote(RemoteError::NotFound(_)) => AppError::NotFound(e.to_string()),
            other => AppError::Internal(other.into()),
        }
    }
}
